//! Software timer manager
//!
//! Maintains a min-heap of deadlines ordered by nearest-expiry, drained on
//! every LAPIC tick. A sentinel entry and a standing scheduler-tick entry
//! keep the heap non-empty and guarantee exactly one scheduler-tick timer
//! is pending at all times.

use crate::config::{TASK_TIMER_PERIOD, TASK_TIMER_VALUE};
use crate::message::{Message, MAIN_QUEUE};
use crate::sync::IrqSpinLock;
use alloc::collections::BinaryHeap;
use core::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Timer {
    deadline: u64,
    value: i32,
}

/// Reversed `Ord` so `BinaryHeap` (a max-heap) pops the *nearest* deadline
/// first, matching the min-heap-by-deadline the drain algorithm needs.
impl Ord for Timer {
    fn cmp(&self, other: &Self) -> Ordering {
        other.deadline.cmp(&self.deadline)
    }
}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct TimerManager {
    heap: BinaryHeap<Timer>,
    tick: u64,
}

impl TimerManager {
    fn new() -> Self {
        let mut heap = BinaryHeap::new();
        // Sentinel: guarantees the heap is never empty.
        heap.push(Timer { deadline: u64::MAX, value: -1 });
        heap.push(Timer {
            deadline: TASK_TIMER_PERIOD,
            value: TASK_TIMER_VALUE,
        });
        Self { heap, tick: 0 }
    }

    fn add_timer(&mut self, deadline: u64, value: i32) {
        self.heap.push(Timer { deadline, value });
    }

    /// Advance one tick, draining every timer whose deadline has passed
    /// into the message queue. Returns whether the scheduler-tick timer
    /// fired (callers should then rotate the run queue).
    fn tick(&mut self) -> bool {
        self.tick += 1;
        let mut wake_scheduler = false;

        while let Some(&top) = self.heap.peek() {
            if top.deadline > self.tick {
                break;
            }
            self.heap.pop();

            if top.value == TASK_TIMER_VALUE {
                wake_scheduler = true;
                self.heap.push(Timer {
                    deadline: self.tick + TASK_TIMER_PERIOD,
                    value: TASK_TIMER_VALUE,
                });
                continue;
            }

            MAIN_QUEUE.push(Message::TimerTimeout {
                timeout: top.deadline,
                value: top.value,
            });
        }

        wake_scheduler
    }

    fn current_tick(&self) -> u64 {
        self.tick
    }
}

static TIMER_MANAGER: IrqSpinLock<Option<TimerManager>> = IrqSpinLock::new(None);

pub fn init() {
    *TIMER_MANAGER.lock() = Some(TimerManager::new());
}

pub fn add_timer(deadline: u64, value: i32) {
    let mut guard = TIMER_MANAGER.lock();
    guard
        .as_mut()
        .expect("timer manager not initialized")
        .add_timer(deadline, value);
}

pub fn current_tick() -> u64 {
    let guard = TIMER_MANAGER.lock();
    guard.as_ref().map_or(0, |m| m.current_tick())
}

/// Called from the LAPIC timer interrupt handler. Returns whether the
/// scheduler should rotate the run queue this tick.
pub fn on_tick() -> bool {
    let mut guard = TIMER_MANAGER.lock();
    match guard.as_mut() {
        Some(mgr) => mgr.tick(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timer_ordering_is_nearest_first() {
        let mut heap = BinaryHeap::new();
        heap.push(Timer { deadline: 100, value: 1 });
        heap.push(Timer { deadline: 10, value: 2 });
        heap.push(Timer { deadline: 50, value: 3 });
        assert_eq!(heap.pop().unwrap().deadline, 10);
        assert_eq!(heap.pop().unwrap().deadline, 50);
        assert_eq!(heap.pop().unwrap().deadline, 100);
    }

    #[test]
    fn scheduler_tick_always_reinserted() {
        let mut mgr = TimerManager::new();
        for _ in 0..(TASK_TIMER_PERIOD * 3) {
            mgr.tick();
        }
        let has_task_timer = mgr
            .heap
            .iter()
            .filter(|t| t.value == TASK_TIMER_VALUE)
            .count();
        assert_eq!(has_task_timer, 1);
    }

    #[test]
    fn drains_expired_timers_in_order() {
        let mut mgr = TimerManager::new();
        mgr.add_timer(2, 42);
        mgr.add_timer(5, 7);
        mgr.tick(); // tick 1
        mgr.tick(); // tick 2: value 42 expires
        assert_eq!(
            MAIN_QUEUE.pop(),
            Some(Message::TimerTimeout { timeout: 2, value: 42 })
        );
    }

    #[test]
    fn wake_scheduler_only_on_task_timer_expiry() {
        let mut mgr = TimerManager::new();
        for t in 1..TASK_TIMER_PERIOD {
            assert!(!mgr.tick());
        }
        assert!(mgr.tick());
    }
}
