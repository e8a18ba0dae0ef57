//! Round-robin task scheduler
//!
//! Cooperative/preemptive round-robin scheduling over a run queue with the
//! running task always at the front. The only container mutation that
//! needs care is context switching itself; everything else is plain
//! `Vec`/`VecDeque` bookkeeping behind one lock.

pub mod context;
pub mod task;
pub mod timer;

use crate::error::ErrorCode;
use crate::sync::IrqSpinLock;
use alloc::collections::VecDeque;
use alloc::string::String;
use alloc::vec::Vec;
use context::switch_context;
use task::{SchedulerError, Task, TaskId, TaskState};

/// Scheduler logging macros with a consistent `[SCHED]` prefix.
macro_rules! sched_log {
    ($lvl:expr, $($arg:tt)*) => {
        crate::serial_println!("[SCHED][{}] {}", $lvl, format_args!($($arg)*))
    };
}
macro_rules! sched_info {
    ($($arg:tt)*) => { sched_log!("INFO", $($arg)*) };
}
macro_rules! sched_warn {
    ($($arg:tt)*) => { sched_log!("WARN", $($arg)*) };
}

struct TaskManager {
    tasks: Vec<Task>,
    running: VecDeque<usize>,
    latest_id: TaskId,
}

impl TaskManager {
    fn new() -> Self {
        Self {
            tasks: Vec::new(),
            running: VecDeque::new(),
            latest_id: 0,
        }
    }

    fn index_of(&self, id: TaskId) -> Option<usize> {
        self.tasks.iter().position(|t| t.id() == id)
    }

    /// Construct a new task and retain it in `tasks`. The task is not yet
    /// runnable: it is not placed in `running` and stays there only once
    /// `Wakeup` is called on it.
    fn new_task(
        &mut self,
        name: &str,
        entry: extern "C" fn(u64, u64),
        data: u64,
    ) -> Result<TaskId, SchedulerError> {
        self.latest_id += 1;
        let id = self.latest_id;
        let task = Task::new(id, String::from(name), entry, data)?;
        self.tasks.push(task);
        sched_info!("created task {} ({})", id, name);
        Ok(id)
    }

    /// Rotate the run queue and switch into whatever is now at the front.
    /// If `current_sleep` is set, the task that was running is removed
    /// from the run queue (marked Sleeping) instead of being rotated to
    /// the back.
    fn switch_task(&mut self, current_sleep: bool) {
        if self.running.len() <= 1 && !current_sleep {
            return;
        }
        let Some(current_idx) = self.running.pop_front() else {
            return;
        };
        if current_sleep {
            self.tasks[current_idx].set_state(TaskState::Sleeping);
        } else {
            self.tasks[current_idx].set_state(TaskState::Ready);
            self.running.push_back(current_idx);
        }

        let Some(&next_idx) = self.running.front() else {
            // Nothing left to run; put current back so the system doesn't
            // wedge with an empty run queue.
            self.running.push_back(current_idx);
            return;
        };

        self.tasks[next_idx].set_state(TaskState::Running);
        let next_ctx = self.tasks[next_idx].context();
        let current_ctx = self.tasks[current_idx].context_mut();
        unsafe { switch_context(next_ctx, current_ctx) };
    }

    fn sleep(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        let idx = self.index_of(id).ok_or(SchedulerError::NoSuchTask)?;
        if self.tasks[idx].state() == TaskState::Sleeping {
            return Ok(());
        }
        if self.running.front() == Some(&idx) {
            self.switch_task(true);
            return Ok(());
        }
        self.running.retain(|&i| i != idx);
        self.tasks[idx].set_state(TaskState::Sleeping);
        Ok(())
    }

    fn wakeup(&mut self, id: TaskId) -> Result<(), SchedulerError> {
        let idx = self.index_of(id).ok_or(SchedulerError::NoSuchTask)?;
        if self.tasks[idx].state() != TaskState::Sleeping {
            return Ok(());
        }
        self.tasks[idx].set_state(TaskState::Ready);
        self.running.push_back(idx);
        Ok(())
    }
}

static TASK_MANAGER: IrqSpinLock<Option<TaskManager>> = IrqSpinLock::new(None);

/// Initialize the task manager with an implicit idle task occupying slot
/// zero, pushed directly into `running` as the task switched away from by
/// the first `SwitchTask`. This is the one case where a task becomes
/// runnable without an explicit `Wakeup` call.
pub fn init(idle_entry: extern "C" fn(u64, u64)) {
    let mut mgr = TaskManager::new();
    let idle_id = mgr.new_task("idle", idle_entry, 0).expect("idle task must spawn");
    let idle_idx = mgr.index_of(idle_id).expect("idle task just inserted");
    mgr.tasks[idle_idx].set_state(TaskState::Running);
    mgr.running.push_back(idle_idx);
    *TASK_MANAGER.lock() = Some(mgr);
    sched_info!("task manager initialized");
}

pub fn new_task(name: &str, entry: extern "C" fn(u64, u64), data: u64) -> Result<TaskId, ErrorCode> {
    let mut guard = TASK_MANAGER.lock();
    let mgr = guard.as_mut().expect("task manager not initialized");
    mgr.new_task(name, entry, data).map_err(ErrorCode::from)
}

/// Called from the timer interrupt path to rotate the run queue.
pub fn switch_task(current_sleep: bool) {
    let mut guard = TASK_MANAGER.lock();
    if let Some(mgr) = guard.as_mut() {
        mgr.switch_task(current_sleep);
    } else {
        sched_warn!("switch_task called before init");
    }
}

pub fn sleep(id: TaskId) -> Result<(), ErrorCode> {
    let mut guard = TASK_MANAGER.lock();
    let mgr = guard.as_mut().expect("task manager not initialized");
    mgr.sleep(id).map_err(ErrorCode::from)
}

pub fn wakeup(id: TaskId) -> Result<(), ErrorCode> {
    let mut guard = TASK_MANAGER.lock();
    let mgr = guard.as_mut().expect("task manager not initialized");
    mgr.wakeup(id).map_err(ErrorCode::from)
}

#[cfg(not(test))]
pub mod manual_tests {
    use super::*;

    extern "C" fn busy_loop(_id: u64, _data: u64) {
        loop {
            core::hint::spin_loop();
        }
    }

    pub fn run_all_tests() {
        test_spawn_stays_out_of_runqueue_until_wakeup();
        sched_info!("manual_tests: all passed");
    }

    fn test_spawn_stays_out_of_runqueue_until_wakeup() {
        init(busy_loop);
        let id = new_task("worker", busy_loop, 0).expect("spawn failed");
        wakeup(id).expect("wakeup failed");
        sched_info!("spawned and woke test task {}", id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy(_id: u64, _data: u64) {}

    #[test]
    fn new_task_does_not_enter_runqueue() {
        let mut mgr = TaskManager::new();
        let idle = mgr.new_task("idle", dummy, 0).unwrap();
        let a = mgr.new_task("a", dummy, 0).unwrap();
        // neither task was pushed into `running` by `new_task`.
        assert!(mgr.running.is_empty());
        let _ = idle;
        let _ = a;
    }

    #[test]
    fn wakeup_adds_task_to_back_of_runqueue() {
        let mut mgr = TaskManager::new();
        let a = mgr.new_task("a", dummy, 0).unwrap();
        let b = mgr.new_task("b", dummy, 0).unwrap();
        mgr.wakeup(a).unwrap();
        mgr.wakeup(b).unwrap();
        assert_eq!(mgr.running.len(), 2);
        assert_eq!(mgr.tasks[*mgr.running.back().unwrap()].id(), b);
    }

    #[test]
    fn round_robin_rotates_front() {
        let mut mgr = TaskManager::new();
        let a = mgr.new_task("a", dummy, 0).unwrap();
        let b = mgr.new_task("b", dummy, 0).unwrap();
        mgr.wakeup(a).unwrap();
        mgr.wakeup(b).unwrap();
        assert_eq!(mgr.tasks[*mgr.running.front().unwrap()].id(), a);
        // switch_context would fault on bare TaskContexts outside a real
        // CPU, so rotation is driven directly on the run queue here.
        let front = mgr.running.pop_front().unwrap();
        mgr.running.push_back(front);
        assert_eq!(mgr.tasks[*mgr.running.front().unwrap()].id(), b);
    }

    #[test]
    fn sleep_removes_from_runqueue() {
        let mut mgr = TaskManager::new();
        let idle = mgr.new_task("idle", dummy, 0).unwrap();
        let a = mgr.new_task("a", dummy, 0).unwrap();
        mgr.wakeup(idle).unwrap();
        mgr.wakeup(a).unwrap();
        // "idle" is at the front, "a" is not — exercises the
        // remove-without-switching branch of `sleep`.
        mgr.sleep(a).unwrap();
        assert!(!mgr.running.iter().any(|&i| mgr.tasks[i].id() == a));
    }

    #[test]
    fn wakeup_unknown_task_errors() {
        let mut mgr = TaskManager::new();
        mgr.new_task("idle", dummy, 0).unwrap();
        assert_eq!(mgr.wakeup(999), Err(SchedulerError::NoSuchTask));
    }
}
