//! Inter-subsystem message queue
//!
//! A single tagged-union message type flows from interrupt handlers to
//! whatever consumes them; today the only producer is the software timer
//! manager and the only variant is `TimerTimeout`.

use crate::sync::IrqSpinLock;
use alloc::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Message {
    TimerTimeout { timeout: u64, value: i32 },
}

pub struct MessageQueue {
    queue: IrqSpinLock<VecDeque<Message>>,
}

impl MessageQueue {
    pub const fn new() -> Self {
        Self {
            queue: IrqSpinLock::new(VecDeque::new()),
        }
    }

    pub fn push(&self, message: Message) {
        self.queue.lock().push_back(message);
    }

    pub fn pop(&self) -> Option<Message> {
        self.queue.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

pub static MAIN_QUEUE: MessageQueue = MessageQueue::new();

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let q = MessageQueue::new();
        q.push(Message::TimerTimeout { timeout: 1, value: 0 });
        q.push(Message::TimerTimeout { timeout: 2, value: 1 });
        assert_eq!(
            q.pop(),
            Some(Message::TimerTimeout { timeout: 1, value: 0 })
        );
        assert_eq!(
            q.pop(),
            Some(Message::TimerTimeout { timeout: 2, value: 1 })
        );
        assert_eq!(q.pop(), None);
    }
}
