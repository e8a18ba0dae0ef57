//! Task control block
//!
//! A `Task` owns its stack and its saved [`TaskContext`]; the task manager
//! owns the `Task` values themselves and hands out raw pointers to run.

use super::context::TaskContext;
use crate::arch::x86_64::gdt::{KERNEL_CS, KERNEL_SS};
use crate::config::DEFAULT_STACK_BYTES;
use crate::error::ErrorCode;
use crate::mm::allocator::{kfree, kmalloc};
use alloc::string::String;

pub type TaskId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    OutOfMemory,
    NoSuchTask,
}

impl From<SchedulerError> for ErrorCode {
    fn from(e: SchedulerError) -> Self {
        match e {
            SchedulerError::OutOfMemory => ErrorCode::NoEnoughMemory,
            SchedulerError::NoSuchTask => ErrorCode::NoSuchTask,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Running,
    Ready,
    Sleeping,
}

pub struct Task {
    id: TaskId,
    name: String,
    stack: *mut u8,
    stack_size: usize,
    state: TaskState,
    context: TaskContext,
}

unsafe impl Send for Task {}

impl Task {
    pub fn new(
        id: TaskId,
        name: String,
        entry: extern "C" fn(u64, u64),
        data: u64,
    ) -> Result<Self, SchedulerError> {
        let stack_size = DEFAULT_STACK_BYTES;
        let stack = kmalloc(stack_size);
        if stack.is_null() {
            return Err(SchedulerError::OutOfMemory);
        }

        let mut context = TaskContext::zeroed();
        let stack_top = stack as u64 + stack_size as u64;
        context.init(entry as u64, stack_top, KERNEL_CS, KERNEL_SS, id, data);

        Ok(Self {
            id,
            name,
            stack,
            stack_size,
            // Not yet runnable: the task manager does not place a
            // freshly-constructed task in the run queue until `Wakeup`
            // is called on it.
            state: TaskState::Sleeping,
            context,
        })
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    pub fn context_mut(&mut self) -> *mut TaskContext {
        &mut self.context as *mut TaskContext
    }

    pub fn context(&self) -> *const TaskContext {
        &self.context as *const TaskContext
    }
}

impl Drop for Task {
    fn drop(&mut self) {
        kfree(self.stack, self.stack_size);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn dummy_entry(_id: u64, _data: u64) {}

    #[test]
    fn new_task_starts_sleeping_and_not_runnable() {
        let task = Task::new(1, String::from("dummy"), dummy_entry, 0).unwrap();
        assert_eq!(task.state(), TaskState::Sleeping);
        assert_eq!(task.id(), 1);
    }
}
