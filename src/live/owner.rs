use crate::error::PermviewError;
use std::thread::{self, ThreadId};

/// The thread a collection or scheduler belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken {
    thread: ThreadId,
}

impl OwnerToken {
    pub fn current() -> Self {
        Self {
            thread: thread::current().id(),
        }
    }

    pub fn thread(&self) -> ThreadId {
        self.thread
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.thread
    }

    pub fn check(&self, operation: &'static str) -> Result<(), PermviewError> {
        let caller = thread::current().id();
        if caller == self.thread {
            return Ok(());
        }
        Err(PermviewError::WrongThread {
            operation,
            owner: format!("{:?}", self.thread),
            caller: format!("{caller:?}"),
        })
    }
}
