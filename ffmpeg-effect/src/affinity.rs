use std::thread::{self, ThreadId};

use crate::error::{Result, TranscodeError};

/// Records the thread a stateful collaborator was created on.
///
/// Filter engines hand this token to the session, which checks it before every
/// call into the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadAffinity {
    owner: ThreadId,
}

impl ThreadAffinity {
    pub fn current() -> Self {
        Self {
            owner: thread::current().id(),
        }
    }

    pub fn owner(&self) -> ThreadId {
        self.owner
    }

    pub fn is_current(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub fn check(&self) -> Result<()> {
        let current = thread::current().id();
        if current != self.owner {
            return Err(TranscodeError::ThreadAffinity {
                owner: self.owner,
                current,
            });
        }
        Ok(())
    }
}
