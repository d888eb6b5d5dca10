//! Storage for completed messages

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::smtp::message::Message;

/// Accepts finished messages and hands them out to consumers
pub trait MessageSpool: Send + Sync {
    /// Store a message; `false` means it was not kept
    fn spool(&self, message: Message) -> bool;

    /// Remove and return the oldest stored message
    fn next_message(&self) -> Option<Message>;

    /// Drop every stored message
    fn clear(&self);
}

/// First-in, first-out spool held in memory
#[derive(Debug, Default)]
pub struct MemoryMessageSpool {
    queue: Mutex<VecDeque<Message>>,
}

impl MemoryMessageSpool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    // A panic while holding the lock cannot leave the queue half-modified
    fn queue(&self) -> MutexGuard<'_, VecDeque<Message>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MessageSpool for MemoryMessageSpool {
    fn spool(&self, message: Message) -> bool {
        self.queue().push_back(message);
        true
    }

    fn next_message(&self) -> Option<Message> {
        self.queue().pop_front()
    }

    fn clear(&self) {
        self.queue().clear();
    }
}
