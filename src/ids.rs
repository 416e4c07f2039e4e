//! Node identifier allocation.
//!
//! One allocator is created per process by the batch driver and lent to every
//! emitter, so identifiers keep increasing across documents.

use std::sync::atomic::{AtomicI64, Ordering};

/// Graph node identifier.
pub type Uid = i64;

/// Strictly increasing source of node identifiers. Never resets.
#[derive(Debug)]
pub struct IdAllocator {
    next: AtomicI64,
}

impl IdAllocator {
    /// Allocator whose first identifier is 0.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Allocator whose first identifier is `first`.
    ///
    /// Used to continue past identifiers already persisted by an earlier run.
    pub fn starting_at(first: Uid) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }

    /// Hand out the next identifier.
    pub fn next(&self) -> Uid {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// The identifier the next call to [`IdAllocator::next`] will return.
    #[cfg(test)]
    pub(crate) fn peek(&self) -> Uid {
        self.next.load(Ordering::SeqCst)
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
