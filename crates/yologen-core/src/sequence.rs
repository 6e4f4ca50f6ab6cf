//! Request sequencing: the latest request wins.
//!
//! A view takes a ticket before issuing a request and checks it when the
//! response arrives. A response whose ticket was superseded by a newer
//! request, or invalidated on unmount, is dropped instead of overwriting
//! fresher state.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

#[derive(Debug, Default)]
pub struct RequestSequencer {
    latest: AtomicU64,
}

impl RequestSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, superseding every earlier ticket.
    pub fn begin(&self) -> Ticket {
        Ticket(self.latest.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn is_current(&self, ticket: Ticket) -> bool {
        self.latest.load(Ordering::Acquire) == ticket.0
    }

    /// Drop every in-flight request (unmount, navigation away).
    pub fn invalidate(&self) {
        self.latest.fetch_add(1, Ordering::AcqRel);
    }
}
