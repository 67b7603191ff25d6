//! Application drivers that generate and absorb traffic.
//!
//! Drivers keep their progress in explicit session objects owned by the
//! scheduled continuation or send callback that advances them. Observers
//! read progress through a shared [`SessionProgress`] handle.

mod bulk;
mod periodic;
mod sink;

use std::cell::Cell;
use std::rc::Rc;

use serde::Serialize;

pub use bulk::BulkSend;
pub use periodic::{PeriodicHandle, PeriodicSend, SendPhase};
pub use sink::PacketSink;

/// Progress counters of a sending application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// Messages handed to the transport
    pub messages_sent: u64,
    /// Bytes handed to the transport
    pub bytes_sent: u64,
    /// All messages were handed over
    pub finished: bool,
    /// The transport rejected data or the connection failed
    pub failed: bool,
}

/// Shared, single-threaded view of a driver's progress.
///
/// Clones observe the same counters.
#[derive(Debug, Clone, Default)]
pub struct SessionProgress {
    inner: Rc<Cell<ProgressSnapshot>>,
}

impl SessionProgress {
    /// Creates zeroed progress.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counters.
    pub fn snapshot(&self) -> ProgressSnapshot {
        self.inner.get()
    }

    pub(crate) fn record_send(&self, bytes: u64) {
        self.update(|progress| {
            progress.messages_sent += 1;
            progress.bytes_sent += bytes;
        });
    }

    pub(crate) fn mark_finished(&self) {
        self.update(|progress| progress.finished = true);
    }

    pub(crate) fn mark_failed(&self) {
        self.update(|progress| progress.failed = true);
    }

    fn update(&self, change: impl FnOnce(&mut ProgressSnapshot)) {
        let mut progress = self.inner.get();
        change(&mut progress);
        self.inner.set(progress);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_progress() {
        let progress = SessionProgress::new();
        let observer = progress.clone();

        progress.record_send(1024);
        progress.record_send(1024);
        progress.mark_finished();

        let snapshot = observer.snapshot();
        assert_eq!(snapshot.messages_sent, 2);
        assert_eq!(snapshot.bytes_sent, 2048);
        assert!(snapshot.finished);
        assert!(!snapshot.failed);
    }
}
