//! Camera sessions: lifecycle, frame production and delivery.
//!
//! Each open session runs one capture thread that reads its backend source,
//! numbers frames and queues them according to the session's
//! [`Backpressure`](crate::backend::Backpressure) policy. Sessions share no
//! mutable state except the process-wide slot of single-instance categories.

mod exclusive;
mod producer;
#[allow(clippy::module_inception)]
mod session;
mod state;

pub use producer::FIRST_FRAME_NUM;
pub use session::{CameraSession, Frames};
pub use state::SessionState;

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub(crate) struct SessionCounters {
    pub(crate) produced: AtomicU64,
    pub(crate) delivered: AtomicU64,
    pub(crate) dropped_by_queue: AtomicU64,
    pub(crate) dropped_by_backend: AtomicU64,
    pub(crate) faults: AtomicU64,
}

impl SessionCounters {
    pub(crate) fn record_delivery(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> SessionStats {
        SessionStats {
            frames_produced: self.produced.load(Ordering::Relaxed),
            frames_delivered: self.delivered.load(Ordering::Relaxed),
            dropped_by_queue: self.dropped_by_queue.load(Ordering::Relaxed),
            dropped_by_backend: self.dropped_by_backend.load(Ordering::Relaxed),
            faults: self.faults.load(Ordering::Relaxed),
        }
    }
}

/// Frame accounting of one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Frames numbered by the capture thread.
    pub frames_produced: u64,
    /// Frames handed to the caller.
    pub frames_delivered: u64,
    /// Frames evicted from a full drop-oldest queue.
    pub dropped_by_queue: u64,
    /// Frames the backend reported as skipped.
    pub dropped_by_backend: u64,
    /// Backend faults seen (0 or 1).
    pub faults: u64,
}

impl SessionStats {
    /// All frames missing from the delivered sequence.
    pub fn frames_dropped(&self) -> u64 {
        self.dropped_by_queue + self.dropped_by_backend
    }
}
