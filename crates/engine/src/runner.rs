//! Destination boundary
//!
//! Every Filter/Output destination runs in its own task; the router never
//! starts or stops one. It only needs a name for diagnostics stamps and a
//! stopped-state query for the shutdown protocol.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// What the router needs to know about a destination
pub trait DestinationRunner: Send + Sync {
    /// Destination name, used in diagnostics stamps and queue reports
    fn name(&self) -> &str;

    /// True once the destination's run loop has exited
    ///
    /// Polled by `RouterHandle::stop` during shutdown.
    fn stopped(&self) -> bool;
}

/// Minimal `DestinationRunner` backed by an atomic flag
///
/// Destinations that don't need anything fancier hold one of these and call
/// `mark_stopped` when their run loop exits.
pub struct RunnerState {
    name: String,
    stopped: AtomicBool,
}

impl RunnerState {
    /// Create a runner state for a named destination
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            stopped: AtomicBool::new(false),
        })
    }

    /// Flag the destination as stopped; called when its run loop exits
    pub fn mark_stopped(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

impl DestinationRunner for RunnerState {
    fn name(&self) -> &str {
        &self.name
    }

    fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }
}
