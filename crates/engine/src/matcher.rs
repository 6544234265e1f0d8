//! Matcher - predicate + destination channel binding
//!
//! A matcher binds a routing predicate to a destination's bounded input
//! channel. The router owns matchers in two ordered collections (outputs,
//! filters) and is the only code that closes a matcher's channel, through
//! the removal protocol.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::pack::{PackData, PackRef, PipelinePack};
use crate::runner::DestinationRunner;

/// Routing predicate over a pack's mutable state
///
/// Must be pure: predicates are evaluated under the pack's read lock and
/// may run against state other tasks can still observe.
pub type MatchPredicate = Box<dyn Fn(&PackData) -> bool + Send + Sync>;

/// Predicate + destination channel binding used for fan-out routing
pub struct Matcher {
    predicate: MatchPredicate,

    /// Sender half of the destination's bounded channel
    ///
    /// `None` once the removal protocol has closed the channel. Dropping
    /// the sender is the close: the destination keeps draining its receiver
    /// and then observes closure, Go's `close(chan)` semantics.
    sender: Mutex<Option<mpsc::Sender<PackRef>>>,

    runner: Arc<dyn DestinationRunner>,

    /// Runner name, pre-shared for cheap diagnostics stamping
    name: Arc<str>,

    capacity: usize,
}

impl Matcher {
    /// Create a matcher and the paired receiver for the destination's
    /// run loop
    pub fn new(
        runner: Arc<dyn DestinationRunner>,
        capacity: usize,
        predicate: impl Fn(&PackData) -> bool + Send + Sync + 'static,
    ) -> (Arc<Self>, mpsc::Receiver<PackRef>) {
        let (tx, rx) = mpsc::channel(capacity);
        let name: Arc<str> = runner.name().into();

        let matcher = Arc::new(Self {
            predicate: Box::new(predicate),
            sender: Mutex::new(Some(tx)),
            runner,
            name,
            capacity,
        });

        (matcher, rx)
    }

    /// Evaluate the predicate against the pack's current state
    ///
    /// Takes the pack's read lock for the duration of the call; never
    /// mutates the pack.
    #[inline]
    pub fn matches(&self, pack: &PipelinePack) -> bool {
        let data = pack.data();
        (self.predicate)(&data)
    }

    /// Deliver a pack reference, waiting for channel capacity
    ///
    /// Returns the pack back if the channel is already closed.
    pub(crate) async fn deliver(&self, pack: PackRef) -> Result<(), PackRef> {
        // Clone the sender out of the lock; the guard must not be held
        // across the await.
        let tx = self.sender.lock().clone();
        match tx {
            Some(tx) => tx.send(pack).await.map_err(|e| e.0),
            None => Err(pack),
        }
    }

    /// Close the destination channel by dropping the sender
    ///
    /// Only the router's removal path calls this, serialized with dispatch,
    /// so no delivery can race the close.
    pub(crate) fn close(&self) {
        self.sender.lock().take();
    }

    /// True once the channel has been closed or the receiver dropped
    pub fn is_closed(&self) -> bool {
        match &*self.sender.lock() {
            Some(tx) => tx.is_closed(),
            None => true,
        }
    }

    /// Destination name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Shared name handle for diagnostics stamps
    #[inline]
    pub(crate) fn stamp_name(&self) -> Arc<str> {
        Arc::clone(&self.name)
    }

    /// Whether the destination's run loop has exited
    #[inline]
    pub fn runner_stopped(&self) -> bool {
        self.runner.stopped()
    }

    /// Occupied slots and total capacity of the destination channel
    ///
    /// `None` once the channel is closed. Used by the verbose tick report.
    pub fn queue_depth(&self) -> Option<(usize, usize)> {
        let guard = self.sender.lock();
        let tx = guard.as_ref()?;
        Some((self.capacity - tx.capacity(), self.capacity))
    }
}

impl std::fmt::Debug for Matcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Matcher")
            .field("destination", &self.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}
