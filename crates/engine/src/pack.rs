//! PipelinePack - reusable, reference-counted envelope for one record
//!
//! A pack is shared across tasks as `PackRef` (an `Arc`). The explicit
//! reference counter - not the `Arc`'s own count - decides when the pack
//! returns to its pool: the router increments it once per matched
//! destination, and every holder calls `recycle()` exactly once. At zero the
//! pack is reset and handed back to the pool for reuse.
//!
//! Routing state (payload, ident, project) lives behind an `RwLock`:
//! matching takes a read lock, filters mutate under a write lock. This is
//! the one place a pack is touched by more than one task at a time.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::message::Message;
use crate::pool::PoolInner;

/// Shared handle to a pipeline pack
pub type PackRef = Arc<PipelinePack>;

/// Mutable routing state of a pack
///
/// Matcher predicates read this; filters may rewrite it.
#[derive(Debug, Default)]
pub struct PackData {
    /// The record being routed
    pub message: Message,

    /// Routing identifier - what matcher predicates usually key on
    pub ident: String,

    /// Project/tenant key
    pub project: String,
}

impl PackData {
    /// Payload size in bytes
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.message.len()
    }

    fn reset(&mut self) {
        self.message.clear();
        self.ident.clear();
        self.project.clear();
    }
}

/// Reusable, reference-counted envelope for one in-flight record
pub struct PipelinePack {
    /// Routing state: read-locked for matching, write-locked by filters
    data: RwLock<PackData>,

    /// True when the pack was produced by an Input plugin
    input: AtomicBool,

    /// Times this pack has been re-injected by a filter
    loop_count: AtomicU32,

    /// Ordered trail of destinations visited in the current routing pass
    diagnostics: Mutex<Vec<Arc<str>>>,

    /// Explicit reference counter; the pack returns to its pool at zero
    ref_count: AtomicI32,

    /// Owning pool; `Weak` because the pool's free list holds packs
    pool: Weak<PoolInner>,
}

impl PipelinePack {
    pub(crate) fn new(pool: Weak<PoolInner>) -> Self {
        Self {
            data: RwLock::new(PackData::default()),
            input: AtomicBool::new(false),
            loop_count: AtomicU32::new(0),
            diagnostics: Mutex::new(Vec::new()),
            ref_count: AtomicI32::new(0),
            pool,
        }
    }

    /// Read access to the routing state
    ///
    /// Matcher predicates must not hold this guard across an await point;
    /// the router takes it only for the duration of a predicate call.
    #[inline]
    pub fn data(&self) -> RwLockReadGuard<'_, PackData> {
        self.data.read()
    }

    /// Write access to the routing state, used by producers and filters
    #[inline]
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, PackData> {
        self.data.write()
    }

    /// Atomically take one more reference
    ///
    /// Called by the router once per matched destination, before delivery.
    #[inline]
    pub fn inc_ref(&self) {
        let prev = self.ref_count.fetch_add(1, Ordering::Relaxed);
        debug_assert!(prev >= 1, "inc_ref on a pack with no live references");
    }

    /// Release one reference; at zero the pack is reset and returned to
    /// its pool
    ///
    /// # Panics
    ///
    /// Panics if called more times than references were taken - a corrupted
    /// pool must surface loudly, not silently.
    pub fn recycle(self: &Arc<Self>) {
        let prev = self.ref_count.fetch_sub(1, Ordering::AcqRel);
        assert!(
            prev >= 1,
            "pipeline pack recycled below zero references (prev = {prev})"
        );
        if prev == 1 {
            self.reset();
            if let Some(pool) = self.pool.upgrade() {
                pool.put_back(Arc::clone(self));
            }
            // Pool already gone: the pack simply drops with the last Arc.
        }
    }

    /// Current reference count
    #[inline]
    pub fn ref_count(&self) -> i32 {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Re-arm a pack leaving the pool with its single producer reference
    pub(crate) fn arm(&self) {
        self.ref_count.store(1, Ordering::Release);
    }

    /// Mark the pack as input-origin; counted separately by router stats
    #[inline]
    pub fn mark_input(&self) {
        self.input.store(true, Ordering::Relaxed);
    }

    /// True when the pack was produced by an Input plugin
    #[inline]
    pub fn is_input(&self) -> bool {
        self.input.load(Ordering::Relaxed)
    }

    /// Increment the re-injection counter, returning the new value
    ///
    /// Called on every `inject`; the router handle drops packs whose count
    /// exceeds the configured maximum.
    #[inline]
    pub fn bump_loop_count(&self) -> u32 {
        self.loop_count.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Times this pack has been re-injected since leaving the pool
    #[inline]
    pub fn loop_count(&self) -> u32 {
        self.loop_count.load(Ordering::Relaxed)
    }

    /// Clear the per-hop diagnostics trail
    ///
    /// The router calls this exactly once per pack per routing pass, before
    /// any matcher is evaluated.
    pub fn reset_diagnostics(&self) {
        self.diagnostics.lock().clear();
    }

    /// Append a destination to the diagnostics trail
    ///
    /// The router stamps a pack immediately before each delivery, producing
    /// an audit trail of who saw the pack this pass.
    pub fn add_stamp(&self, destination: Arc<str>) {
        self.diagnostics.lock().push(destination);
    }

    /// Destinations this pack was delivered to in the current pass
    pub fn stamps(&self) -> Vec<Arc<str>> {
        self.diagnostics.lock().clone()
    }

    /// Full reset before the pack re-enters the free list
    fn reset(&self) {
        self.data.write().reset();
        self.input.store(false, Ordering::Relaxed);
        self.loop_count.store(0, Ordering::Relaxed);
        self.diagnostics.lock().clear();
    }
}

impl std::fmt::Debug for PipelinePack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        f.debug_struct("PipelinePack")
            .field("ident", &data.ident)
            .field("project", &data.project)
            .field("payload_len", &data.payload_len())
            .field("ref_count", &self.ref_count())
            .field("input", &self.is_input())
            .field("loop_count", &self.loop_count())
            .finish()
    }
}
