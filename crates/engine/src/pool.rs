//! PackPool - fixed-capacity shared pool of pipeline packs
//!
//! Producers acquire packs here and consumers return them through
//! `PipelinePack::recycle`. When every pack is in flight, `acquire` waits -
//! pool exhaustion is backpressure, not an error.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::pack::{PackRef, PipelinePack};

/// Shared pool of reusable packs
///
/// Cloning the pool is cheap; all clones share the same free list.
#[derive(Clone)]
pub struct PackPool {
    inner: Arc<PoolInner>,
}

pub(crate) struct PoolInner {
    /// Packs currently at rest
    free: Mutex<Vec<PackRef>>,

    /// One permit per free pack; `acquire` waits here when the pool is dry
    available: Semaphore,

    capacity: usize,
}

impl PoolInner {
    /// Return a fully reset pack to the free list
    pub(crate) fn put_back(&self, pack: PackRef) {
        self.free.lock().push(pack);
        self.available.add_permits(1);
    }
}

impl PackPool {
    /// Create a pool with `capacity` pre-allocated packs
    pub fn new(capacity: usize) -> Self {
        let inner = Arc::new(PoolInner {
            free: Mutex::new(Vec::with_capacity(capacity)),
            available: Semaphore::new(capacity),
            capacity,
        });

        {
            let mut free = inner.free.lock();
            for _ in 0..capacity {
                free.push(Arc::new(PipelinePack::new(Arc::downgrade(&inner))));
            }
        }

        Self { inner }
    }

    /// Take a pack from the pool, waiting if every pack is in flight
    ///
    /// The returned pack is fully reset with a reference count of 1; the
    /// caller owns that single reference and must `recycle` it (directly or
    /// by handing it to the router).
    pub async fn acquire(&self) -> PackRef {
        // The semaphore is never closed, so acquire can only fail if the
        // pool itself is torn down mid-await.
        let permit = self
            .inner
            .available
            .acquire()
            .await
            .expect("pack pool semaphore closed");
        permit.forget();

        let pack = self
            .inner
            .free
            .lock()
            .pop()
            .expect("pack pool free list empty while holding a permit");
        pack.arm();
        pack
    }

    /// Take a pack without waiting; `None` when the pool is exhausted
    pub fn try_acquire(&self) -> Option<PackRef> {
        let permit = self.inner.available.try_acquire().ok()?;
        permit.forget();

        let pack = self
            .inner
            .free
            .lock()
            .pop()
            .expect("pack pool free list empty while holding a permit");
        pack.arm();
        Some(pack)
    }

    /// Number of packs currently at rest in the pool
    pub fn available(&self) -> usize {
        self.inner.free.lock().len()
    }

    /// Total number of packs owned by the pool
    #[inline]
    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }
}

impl std::fmt::Debug for PackPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}
