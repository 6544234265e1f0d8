//! Ferry - Engine
//!
//! The routing core: a shared pool of reusable message packs, matchers
//! binding routing predicates to destination channels, and a single-task
//! router that fans each pack out to every matching destination.
//!
//! # Architecture
//!
//! ```text
//! [Inputs]                  [Router]                     [Destinations]
//!   stdin ───┐                                        ┌──→ Output (matcher A)
//!   tcp ─────┼──→ hub mpsc ──→ outputs, then filters ─┼──→ Output (matcher B)
//!   ...  ────┘        ↑          (ordered scan)       └──→ Filter ──┐
//!                     └──────────── inject (loop-guarded) ──────────┘
//! ```
//!
//! # Key Design
//!
//! - **Pooled packs**: records travel in `PipelinePack`s drawn from a
//!   fixed-capacity [`PackPool`]; pool exhaustion blocks producers
//! - **Explicit refcounting**: one reference per matched destination, the
//!   pack returns to its pool when the last holder calls `recycle`
//! - **Bounded channels everywhere**: the hub and every destination channel
//!   are bounded `tokio::sync::mpsc`; full channels block, nothing is dropped
//! - **Single-writer matcher state**: matcher collections live inside the
//!   router task; removal arrives over command channels, so dispatch and
//!   close never race
//! - **Outputs before filters**: a filter may rewrite a pack's ident, so
//!   output matchers are evaluated first in each pass
//!
//! # Example
//!
//! ```ignore
//! use ferry_engine::{Matcher, MessageRouter, PackPool, RunnerState};
//!
//! let mut router = MessageRouter::new(config.engine.clone());
//!
//! let runner = RunnerState::new("stdout");
//! let (matcher, mut rx) = Matcher::new(runner, 1000, |data| data.ident == "stdin");
//! router.add_output_matcher(matcher);
//!
//! let handle = router.handle();
//! tokio::spawn(router.start());
//!
//! // Producers:
//! let pool = PackPool::new(2000);
//! let pack = pool.acquire().await;
//! pack.data_mut().ident = "stdin".into();
//! pack.mark_input();
//! handle.enqueue(pack).await;
//!
//! // The destination drains rx, recycling every pack it receives.
//! ```

mod error;
mod matcher;
mod message;
mod pack;
mod pool;
mod router;
mod runner;
mod stats;

pub use error::{EngineError, Result};
pub use matcher::{MatchPredicate, Matcher};
pub use message::Message;
pub use pack::{PackData, PackRef, PipelinePack};
pub use pool::PackPool;
pub use router::{MessageRouter, RouterHandle};
pub use runner::{DestinationRunner, RunnerState};
pub use stats::{
    format_bytes, format_bytes_per_sec, format_count, format_rate, RouterStats, StatsSnapshot,
};

#[cfg(test)]
mod pack_test;
#[cfg(test)]
mod router_test;
