//! MessageRouter - bounded-channel dispatch with fan-out routing
//!
//! The router receives packs on its hub channel and fans each one out to
//! every matching destination, incrementing the pack's reference count once
//! per delivery. Matcher collections are touched only inside the router's
//! own control loop (single writer), so the hot path needs no locks;
//! removal requests arrive over command channels and are applied between
//! dispatch iterations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use ferry_config::EngineConfig;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::{EngineError, Result};
use crate::matcher::Matcher;
use crate::pack::PackRef;
use crate::stats::RouterStats;

/// Capacity of the matcher-removal command channels
const REMOVAL_CHANNEL_CAPACITY: usize = 16;

/// Tombstoned matcher collection
///
/// Removed matchers become `None` in place so that a removal arriving
/// between dispatch iterations never shifts the other matchers' positions.
type MatcherSlots = Vec<Option<Arc<Matcher>>>;

/// The central message router
///
/// Build one, register matchers, grab a [`RouterHandle`], then consume the
/// router with [`MessageRouter::start`] (typically spawned as a task).
///
/// # Example
///
/// ```ignore
/// let mut router = MessageRouter::new(config.engine.clone());
/// let (matcher, rx) = Matcher::new(runner, 1000, |data| data.ident == "syslog");
/// router.add_output_matcher(matcher);
/// let handle = router.handle();
/// tokio::spawn(router.start());
///
/// // Producers:
/// handle.enqueue(pack).await;
/// ```
pub struct MessageRouter {
    config: EngineConfig,

    /// Kept for enqueue handles and the verbose queue-depth report
    hub_tx: mpsc::Sender<PackRef>,
    hub_rx: mpsc::Receiver<PackRef>,

    remove_output_tx: mpsc::Sender<Arc<Matcher>>,
    remove_output_rx: mpsc::Receiver<Arc<Matcher>>,
    remove_filter_tx: mpsc::Sender<Arc<Matcher>>,
    remove_filter_rx: mpsc::Receiver<Arc<Matcher>>,

    output_matchers: MatcherSlots,
    filter_matchers: MatcherSlots,

    /// Every matcher ever registered; `stop()` polls their runners
    registered: Arc<Mutex<Vec<Arc<Matcher>>>>,

    stats: Arc<RouterStats>,
    shutdown: CancellationToken,
}

impl MessageRouter {
    /// Create a router with the given engine configuration
    pub fn new(config: EngineConfig) -> Self {
        let (hub_tx, hub_rx) = mpsc::channel(config.hub_capacity);
        let (remove_output_tx, remove_output_rx) = mpsc::channel(REMOVAL_CHANNEL_CAPACITY);
        let (remove_filter_tx, remove_filter_rx) = mpsc::channel(REMOVAL_CHANNEL_CAPACITY);

        Self {
            config,
            hub_tx,
            hub_rx,
            remove_output_tx,
            remove_output_rx,
            remove_filter_tx,
            remove_filter_rx,
            output_matchers: Vec::new(),
            filter_matchers: Vec::new(),
            registered: Arc::new(Mutex::new(Vec::new())),
            stats: Arc::new(RouterStats::new()),
            shutdown: CancellationToken::new(),
        }
    }

    /// Register an Output destination
    ///
    /// Safe only before `start()`; live additions are not supported
    /// (removal is, via [`RouterHandle`]).
    pub fn add_output_matcher(&mut self, matcher: Arc<Matcher>) {
        tracing::debug!(destination = matcher.name(), "registered output matcher");
        self.registered.lock().push(Arc::clone(&matcher));
        self.output_matchers.push(Some(matcher));
    }

    /// Register a Filter destination
    pub fn add_filter_matcher(&mut self, matcher: Arc<Matcher>) {
        tracing::debug!(destination = matcher.name(), "registered filter matcher");
        self.registered.lock().push(Arc::clone(&matcher));
        self.filter_matchers.push(Some(matcher));
    }

    /// Number of live (non-tombstoned) output matchers
    pub fn output_matcher_count(&self) -> usize {
        self.output_matchers.iter().flatten().count()
    }

    /// Number of live (non-tombstoned) filter matchers
    pub fn filter_matcher_count(&self) -> usize {
        self.filter_matchers.iter().flatten().count()
    }

    /// External control surface; remains valid after `start()` consumes
    /// the router
    pub fn handle(&self) -> RouterHandle {
        RouterHandle {
            hub_tx: self.hub_tx.clone(),
            remove_output_tx: self.remove_output_tx.clone(),
            remove_filter_tx: self.remove_filter_tx.clone(),
            registered: Arc::clone(&self.registered),
            stats: Arc::clone(&self.stats),
            shutdown: self.shutdown.clone(),
            max_pack_loops: self.config.max_pack_loops,
            stop_poll_interval: self.config.stop_poll_interval(),
        }
    }

    /// Run the dispatch loop until shutdown
    ///
    /// Consumes the router. Dispatch, tick rendering, and matcher removal
    /// are multiplexed on one task; nothing else ever mutates the matcher
    /// collections.
    pub async fn start(self) {
        let MessageRouter {
            config,
            hub_tx,
            mut hub_rx,
            remove_output_tx: _remove_output_tx,
            mut remove_output_rx,
            remove_filter_tx: _remove_filter_tx,
            mut remove_filter_rx,
            mut output_matchers,
            mut filter_matchers,
            registered: _registered,
            stats,
            shutdown,
        } = self;

        tracing::info!(
            outputs = output_matchers.len(),
            filters = filter_matchers.len(),
            hub_capacity = config.hub_capacity,
            tick_secs = config.ticker_interval_secs,
            "router starting"
        );

        let mut ticker = tokio::time::interval(config.ticker_interval());
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // An interval's first tick completes immediately; swallow it so the
        // first render covers a full period.
        ticker.tick().await;
        let mut last_render = Instant::now();

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    // stop() cancels only after every destination reports
                    // stopped, so nothing new can arrive: drain what is
                    // already queued, then exit.
                    while let Ok(pack) = hub_rx.try_recv() {
                        dispatch(&stats, &output_matchers, &filter_matchers, pack).await;
                    }
                    break;
                }

                Some(matcher) = remove_output_rx.recv() => {
                    remove_matcher(&matcher, &mut output_matchers);
                }

                Some(matcher) = remove_filter_rx.recv() => {
                    remove_matcher(&matcher, &mut filter_matchers);
                }

                _ = ticker.tick() => {
                    let elapsed = last_render.elapsed().as_secs().max(1);
                    stats.render(elapsed);
                    stats.reset_period();
                    last_render = Instant::now();

                    if config.verbose {
                        report_queue_depths(&hub_tx, &output_matchers, &filter_matchers);
                    }
                }

                pack = hub_rx.recv() => match pack {
                    Some(pack) => dispatch(&stats, &output_matchers, &filter_matchers, pack).await,
                    // Every producer handle dropped; nothing left to route.
                    None => break,
                }
            }
        }

        let s = stats.snapshot();
        tracing::info!(
            total_msgs = s.total_processed_msgs,
            total_bytes = s.total_processed_bytes,
            input_msgs = s.total_input_msgs,
            unmatched = s.unmatched,
            "router shutdown"
        );
    }
}

impl std::fmt::Debug for MessageRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRouter")
            .field("outputs", &self.output_matcher_count())
            .field("filters", &self.filter_matcher_count())
            .field("hub_capacity", &self.config.hub_capacity)
            .finish()
    }
}

/// Route one pack to every matching destination
///
/// Statistics first, then diagnostics reset, then matching. Output matchers
/// are evaluated before filter matchers: a filter may rewrite the pack's
/// ident after delivery, and a shared pack that matched a filter must not
/// also match an output in the same pass. Tombstoned slots are skipped.
async fn dispatch(
    stats: &RouterStats,
    output_matchers: &[Option<Arc<Matcher>>],
    filter_matchers: &[Option<Arc<Matcher>>],
    pack: PackRef,
) {
    let msg_bytes = pack.data().payload_len() as u64;
    stats.update(msg_bytes, pack.is_input());

    pack.reset_diagnostics();

    let mut found_match = false;
    found_match |= dispatch_to(output_matchers, &pack).await;
    found_match |= dispatch_to(filter_matchers, &pack).await;

    if !found_match {
        stats.record_unmatched();
        let data = pack.data();
        tracing::debug!(
            ident = %data.ident,
            project = %data.project,
            "pack matched no destination"
        );
    }

    // The hub-receive reference, independent of the references handed to
    // destinations above.
    pack.recycle();
}

/// Deliver the pack to every matching destination in one collection
///
/// Returns true if at least one matcher matched. Each delivery takes its
/// own reference and stamps the diagnostics trail; sends block when the
/// destination channel is full (backpressure).
async fn dispatch_to(matchers: &[Option<Arc<Matcher>>], pack: &PackRef) -> bool {
    let mut found_match = false;

    for matcher in matchers.iter().flatten() {
        if !matcher.matches(pack) {
            continue;
        }
        found_match = true;

        pack.inc_ref();
        pack.add_stamp(matcher.stamp_name());
        if matcher.deliver(Arc::clone(pack)).await.is_err() {
            // Channel closes are serialized with dispatch through the
            // removal protocol, so a closed channel here means a destination
            // dropped its receiver outside the protocol.
            panic!(
                "delivery to closed channel for destination `{}`",
                matcher.name()
            );
        }
    }

    found_match
}

/// Apply a removal command: close the channel, tombstone the slot
///
/// Identity is pointer equality, matching the registration handle. The
/// destination keeps draining already-queued packs from its receiver and
/// then observes closure. Removing an unknown matcher is a no-op.
fn remove_matcher(target: &Arc<Matcher>, matchers: &mut MatcherSlots) {
    for slot in matchers.iter_mut() {
        let Some(matcher) = slot else { continue };
        if Arc::ptr_eq(matcher, target) {
            tracing::debug!(destination = matcher.name(), "closed matcher channel");
            matcher.close();
            *slot = None;
            return;
        }
    }
}

/// Verbose tick report: hub and per-destination queue depths
///
/// Full channels are flagged with `(F)` - the first thing to look at when
/// throughput stalls.
fn report_queue_depths(
    hub_tx: &mpsc::Sender<PackRef>,
    output_matchers: &[Option<Arc<Matcher>>],
    filter_matchers: &[Option<Arc<Matcher>>],
) {
    use std::fmt::Write;

    let hub_max = hub_tx.max_capacity();
    let hub_queued = hub_max - hub_tx.capacity();
    let mut line = format!("queued hub={hub_queued}");
    if hub_queued == hub_max {
        line.push_str("(F)");
    }

    for matcher in output_matchers.iter().chain(filter_matchers).flatten() {
        if let Some((depth, cap)) = matcher.queue_depth() {
            let _ = write!(line, " {}:{}", matcher.name(), depth);
            if depth == cap {
                line.push_str("(F)");
            }
        }
    }

    tracing::info!("{line}");
}

/// Cloneable control surface for a running router
///
/// Producers enqueue and inject packs through it; hosts request matcher
/// removal and drive shutdown.
#[derive(Clone)]
pub struct RouterHandle {
    hub_tx: mpsc::Sender<PackRef>,
    remove_output_tx: mpsc::Sender<Arc<Matcher>>,
    remove_filter_tx: mpsc::Sender<Arc<Matcher>>,
    registered: Arc<Mutex<Vec<Arc<Matcher>>>>,
    stats: Arc<RouterStats>,
    shutdown: CancellationToken,
    max_pack_loops: u32,
    stop_poll_interval: Duration,
}

impl RouterHandle {
    /// Send a pack into the hub, waiting when the hub is full
    ///
    /// This is the primary backpressure mechanism: a slow destination fills
    /// its channel, the router blocks on delivery, the hub fills, and
    /// producers slow down here. No error reaches the producer; if the
    /// router is gone the pack is recycled so the pool cannot leak.
    pub async fn enqueue(&self, pack: PackRef) {
        if let Err(err) = self.hub_tx.send(pack).await {
            tracing::warn!("router hub closed, recycling pack");
            err.0.recycle();
        }
    }

    /// Re-inject a filter-generated pack
    ///
    /// Bumps the pack's loop count; packs re-injected more than the
    /// configured maximum are dropped as runaways and returned to the pool.
    pub async fn inject(&self, pack: PackRef) {
        let loops = pack.bump_loop_count();
        if loops > self.max_pack_loops {
            let ident = pack.data().ident.clone();
            tracing::warn!(
                %ident,
                loops,
                max = self.max_pack_loops,
                "pack exceeded re-injection budget, dropping"
            );
            pack.recycle();
            return;
        }
        self.enqueue(pack).await;
    }

    /// Request removal of an output matcher
    ///
    /// Safe from any task; the router applies it between dispatch
    /// iterations. Removing a matcher that was never registered is a no-op.
    pub async fn remove_output_matcher(&self, matcher: &Arc<Matcher>) -> Result<()> {
        self.remove_output_tx
            .send(Arc::clone(matcher))
            .await
            .map_err(|_| EngineError::RouterStopped)
    }

    /// Request removal of a filter matcher
    pub async fn remove_filter_matcher(&self, matcher: &Arc<Matcher>) -> Result<()> {
        self.remove_filter_tx
            .send(Arc::clone(matcher))
            .await
            .map_err(|_| EngineError::RouterStopped)
    }

    /// Snapshot of the router's throughput counters
    pub fn stats(&self) -> crate::stats::StatsSnapshot {
        self.stats.snapshot()
    }

    /// Shut the router down
    ///
    /// Polls until every registered destination reports itself stopped,
    /// then signals the control loop, which drains the hub and exits.
    /// Idempotent: calling it again after the router stopped returns
    /// immediately.
    pub async fn stop(&self) {
        loop {
            let pending = self
                .registered
                .lock()
                .iter()
                .filter(|m| !m.runner_stopped())
                .count();
            if pending == 0 {
                break;
            }
            tracing::trace!(pending, "waiting for destinations to stop");
            tokio::time::sleep(self.stop_poll_interval).await;
        }

        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for RouterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterHandle")
            .field("stopping", &self.shutdown.is_cancelled())
            .finish()
    }
}
