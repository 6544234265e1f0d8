//! Engine configuration
//!
//! Capacities and intervals for the message router, pack pool, and
//! destination channels. Everything has a sensible default - a minimal
//! config should just work.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the message router and pack pool
///
/// All fields have defaults - you only need to specify what you want to
/// change. The router takes this object at construction time; there is no
/// process-global configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Capacity of the router's inbound hub channel
    /// Default: 1000
    pub hub_capacity: usize,

    /// Capacity of each destination's input channel
    /// Default: 1000
    pub plugin_channel_capacity: usize,

    /// Number of packs in the shared pool
    /// Default: 2000
    pub pool_capacity: usize,

    /// Seconds between throughput reports
    /// Default: 10
    pub ticker_interval_secs: u64,

    /// Maximum times a pack may be re-injected by filters before it is
    /// dropped as a runaway
    /// Default: 4
    pub max_pack_loops: u32,

    /// Milliseconds between destination stopped-state polls during shutdown
    /// Default: 50
    pub stop_poll_interval_ms: u64,

    /// Report hub and per-destination queue depths on each tick
    /// Default: false
    pub verbose: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            hub_capacity: 1000,
            plugin_channel_capacity: 1000,
            pool_capacity: 2000,
            ticker_interval_secs: 10,
            max_pack_loops: 4,
            stop_poll_interval_ms: 50,
            verbose: false,
        }
    }
}

impl EngineConfig {
    /// Tick interval as a `Duration`
    pub fn ticker_interval(&self) -> Duration {
        Duration::from_secs(self.ticker_interval_secs.max(1))
    }

    /// Shutdown poll interval as a `Duration`
    pub fn stop_poll_interval(&self) -> Duration {
        Duration::from_millis(self.stop_poll_interval_ms.max(1))
    }
}
