//! Router throughput statistics
//!
//! Atomic total/period counters updated on the dispatch path and rendered
//! on each tick. All operations use relaxed ordering; the numbers are
//! eventually consistent, not real-time.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters maintained by the message router
///
/// `total_*` counters are cumulative for the process lifetime; `period_*`
/// counters reset after every tick render. Input counters only move for
/// packs flagged input-origin.
#[derive(Debug, Default)]
pub struct RouterStats {
    total_processed_msgs: AtomicU64,
    period_processed_msgs: AtomicU64,
    total_processed_bytes: AtomicU64,
    period_processed_bytes: AtomicU64,

    total_input_msgs: AtomicU64,
    period_input_msgs: AtomicU64,
    total_input_bytes: AtomicU64,
    period_input_bytes: AtomicU64,

    total_max_msg_bytes: AtomicU64,
    period_max_msg_bytes: AtomicU64,

    /// Packs that matched no destination
    unmatched: AtomicU64,
}

impl RouterStats {
    pub const fn new() -> Self {
        Self {
            total_processed_msgs: AtomicU64::new(0),
            period_processed_msgs: AtomicU64::new(0),
            total_processed_bytes: AtomicU64::new(0),
            period_processed_bytes: AtomicU64::new(0),
            total_input_msgs: AtomicU64::new(0),
            period_input_msgs: AtomicU64::new(0),
            total_input_bytes: AtomicU64::new(0),
            period_input_bytes: AtomicU64::new(0),
            total_max_msg_bytes: AtomicU64::new(0),
            period_max_msg_bytes: AtomicU64::new(0),
            unmatched: AtomicU64::new(0),
        }
    }

    /// Record one pack entering dispatch
    pub fn update(&self, msg_bytes: u64, input: bool) {
        self.total_processed_msgs.fetch_add(1, Ordering::Relaxed);
        self.period_processed_msgs.fetch_add(1, Ordering::Relaxed);
        self.total_processed_bytes
            .fetch_add(msg_bytes, Ordering::Relaxed);
        self.period_processed_bytes
            .fetch_add(msg_bytes, Ordering::Relaxed);
        self.total_max_msg_bytes
            .fetch_max(msg_bytes, Ordering::Relaxed);
        self.period_max_msg_bytes
            .fetch_max(msg_bytes, Ordering::Relaxed);

        if input {
            self.total_input_msgs.fetch_add(1, Ordering::Relaxed);
            self.period_input_msgs.fetch_add(1, Ordering::Relaxed);
            self.total_input_bytes
                .fetch_add(msg_bytes, Ordering::Relaxed);
            self.period_input_bytes
                .fetch_add(msg_bytes, Ordering::Relaxed);
        }
    }

    /// Record a pack that matched no destination
    #[inline]
    pub fn record_unmatched(&self) {
        self.unmatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_processed_msgs: self.total_processed_msgs.load(Ordering::Relaxed),
            period_processed_msgs: self.period_processed_msgs.load(Ordering::Relaxed),
            total_processed_bytes: self.total_processed_bytes.load(Ordering::Relaxed),
            period_processed_bytes: self.period_processed_bytes.load(Ordering::Relaxed),
            total_input_msgs: self.total_input_msgs.load(Ordering::Relaxed),
            period_input_msgs: self.period_input_msgs.load(Ordering::Relaxed),
            total_input_bytes: self.total_input_bytes.load(Ordering::Relaxed),
            period_input_bytes: self.period_input_bytes.load(Ordering::Relaxed),
            total_max_msg_bytes: self.total_max_msg_bytes.load(Ordering::Relaxed),
            period_max_msg_bytes: self.period_max_msg_bytes.load(Ordering::Relaxed),
            unmatched: self.unmatched.load(Ordering::Relaxed),
        }
    }

    /// Zero the period counters, called after each tick render
    pub fn reset_period(&self) {
        self.period_processed_msgs.store(0, Ordering::Relaxed);
        self.period_processed_bytes.store(0, Ordering::Relaxed);
        self.period_input_msgs.store(0, Ordering::Relaxed);
        self.period_input_bytes.store(0, Ordering::Relaxed);
        self.period_max_msg_bytes.store(0, Ordering::Relaxed);
    }

    /// Render cumulative and period throughput, one line each
    ///
    /// `elapsed_secs` is the period length used for rates.
    pub fn render(&self, elapsed_secs: u64) {
        let s = self.snapshot();
        let secs = elapsed_secs.max(1);

        tracing::info!(
            "[stats] total: {} msgs, {} | period: {}, {} | max msg: {} (total {}) | unmatched: {}",
            format_count(s.total_processed_msgs),
            format_bytes(s.total_processed_bytes),
            format_rate(s.period_processed_msgs as f64 / secs as f64),
            format_bytes_per_sec(s.period_processed_bytes as f64 / secs as f64),
            format_bytes(s.period_max_msg_bytes),
            format_bytes(s.total_max_msg_bytes),
            s.unmatched,
        );

        if s.total_input_msgs > 0 {
            tracing::info!(
                "[stats] input: {} msgs, {} | period: {}, {}",
                format_count(s.total_input_msgs),
                format_bytes(s.total_input_bytes),
                format_rate(s.period_input_msgs as f64 / secs as f64),
                format_bytes_per_sec(s.period_input_bytes as f64 / secs as f64),
            );
        }
    }
}

/// Point-in-time snapshot of router statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub total_processed_msgs: u64,
    pub period_processed_msgs: u64,
    pub total_processed_bytes: u64,
    pub period_processed_bytes: u64,
    pub total_input_msgs: u64,
    pub period_input_msgs: u64,
    pub total_input_bytes: u64,
    pub period_input_bytes: u64,
    pub total_max_msg_bytes: u64,
    pub period_max_msg_bytes: u64,
    pub unmatched: u64,
}

/// Format count with K/M suffix for readability
pub fn format_count(count: u64) -> String {
    const K: u64 = 1000;
    const M: u64 = 1_000_000;

    if count >= M {
        format!("{:.1}M", count as f64 / M as f64)
    } else if count >= K {
        format!("{:.1}K", count as f64 / K as f64)
    } else {
        count.to_string()
    }
}

/// Format bytes in human-readable form (KB, MB, GB)
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format rate per second with K/M suffix
pub fn format_rate(rate: f64) -> String {
    const K: f64 = 1000.0;
    const M: f64 = 1_000_000.0;

    if rate >= M {
        format!("{:.1}M/s", rate / M)
    } else if rate >= K {
        format!("{:.1}K/s", rate / K)
    } else {
        format!("{:.0}/s", rate)
    }
}

/// Format bytes per second in human-readable form
pub fn format_bytes_per_sec(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;
    const GB: f64 = 1024.0 * 1024.0 * 1024.0;

    if bytes_per_sec >= GB {
        format!("{:.1} GB/s", bytes_per_sec / GB)
    } else if bytes_per_sec >= MB {
        format!("{:.1} MB/s", bytes_per_sec / MB)
    } else if bytes_per_sec >= KB {
        format!("{:.1} KB/s", bytes_per_sec / KB)
    } else {
        format!("{:.0} B/s", bytes_per_sec)
    }
}
