use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};
use tracing::info;

#[derive(Debug, Default)]
pub struct StatsCollector {
    total_queries: AtomicU64,
    flagged_queries: AtomicU64,
    blocked_queries: AtomicU64,
    reloads_succeeded: AtomicU64,
    reloads_failed: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub total_queries: u64,
    pub flagged_queries: u64,
    pub blocked_queries: u64,
    pub reloads_succeeded: u64,
    pub reloads_failed: u64,
}

impl StatsCollector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn inc_queries(&self) {
        self.total_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_flagged(&self) {
        self.flagged_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_blocked(&self) {
        self.blocked_queries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reload_succeeded(&self) {
        self.reloads_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reload_failed(&self) {
        self.reloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            total_queries: self.total_queries.load(Ordering::Relaxed),
            flagged_queries: self.flagged_queries.load(Ordering::Relaxed),
            blocked_queries: self.blocked_queries.load(Ordering::Relaxed),
            reloads_succeeded: self.reloads_succeeded.load(Ordering::Relaxed),
            reloads_failed: self.reloads_failed.load(Ordering::Relaxed),
        }
    }

    /// Spawns the periodic stats dump.
    pub fn spawn_logger(self: &Arc<Self>, log_interval: Duration) -> JoinHandle<()> {
        let stats = self.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(log_interval);
            // The first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                stats.dump_stats();
            }
        })
    }

    fn dump_stats(&self) {
        let s = self.snapshot();
        info!(
            "STATS DUMP: Total: {}, Flagged: {} ({:.1}%), Blocked: {}, Reloads: {} ok / {} failed",
            s.total_queries,
            s.flagged_queries,
            if s.total_queries > 0 {
                (s.flagged_queries as f64 / s.total_queries as f64) * 100.0
            } else {
                0.0
            },
            s.blocked_queries,
            s.reloads_succeeded,
            s.reloads_failed
        );
    }
}
