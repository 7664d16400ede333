//! Ownership and refresh of the live [`DomainIndex`].
//!
//! The controller builds the first index synchronously, then refreshes it on a
//! fixed (pre-jittered) period from a background task. Readers hold an
//! [`IndexReader`] and load the current snapshot without taking a lock; a
//! rebuild is published with a single `ArcSwap::store`, so a reader sees either
//! the old index or the new one and never a partial build.

use super::index::DomainIndex;
use super::traits::IndexSource;
use crate::error::{SetupError, SourceError};
use crate::stats::StatsCollector;
use arc_swap::{ArcSwap, Guard};
use rand::Rng;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Upper bound of the random reduction applied to the reload period.
pub const MAX_JITTER_PERCENT: u32 = 30;

/// Shortens `period` by a random amount of at most [`MAX_JITTER_PERCENT`].
pub fn jitter(period: Duration) -> Duration {
    jitter_with(period, &mut rand::thread_rng())
}

pub fn jitter_with<R: Rng>(period: Duration, rng: &mut R) -> Duration {
    let max_jitter = period / 100 * MAX_JITTER_PERCENT;
    if max_jitter.is_zero() {
        return period;
    }
    let min_duration = period - max_jitter;
    min_duration + rng.gen_range(Duration::ZERO..=max_jitter)
}

/// One published index together with its provenance.
#[derive(Debug)]
pub struct IndexSnapshot {
    index: DomainIndex,
    generation: u64,
    built_at: SystemTime,
}

impl IndexSnapshot {
    fn new(index: DomainIndex, generation: u64) -> Self {
        Self {
            index,
            generation,
            built_at: SystemTime::now(),
        }
    }

    pub fn index(&self) -> &DomainIndex {
        &self.index
    }

    /// Starts at 0 for the initial build and grows by one per successful reload.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn built_at(&self) -> SystemTime {
        self.built_at
    }
}

impl Deref for IndexSnapshot {
    type Target = DomainIndex;

    fn deref(&self) -> &DomainIndex {
        &self.index
    }
}

/// Cheap, cloneable read handle onto the current index.
#[derive(Clone)]
pub struct IndexReader {
    current: Arc<ArcSwap<IndexSnapshot>>,
}

impl IndexReader {
    /// A reader over a fixed index that nothing will ever replace.
    pub fn fixed(index: DomainIndex) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(IndexSnapshot::new(index, 0))),
        }
    }

    /// Borrow the current snapshot for the duration of one lookup.
    pub fn load(&self) -> Guard<Arc<IndexSnapshot>> {
        self.current.load()
    }

    pub fn load_full(&self) -> Arc<IndexSnapshot> {
        self.current.load_full()
    }
}

struct ReloadState {
    current: Arc<ArcSwap<IndexSnapshot>>,
    source: Arc<dyn IndexSource>,
    generation: AtomicU64,
    // Serializes writers so generations are published in order.
    rebuild_lock: Mutex<()>,
    stats: Arc<StatsCollector>,
}

impl ReloadState {
    async fn rebuild(&self) -> Result<Arc<IndexSnapshot>, SourceError> {
        let _writer = self.rebuild_lock.lock().await;
        let started = Instant::now();

        match self.source.load().await {
            Ok(index) => {
                let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
                let snapshot = Arc::new(IndexSnapshot::new(index, generation));
                self.current.store(snapshot.clone());
                self.stats.inc_reload_succeeded();
                info!(
                    "Domain index reloaded from {}: {} entries, generation {} ({:?})",
                    self.source.describe(),
                    snapshot.len(),
                    generation,
                    started.elapsed()
                );
                Ok(snapshot)
            }
            Err(e) => {
                self.stats.inc_reload_failed();
                warn!(
                    "Reload from {} failed, keeping generation {}: {}",
                    self.source.describe(),
                    self.current.load().generation(),
                    e
                );
                Err(e)
            }
        }
    }
}

/// Owns the live index and the background refresh loop.
pub struct ReloadController {
    state: Arc<ReloadState>,
    reload_period: Duration,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ReloadController {
    /// Builds the first index (which must succeed) and, for a non-zero
    /// `reload_period`, spawns the refresh loop.
    pub async fn start(
        source: Arc<dyn IndexSource>,
        reload_period: Duration,
        stats: Arc<StatsCollector>,
    ) -> Result<Self, SetupError> {
        info!("Building initial domain index from {}", source.describe());
        let index = source.load().await.map_err(|e| {
            error!("Initial domain index build failed: {}", e);
            SetupError::InitialBuild(e)
        })?;
        info!("Initial domain index ready with {} entries", index.len());

        let state = Arc::new(ReloadState {
            current: Arc::new(ArcSwap::from_pointee(IndexSnapshot::new(index, 0))),
            source,
            generation: AtomicU64::new(0),
            rebuild_lock: Mutex::new(()),
            stats,
        });

        let shutdown = CancellationToken::new();
        let task = if reload_period.is_zero() {
            info!("Periodic reload disabled");
            None
        } else {
            Some(tokio::spawn(run_reload_loop(
                state.clone(),
                reload_period,
                shutdown.clone(),
            )))
        };

        Ok(Self {
            state,
            reload_period,
            shutdown,
            task,
        })
    }

    pub fn reader(&self) -> IndexReader {
        IndexReader {
            current: self.state.current.clone(),
        }
    }

    pub fn reload_period(&self) -> Duration {
        self.reload_period
    }

    /// When the currently served index was built.
    pub fn last_reload(&self) -> SystemTime {
        self.state.current.load().built_at()
    }

    /// Rebuilds right away, outside the timer. On failure the current index
    /// stays in service.
    pub async fn reload(&self) -> Result<Arc<IndexSnapshot>, SourceError> {
        self.state.rebuild().await
    }

    /// Stops the refresh loop. Does not wait for a rebuild that is in flight.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            info!("Stopping domain index reload loop");
            self.shutdown.cancel();
        }
    }

    /// Whether the background loop is still alive.
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for ReloadController {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_reload_loop(state: Arc<ReloadState>, period: Duration, shutdown: CancellationToken) {
    info!("Reloading domain index every {:?}", period);
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {
                debug!("Scheduled domain index reload");
                // Detached so shutdown neither aborts nor waits on it.
                let rebuild = tokio::spawn({
                    let state = state.clone();
                    async move {
                        let _ = state.rebuild().await;
                    }
                });
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    joined = rebuild => {
                        if let Err(e) = joined {
                            error!("Reload task failed: {}", e);
                        }
                    }
                }
            }
        }
    }
    debug!("Reload loop stopped");
}
