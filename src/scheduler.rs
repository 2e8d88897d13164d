//! Fixed-interval scheduling of ingestion and stats recomputation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::Config;
use crate::ingest::IngestionCoordinator;

/// Drives the coordinator on two independent timers: full ingestion on a
/// long period (with one delayed kickoff shortly after startup, giving
/// storage time to finish connecting), and a more frequent stats-only
/// recomputation that re-derives the snapshot from whatever is stored.
pub struct Scheduler {
    coordinator: Arc<IngestionCoordinator>,
    ingest_interval: Duration,
    startup_delay: Duration,
    stats_interval: Duration,
    stats_max_attempts: u32,
    serialize_cycles: bool,
    cycle_in_progress: Arc<AtomicBool>,
}

impl Scheduler {
    pub fn new(coordinator: Arc<IngestionCoordinator>, config: &Config) -> Self {
        Self {
            coordinator,
            ingest_interval: config.ingest_interval(),
            startup_delay: config.startup_delay(),
            stats_interval: config.stats_interval(),
            stats_max_attempts: config.ingestion.stats_max_attempts,
            serialize_cycles: config.ingestion.serialize_cycles,
            cycle_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Spawn both timer loops. Fire-and-forget; the tasks run for the
    /// life of the process.
    pub fn start(&self) {
        self.spawn_ingest_loop();
        self.spawn_stats_loop();
        info!(
            "Scheduler started: ingestion every {:?} (kickoff in {:?}), stats every {:?}",
            self.ingest_interval, self.startup_delay, self.stats_interval
        );
    }

    fn spawn_ingest_loop(&self) {
        let coordinator = self.coordinator.clone();
        let in_progress = self.cycle_in_progress.clone();
        let serialize = self.serialize_cycles;
        let startup_delay = self.startup_delay;
        let interval = self.ingest_interval;

        tokio::spawn(async move {
            tokio::time::sleep(startup_delay).await;
            run_guarded_cycle(&coordinator, &in_progress, serialize).await;

            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick
            loop {
                ticker.tick().await;
                run_guarded_cycle(&coordinator, &in_progress, serialize).await;
            }
        });
    }

    fn spawn_stats_loop(&self) {
        let coordinator = self.coordinator.clone();
        let interval = self.stats_interval;
        let max_attempts = self.stats_max_attempts;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !coordinator.recompute_stats(max_attempts).await {
                    warn!("Scheduled stats recomputation skipped, storage not ready");
                }
            }
        });
    }
}

/// Run one cycle, optionally skipping when another scheduled cycle is
/// still in flight. Upserts are idempotent and recomputation is a pure
/// re-derivation, so overlap is safe; the guard only avoids redundant
/// upstream calls under heavy skew.
async fn run_guarded_cycle(
    coordinator: &IngestionCoordinator,
    in_progress: &AtomicBool,
    serialize: bool,
) {
    if serialize && in_progress.swap(true, Ordering::AcqRel) {
        warn!("Previous ingestion cycle still running, skipping this tick");
        return;
    }

    let outcome = coordinator.run_cycle().await;
    if serialize {
        in_progress.store(false, Ordering::Release);
    }

    info!(
        "Scheduled ingestion tick finished: {} updated, {} errors",
        outcome.updated, outcome.errors
    );
}
