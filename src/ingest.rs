//! Ingestion coordination
//!
//! One cycle: check storage readiness, acquire a window through the tier
//! pipeline, upsert each record, then recompute the summary snapshot with
//! a bounded retry. Storage may take tens of seconds to become reachable
//! after process start, so recomputation polls readiness before touching
//! the snapshot rather than persisting a placeholder.

use anyhow::Result;
use chrono::{Datelike, Utc};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::acquisition::AcquisitionPipeline;
use crate::config::IngestionConfig;
use crate::db::{round1, Database};

/// Result of one ingestion cycle
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct CycleOutcome {
    pub updated: u64,
    pub errors: u64,
}

pub struct IngestionCoordinator {
    db: Database,
    pipeline: AcquisitionPipeline,
    stats_max_attempts: u32,
    readiness_wait: Duration,
}

impl IngestionCoordinator {
    pub fn new(db: Database, pipeline: AcquisitionPipeline, config: &IngestionConfig) -> Self {
        Self {
            db,
            pipeline,
            stats_max_attempts: config.stats_max_attempts,
            readiness_wait: Duration::from_secs(config.readiness_wait_secs),
        }
    }

    /// Run one full acquire-upsert-recompute cycle.
    ///
    /// Unreachable storage skips the cycle; the next scheduled tick
    /// retries. A single record failing to upsert is counted and logged
    /// without aborting the rest of the batch.
    pub async fn run_cycle(&self) -> CycleOutcome {
        if !self.db.is_ready().await {
            warn!("Storage not ready, skipping ingestion cycle");
            return CycleOutcome::default();
        }

        let records = self.pipeline.acquire().await;
        if records.is_empty() {
            return CycleOutcome::default();
        }

        let mut outcome = CycleOutcome::default();
        for record in &records {
            match self.db.upsert_record(record).await {
                Ok(()) => outcome.updated += 1,
                Err(e) => {
                    outcome.errors += 1;
                    warn!(
                        "Failed to upsert record {}-{:02} {}: {}",
                        record.year, record.month, record.country, e
                    );
                }
            }
        }

        if !self.recompute_stats(self.stats_max_attempts).await {
            warn!("Snapshot recomputation failed, previous snapshot kept");
        }

        if let Err(e) = self.db.mark_ingest(Utc::now()).await {
            warn!("Failed to stamp ingest time: {}", e);
        }

        info!(
            "Ingestion cycle complete: {} updated, {} errors",
            outcome.updated, outcome.errors
        );
        outcome
    }

    /// Recompute the summary snapshot, retrying with linear backoff.
    ///
    /// Returns false once the retry budget is exhausted; the previous
    /// snapshot is left untouched in that case.
    pub async fn recompute_stats(&self, max_attempts: u32) -> bool {
        for attempt in 1..=max_attempts {
            match self.try_recompute().await {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        "Stats recomputation attempt {}/{} failed: {}",
                        attempt, max_attempts, e
                    );
                    if attempt < max_attempts {
                        tokio::time::sleep(Duration::from_millis(1_000 * u64::from(attempt))).await;
                    }
                }
            }
        }

        error!(
            "Stats recomputation failed after {} attempts, keeping previous snapshot",
            max_attempts
        );
        false
    }

    async fn try_recompute(&self) -> Result<()> {
        if !self.wait_ready().await {
            anyhow::bail!("storage not ready within {:?}", self.readiness_wait);
        }

        let now = Utc::now();
        let (year, month) = (now.year(), now.month());
        let (prev_year, prev_month) = previous_month(year, month);

        let total = self.db.sum_for_month(year, month).await?;
        let previous = self.db.sum_for_month(prev_year, prev_month).await?;
        let growth = growth_percent(total, previous);
        let top_country = self
            .db
            .top_country_for_month(year, month)
            .await?
            .unwrap_or_else(|| "N/A".to_string());

        self.db
            .upsert_snapshot(total, growth, &top_country, now)
            .await?;

        info!(
            "Stats updated: total={}, growth={}%, top={}",
            total, growth, top_country
        );
        Ok(())
    }

    /// Poll readiness up to the configured bound, one ping per second.
    async fn wait_ready(&self) -> bool {
        let deadline = Instant::now() + self.readiness_wait;
        loop {
            if self.db.is_ready().await {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }
}

/// The calendar month preceding (year, month), rolling over at January.
pub fn previous_month(year: i32, month: u32) -> (i32, u32) {
    if month == 1 {
        (year - 1, 12)
    } else {
        (year, month - 1)
    }
}

/// Month-over-month growth in percent, one decimal.
/// An empty previous month counts as 1 visitor so the division is defined.
pub fn growth_percent(current: i64, previous: i64) -> f64 {
    let previous = previous.max(1);
    round1((current - previous) as f64 / previous as f64 * 100.0)
}
