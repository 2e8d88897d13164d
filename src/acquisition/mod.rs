//! Multi-tier data acquisition with ordered fallback

pub mod external;
pub mod official;
pub mod scrape;
mod window;

pub use window::{build_window, month_window, TARGET_COUNTRIES};

use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{DataSource, VisitorRecord};

/// Errors that can occur inside one acquisition tier.
#[derive(Debug, Error)]
pub enum TierError {
    /// Upstream endpoint could not be reached.
    #[error("upstream unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),

    /// Upstream answered with a non-success status.
    #[error("upstream returned status {0}")]
    Status(u16),
}

/// One data-acquisition strategy in the fallback chain.
///
/// A tier produces the full trailing 12-month window or nothing. Probe
/// failures are returned as errors so the pipeline can fall through to
/// the next tier; an empty result set is equally treated as a miss.
#[async_trait::async_trait]
pub trait AcquisitionTier: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Provenance tag applied to every record this tier produces.
    fn source(&self) -> DataSource;

    /// Whether this tier's figures count as official statistics.
    fn official(&self) -> bool {
        !matches!(self.source(), DataSource::External)
    }

    /// Produce records for the trailing window, or fail.
    async fn attempt(&self) -> Result<Vec<VisitorRecord>, TierError>;
}

/// Ordered chain of acquisition tiers.
///
/// Tiers run sequentially because only the first non-empty batch is used;
/// speculative parallel calls would waste upstream requests.
pub struct AcquisitionPipeline {
    tiers: Vec<Box<dyn AcquisitionTier>>,
    tier_timeout: Duration,
}

impl AcquisitionPipeline {
    pub fn new(tiers: Vec<Box<dyn AcquisitionTier>>, tier_timeout: Duration) -> Self {
        Self {
            tiers,
            tier_timeout,
        }
    }

    /// Try each tier in order and return the first non-empty batch,
    /// stamped with that tier's provenance. Tier failures are logged and
    /// swallowed; all tiers coming up empty is a valid "no data this
    /// cycle" outcome, not an error.
    pub async fn acquire(&self) -> Vec<VisitorRecord> {
        for tier in &self.tiers {
            let records = match tokio::time::timeout(self.tier_timeout, tier.attempt()).await {
                Ok(Ok(records)) => records,
                Ok(Err(e)) => {
                    warn!("Acquisition tier '{}' failed: {}", tier.name(), e);
                    continue;
                }
                Err(_) => {
                    warn!(
                        "Acquisition tier '{}' timed out after {:?}",
                        tier.name(),
                        self.tier_timeout
                    );
                    continue;
                }
            };

            if records.is_empty() {
                warn!("Acquisition tier '{}' returned no records", tier.name());
                continue;
            }

            info!(
                "Acquired {} records from tier '{}' ({})",
                records.len(),
                tier.name(),
                tier.source().as_str()
            );
            return records
                .into_iter()
                .map(|r| r.with_provenance(tier.source(), tier.official()))
                .collect();
        }

        info!("All acquisition tiers came up empty, no data this cycle");
        Vec::new()
    }
}
