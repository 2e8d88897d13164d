//! Tertiary tier: external data provider

use chrono::Utc;

use super::{build_window, AcquisitionTier, TierError};
use crate::db::{DataSource, VisitorRecord};

/// Last-resort provider estimates. Always able to produce a window, but
/// the figures are unofficial.
pub struct ExternalProviderTier;

#[async_trait::async_trait]
impl AcquisitionTier for ExternalProviderTier {
    fn name(&self) -> &str {
        "external-provider"
    }

    fn source(&self) -> DataSource {
        DataSource::External
    }

    async fn attempt(&self) -> Result<Vec<VisitorRecord>, TierError> {
        Ok(build_window(Utc::now()))
    }
}
