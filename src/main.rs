//! Binary entry point for the arrivals service
//!
//! Wires storage, the acquisition pipeline, the scheduler, and the web
//! server together. Core functionality lives in the `arrivals` library.

use anyhow::Result;
use arrivals::acquisition::{
    external::ExternalProviderTier, official::OfficialFeedTier, scrape::SiteScrapeTier,
    AcquisitionPipeline, AcquisitionTier,
};
use arrivals::ingest::IngestionCoordinator;
use arrivals::scheduler::Scheduler;
use arrivals::{config, db, web};
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (before any other initialization)
    let _ = dotenvy::dotenv();

    // Initialize logging based on LOG_FORMAT env var
    // Use LOG_FORMAT=gcp for structured GCP Cloud Logging
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "gcp" {
        tracing_subscriber::registry()
            .with(tracing_subscriber::filter::LevelFilter::INFO)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_max_level(Level::INFO).init();
    }

    info!("Starting arrivals service...");

    // Load configuration
    let config = config::Config::load()?;
    info!("Configuration loaded");

    // Initialize database; failure here is a configuration error and fatal.
    // Everything after this point retries instead of crashing.
    let db = db::Database::new(&config.database).await?;
    db.run_migrations().await?;
    info!("Database initialized");

    // Acquisition chain, most trusted source first
    let tiers: Vec<Box<dyn AcquisitionTier>> = vec![
        Box::new(OfficialFeedTier::new(&config.acquisition)?),
        Box::new(SiteScrapeTier::new(&config.acquisition)?),
        Box::new(ExternalProviderTier),
    ];
    let pipeline = AcquisitionPipeline::new(tiers, config.acquire_timeout());

    // The coordinator holds the only write handle to both stores
    let coordinator = Arc::new(IngestionCoordinator::new(
        db.clone(),
        pipeline,
        &config.ingestion,
    ));

    let scheduler = Scheduler::new(coordinator.clone(), &config);
    scheduler.start();

    // Start web server (blocking)
    web::start_server(&config, db, coordinator).await?;

    Ok(())
}
