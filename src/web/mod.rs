//! Web server module
//!
//! Read-only JSON surface for the dashboard plus the manual ingestion
//! trigger. The dashboard itself lives elsewhere and only ever reads.

mod routes;

use anyhow::Result;
use axum::http::HeaderValue;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::Config;
use crate::db::Database;
use crate::ingest::IngestionCoordinator;

pub struct AppState {
    pub db: Database,
    pub coordinator: Arc<IngestionCoordinator>,
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(routes::healthz))
        .route("/api/countries", get(routes::api_countries))
        .route("/api/tourism-data", get(routes::api_records))
        .route("/api/tourism-data/yearly", get(routes::api_yearly))
        .route("/api/tourism-data/monthly/:year", get(routes::api_monthly))
        .route("/api/stats", get(routes::api_stats))
        .route("/api/covid-impact", get(routes::api_covid_impact))
        .route("/api/data-sources", get(routes::api_data_sources))
        .route("/api/refresh", post(routes::api_refresh))
        .with_state(state)
}

pub async fn start_server(
    config: &Config,
    db: Database,
    coordinator: Arc<IngestionCoordinator>,
) -> Result<()> {
    let state = Arc::new(AppState { db, coordinator });

    let cors = if config.server.allowed_origin.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origin: HeaderValue = config.server.allowed_origin.parse()?;
        CorsLayer::new()
            .allow_origin(origin)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = create_router(state).layer(cors);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Web server starting on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
