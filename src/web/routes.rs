//! HTTP routes with response caching

use axum::{
    extract::{Path, Query, State},
    Json,
};
use cached::proc_macro::cached;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::AppState;
use crate::db::{
    CovidImpact, Database, MonthlyTotal, SourceStat, StatsSnapshot, VisitorRecord, YearlyTotal,
};

/// Liveness plus storage readiness
pub async fn healthz(State(state): State<Arc<AppState>>) -> Json<Value> {
    let db = if state.db.is_ready().await {
        "ready"
    } else {
        "unready"
    };
    Json(json!({ "status": "ok", "db": db }))
}

/// API: Distinct countries present in the store
pub async fn api_countries(State(state): State<Arc<AppState>>) -> Json<Vec<String>> {
    Json(state.db.list_countries().await.unwrap_or_default())
}

#[derive(Debug, Deserialize)]
pub struct RecordQuery {
    pub country: Option<String>,
    pub year: Option<i32>,
}

/// API: Raw records, optionally filtered by country and/or year
pub async fn api_records(
    State(state): State<Arc<AppState>>,
    Query(query): Query<RecordQuery>,
) -> Json<Vec<VisitorRecord>> {
    Json(
        state
            .db
            .list_records(query.country.as_deref(), query.year)
            .await
            .unwrap_or_default(),
    )
}

/// Cached yearly summaries - 5 minute TTL
#[cached(time = 300, key = "()", convert = r#"{ () }"#)]
async fn get_cached_yearly(db: Database) -> Vec<YearlyTotal> {
    db.yearly_totals().await.unwrap_or_default()
}

/// Cached monthly summaries - 5 minute TTL
#[cached(time = 300, key = "i32", convert = r#"{ year }"#)]
async fn get_cached_monthly(year: i32, db: Database) -> Vec<MonthlyTotal> {
    db.monthly_totals(year).await.unwrap_or_default()
}

/// Cached covid-impact comparison - 5 minute TTL
#[cached(time = 300, key = "()", convert = r#"{ () }"#)]
async fn get_cached_covid_impact(db: Database) -> Vec<CovidImpact> {
    db.covid_impact().await.unwrap_or_default()
}

/// API: Visitor totals summed by year and country (cached for 5 minutes)
pub async fn api_yearly(State(state): State<Arc<AppState>>) -> Json<Vec<YearlyTotal>> {
    Json(get_cached_yearly(state.db.clone()).await)
}

/// API: Visitor totals by month and country for one year (cached for 5 minutes)
pub async fn api_monthly(
    State(state): State<Arc<AppState>>,
    Path(year): Path<i32>,
) -> Json<Vec<MonthlyTotal>> {
    Json(get_cached_monthly(year, state.db.clone()).await)
}

/// API: Current summary snapshot, or defaults when none is computed yet
pub async fn api_stats(State(state): State<Arc<AppState>>) -> Json<StatsSnapshot> {
    Json(
        state
            .db
            .get_snapshot()
            .await
            .ok()
            .flatten()
            .unwrap_or_default(),
    )
}

/// API: Baseline/trough/recovery comparison per country (cached for 5 minutes)
pub async fn api_covid_impact(State(state): State<Arc<AppState>>) -> Json<Vec<CovidImpact>> {
    Json(get_cached_covid_impact(state.db.clone()).await)
}

/// API: Record count and freshest observation per acquisition source
pub async fn api_data_sources(State(state): State<Arc<AppState>>) -> Json<Vec<SourceStat>> {
    Json(state.db.source_stats().await.unwrap_or_default())
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub success: bool,
    pub updated: u64,
    pub errors: u64,
}

/// API: Run one ingestion cycle now and report the outcome
pub async fn api_refresh(State(state): State<Arc<AppState>>) -> Json<RefreshResponse> {
    let outcome = state.coordinator.run_cycle().await;
    Json(RefreshResponse {
        success: outcome.errors == 0,
        updated: outcome.updated,
        errors: outcome.errors,
    })
}
