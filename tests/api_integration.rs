//! Integration tests for the ingestion pipeline and the JSON API.
//!
//! Each test runs against its own temp-file SQLite database so writes
//! never leak between cases.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Utc};
use tempfile::TempDir;

use arrivals::acquisition::{AcquisitionPipeline, AcquisitionTier, TierError};
use arrivals::config::IngestionConfig;
use arrivals::db::{DataSource, Database, StatsSnapshot, VisitorRecord};
use arrivals::ingest::{previous_month, IngestionCoordinator};
use arrivals::web::{create_router, AppState};

// =============================================================================
// Test Helpers
// =============================================================================

/// Fresh migrated database backed by a temp file.
async fn setup_db() -> (Database, TempDir) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let path = dir.path().join("test.db");
    let db = Database::connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .expect("Failed to open database");
    db.run_migrations().await.expect("Failed to run migrations");
    (db, dir)
}

fn test_ingestion_config(max_attempts: u32) -> IngestionConfig {
    IngestionConfig {
        interval_hours: 6,
        startup_delay_secs: 0,
        stats_interval_mins: 60,
        stats_max_attempts: max_attempts,
        readiness_wait_secs: 0,
        serialize_cycles: true,
    }
}

/// Tier that returns a fixed batch, for driving cycles deterministically.
struct StaticTier {
    source: DataSource,
    records: Vec<VisitorRecord>,
}

#[async_trait::async_trait]
impl AcquisitionTier for StaticTier {
    fn name(&self) -> &str {
        "static"
    }

    fn source(&self) -> DataSource {
        self.source
    }

    async fn attempt(&self) -> Result<Vec<VisitorRecord>, TierError> {
        Ok(self.records.clone())
    }
}

fn coordinator_with_records(
    db: &Database,
    source: DataSource,
    records: Vec<VisitorRecord>,
) -> IngestionCoordinator {
    let pipeline = AcquisitionPipeline::new(
        vec![Box::new(StaticTier { source, records })],
        Duration::from_secs(5),
    );
    IngestionCoordinator::new(db.clone(), pipeline, &test_ingestion_config(5))
}

fn empty_coordinator(db: &Database, max_attempts: u32) -> IngestionCoordinator {
    let pipeline = AcquisitionPipeline::new(Vec::new(), Duration::from_secs(5));
    IngestionCoordinator::new(db.clone(), pipeline, &test_ingestion_config(max_attempts))
}

fn record(year: i32, month: u32, country: &str, visitors: i64) -> VisitorRecord {
    VisitorRecord::new(year, month, country.to_string(), visitors)
}

// =============================================================================
// Upsert Semantics
// =============================================================================

#[tokio::test]
async fn upsert_is_last_write_wins() {
    let (db, _dir) = setup_db().await;

    db.upsert_record(&record(2018, 3, "Taiwan", 400_000))
        .await
        .unwrap();
    db.upsert_record(
        &record(2018, 3, "Taiwan", 512_000).with_provenance(DataSource::Secondary, true),
    )
    .await
    .unwrap();

    let records = db.list_records(Some("Taiwan"), Some(2018)).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].visitors, 512_000);
    assert_eq!(records[0].source, DataSource::Secondary);
}

#[tokio::test]
async fn yearly_totals_equal_sum_of_monthly_records() {
    let (db, _dir) = setup_db().await;

    let monthly = [410_000, 380_000, 520_000, 610_000];
    for (i, visitors) in monthly.iter().enumerate() {
        db.upsert_record(&record(2017, i as u32 + 1, "Singapore", *visitors))
            .await
            .unwrap();
    }
    db.upsert_record(&record(2017, 1, "Canada", 90_000))
        .await
        .unwrap();

    let yearly = db.yearly_totals().await.unwrap();
    let singapore = yearly
        .iter()
        .find(|t| t.country == "Singapore" && t.year == 2017)
        .unwrap();
    assert_eq!(singapore.visitors, monthly.iter().sum::<i64>());

    let canada = yearly
        .iter()
        .find(|t| t.country == "Canada" && t.year == 2017)
        .unwrap();
    assert_eq!(canada.visitors, 90_000);
}

// =============================================================================
// Stats Recomputation
// =============================================================================

#[tokio::test]
async fn growth_of_a_quarter_reports_25_percent() {
    let (db, _dir) = setup_db().await;
    let now = Utc::now();
    let (year, month) = (now.year(), now.month());
    let (prev_year, prev_month) = previous_month(year, month);

    db.upsert_record(&record(year, month, "South Korea", 600_000))
        .await
        .unwrap();
    db.upsert_record(&record(year, month, "China", 400_000))
        .await
        .unwrap();
    db.upsert_record(&record(prev_year, prev_month, "South Korea", 800_000))
        .await
        .unwrap();

    let coordinator = empty_coordinator(&db, 5);
    assert!(coordinator.recompute_stats(1).await);

    let snapshot = db.get_snapshot().await.unwrap().unwrap();
    assert_eq!(snapshot.total_visitors, 1_000_000);
    assert_eq!(snapshot.monthly_growth_percent, 25.0);
    assert_eq!(snapshot.top_country, "South Korea");
}

#[tokio::test]
async fn empty_previous_month_falls_back_to_one() {
    let (db, _dir) = setup_db().await;
    let now = Utc::now();
    let (year, month) = (now.year(), now.month());

    db.upsert_record(&record(year, month, "Australia", 500))
        .await
        .unwrap();

    let coordinator = empty_coordinator(&db, 5);
    assert!(coordinator.recompute_stats(1).await);

    let snapshot = db.get_snapshot().await.unwrap().unwrap();
    // previous defaults to 1: (500 - 1) / 1 * 100
    assert_eq!(snapshot.monthly_growth_percent, 49_900.0);
}

#[tokio::test]
async fn top_country_ties_resolve_alphabetically() {
    let (db, _dir) = setup_db().await;
    let now = Utc::now();
    let (year, month) = (now.year(), now.month());

    db.upsert_record(&record(year, month, "Thailand", 250_000))
        .await
        .unwrap();
    db.upsert_record(&record(year, month, "Hong Kong", 250_000))
        .await
        .unwrap();

    let top = db.top_country_for_month(year, month).await.unwrap();
    assert_eq!(top.as_deref(), Some("Hong Kong"));
}

#[tokio::test]
async fn exhausted_retries_leave_previous_snapshot_untouched() {
    let (db, _dir) = setup_db().await;
    let now = Utc::now();

    db.upsert_snapshot(2_500_000, 4.2, "China", now).await.unwrap();
    let before: StatsSnapshot = db.get_snapshot().await.unwrap().unwrap();

    let coordinator = empty_coordinator(&db, 2);
    db.close().await;

    assert!(!coordinator.recompute_stats(2).await);

    // Reopen the same file and verify nothing changed
    let path = _dir.path().join("test.db");
    let reopened = Database::connect(&format!("sqlite:{}?mode=rwc", path.display()))
        .await
        .unwrap();
    let after = reopened.get_snapshot().await.unwrap().unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn unready_storage_skips_the_cycle() {
    let (db, _dir) = setup_db().await;
    let coordinator = coordinator_with_records(
        &db,
        DataSource::Primary,
        vec![record(2025, 1, "USA", 100_000)],
    );
    db.close().await;

    let outcome = coordinator.run_cycle().await;
    assert_eq!(outcome.updated, 0);
    assert_eq!(outcome.errors, 0);
}

// =============================================================================
// Cycle Provenance
// =============================================================================

#[tokio::test]
async fn primary_cycle_never_stores_fallback_provenance() {
    let (db, _dir) = setup_db().await;
    let now = Utc::now();
    let (year, month) = (now.year(), now.month());

    let batch = vec![
        record(year, month, "South Korea", 740_000),
        record(year, month, "China", 655_000),
        record(year, month, "Taiwan", 495_000),
    ];
    let coordinator = coordinator_with_records(&db, DataSource::Primary, batch);

    let outcome = coordinator.run_cycle().await;
    assert_eq!(outcome.updated, 3);
    assert_eq!(outcome.errors, 0);

    let sources = db.sources_for_month(year, month).await.unwrap();
    assert_eq!(sources, vec!["primary".to_string()]);

    for r in db.list_records(None, Some(year)).await.unwrap() {
        assert_eq!(r.source, DataSource::Primary);
        assert!(r.official);
    }

    // The cycle also stamped the ingest time on the snapshot
    let snapshot = db.get_snapshot().await.unwrap().unwrap();
    assert!(snapshot.last_ingest_update.is_some());
}

// =============================================================================
// Covid Impact
// =============================================================================

#[tokio::test]
async fn covid_impact_reports_decline_and_recovery() {
    let (db, _dir) = setup_db().await;

    // 2019 baseline: 8 x 698,000 = 5,584,000
    for month in 1..=8 {
        db.upsert_record(&record(2019, month, "South Korea", 698_000))
            .await
            .unwrap();
    }
    // Trough years
    db.upsert_record(&record(2020, 1, "South Korea", 100_000))
        .await
        .unwrap();
    db.upsert_record(&record(2020, 2, "South Korea", 70_000))
        .await
        .unwrap();
    db.upsert_record(&record(2021, 6, "South Korea", 150_000))
        .await
        .unwrap();
    // Recovery: 8 x 600,000 = 4,800,000
    for month in 1..=8 {
        db.upsert_record(&record(2025, month, "South Korea", 600_000))
            .await
            .unwrap();
    }
    // No 2019 baseline for Taiwan, must be omitted
    db.upsert_record(&record(2025, 1, "Taiwan", 500_000))
        .await
        .unwrap();

    let impacts = db.covid_impact().await.unwrap();
    assert_eq!(impacts.len(), 1);

    let korea = &impacts[0];
    assert_eq!(korea.country, "South Korea");
    assert_eq!(korea.pre_covid_baseline, 5_584_000);
    // min(2020: 170,000, 2021: 150,000)
    assert_eq!(korea.trough_visitors, 150_000);
    assert_eq!(korea.recovery_visitors, 4_800_000);
    assert!(korea.decline_percent > 90.0);
    assert_eq!(korea.decline_percent, 97.3);
    // 4,800,000 / 5,584,000 * 100 rounded to one decimal
    assert_eq!(korea.recovery_percent, 86.0);
}

// =============================================================================
// HTTP API
// =============================================================================

/// Boot the real router on a random port.
async fn start_test_server(db: Database, coordinator: IngestionCoordinator) -> String {
    let state = Arc::new(AppState {
        db,
        coordinator: Arc::new(coordinator),
    });
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind random port");
    let addr = listener.local_addr().expect("Failed to get local addr");

    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });

    // Give server time to start
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://{}", addr)
}

#[tokio::test]
async fn http_api_serves_the_read_surface() {
    let (db, _dir) = setup_db().await;
    let now = Utc::now();
    let (year, month) = (now.year(), now.month());

    let batch = vec![
        record(year, month, "South Korea", 750_000),
        record(year, month, "Thailand", 95_000),
    ];
    let coordinator = coordinator_with_records(&db, DataSource::Primary, batch);
    let base_url = start_test_server(db, coordinator).await;
    let client = reqwest::Client::new();

    // Health probe is alive and sees a ready database
    let body: serde_json::Value = client
        .get(format!("{}/healthz", base_url))
        .send()
        .await
        .expect("healthz request failed")
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["db"], "ready");

    // No data yet: stats fall back to defaults
    let stats: serde_json::Value = client
        .get(format!("{}/api/stats", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["totalVisitors"], 0);
    assert_eq!(stats["topCountry"], "N/A");

    // Manual refresh runs a full cycle synchronously
    let refresh: serde_json::Value = client
        .post(format!("{}/api/refresh", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(refresh["success"], true);
    assert_eq!(refresh["updated"], 2);
    assert_eq!(refresh["errors"], 0);

    // Countries reflect the ingested batch
    let countries: Vec<String> = client
        .get(format!("{}/api/countries", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(countries, vec!["South Korea", "Thailand"]);

    // Stats now reflect the cycle
    let stats: serde_json::Value = client
        .get(format!("{}/api/stats", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(stats["totalVisitors"], 845_000);
    assert_eq!(stats["topCountry"], "South Korea");

    // Raw records with a country filter
    let records: Vec<serde_json::Value> = client
        .get(format!("{}/api/tourism-data?country=Thailand", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0]["visitors"], 95_000);
    assert_eq!(records[0]["source"], "primary");

    // Aggregates
    let yearly: Vec<serde_json::Value> = client
        .get(format!("{}/api/tourism-data/yearly", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(yearly.len(), 2);

    let monthly: Vec<serde_json::Value> = client
        .get(format!("{}/api/tourism-data/monthly/{}", base_url, year))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(monthly.iter().any(|m| m["country"] == "South Korea"
        && m["month"] == month
        && m["visitors"] == 750_000));

    // Data sources report the winning tier only
    let sources: Vec<serde_json::Value> = client
        .get(format!("{}/api/data-sources", base_url))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sources.len(), 1);
    assert_eq!(sources[0]["source"], "primary");
    assert_eq!(sources[0]["records"], 2);
}
