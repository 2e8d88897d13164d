//! Database module

mod schema;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};

use crate::config::DatabaseConfig;

/// Baseline year for covid-impact comparisons
pub const BASELINE_YEAR: i32 = 2019;

/// Window of trough years (the lowest yearly total of these is the "covid low")
pub const TROUGH_YEARS: [i32; 2] = [2020, 2021];

/// Recovery year compared against the baseline
pub const RECOVERY_YEAR: i32 = 2025;

/// Provenance of a visitor record, by acquisition tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Primary,
    Secondary,
    External,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
            Self::External => "external",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "primary" => Some(Self::Primary),
            "secondary" => Some(Self::Secondary),
            "external" => Some(Self::External),
            _ => None,
        }
    }
}

/// One monthly visitor-arrival observation for a country
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisitorRecord {
    pub year: i32,
    pub month: u32,
    pub country: String,
    pub visitors: i64,
    pub source: DataSource,
    pub official: bool,
    pub observed_at: DateTime<Utc>,
}

impl VisitorRecord {
    pub fn new(year: i32, month: u32, country: String, visitors: i64) -> Self {
        Self {
            year,
            month,
            country,
            visitors,
            source: DataSource::External,
            official: false,
            observed_at: Utc::now(),
        }
    }

    pub fn with_provenance(mut self, source: DataSource, official: bool) -> Self {
        self.source = source;
        self.official = official;
        self
    }
}

/// The single current summary snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    #[serde(rename = "totalVisitors")]
    pub total_visitors: i64,
    #[serde(rename = "monthlyGrowth")]
    pub monthly_growth_percent: f64,
    #[serde(rename = "topCountry")]
    pub top_country: String,
    #[serde(rename = "lastUpdated")]
    pub last_stats_update: DateTime<Utc>,
    #[serde(rename = "lastIngest")]
    pub last_ingest_update: Option<DateTime<Utc>>,
}

impl Default for StatsSnapshot {
    fn default() -> Self {
        Self {
            total_visitors: 0,
            monthly_growth_percent: 0.0,
            top_country: "N/A".to_string(),
            last_stats_update: DateTime::<Utc>::MIN_UTC,
            last_ingest_update: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct YearlyTotal {
    pub year: i32,
    pub country: String,
    pub visitors: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct MonthlyTotal {
    pub month: u32,
    pub country: String,
    pub visitors: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CovidImpact {
    pub country: String,
    #[serde(rename = "preCovid2019")]
    pub pre_covid_baseline: i64,
    #[serde(rename = "covidLow")]
    pub trough_visitors: i64,
    #[serde(rename = "recovery2025")]
    pub recovery_visitors: i64,
    #[serde(rename = "declinePercent")]
    pub decline_percent: f64,
    #[serde(rename = "recoveryPercent")]
    pub recovery_percent: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SourceStat {
    pub source: DataSource,
    pub records: i64,
    #[serde(rename = "latestObservedAt")]
    pub latest_observed_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        // Create the parent directory if it doesn't exist, SQLite only
        // creates the file itself
        if let Some(parent) = std::path::Path::new(&config.url).parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        Self::connect(&format!("sqlite:{}?mode=rwc", config.url)).await
    }

    /// Connect to an explicit sqlx database URL
    pub async fn connect(url: &str) -> Result<Self> {
        // A single writer plus a handful of readers is plenty; SQLite
        // serializes writes anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect(url)
            .await?;
        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<()> {
        // Enable WAL mode for better concurrency
        sqlx::query("PRAGMA journal_mode=WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous=NORMAL")
            .execute(&self.pool)
            .await?;

        sqlx::query(schema::CREATE_RECORDS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_STATS_TABLE)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_YEAR_MONTH)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_YEAR_COUNTRY)
            .execute(&self.pool)
            .await?;
        sqlx::query(schema::CREATE_INDEX_COUNTRY)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Cheap readiness ping used by the ingestion gate and health probe
    pub async fn is_ready(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }

    /// Close the connection pool. Every operation afterwards fails, which
    /// is how shutdown and the readiness gate interact.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Insert or replace the record for its (year, month, country) key.
    /// A re-ingestion of the same key overwrites visitors and provenance.
    pub async fn upsert_record(&self, record: &VisitorRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO visitor_records (year, month, country, visitors, source, official, observed_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(year, month, country) DO UPDATE SET
                visitors = excluded.visitors,
                source = excluded.source,
                official = excluded.official,
                observed_at = excluded.observed_at
            "#,
        )
        .bind(record.year)
        .bind(record.month as i32)
        .bind(&record.country)
        .bind(record.visitors)
        .bind(record.source.as_str())
        .bind(record.official)
        .bind(record.observed_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Total visitors across all countries for one (year, month)
    pub async fn sum_for_month(&self, year: i32, month: u32) -> Result<i64> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COALESCE(SUM(visitors), 0) FROM visitor_records WHERE year = ? AND month = ?",
        )
        .bind(year)
        .bind(month as i32)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.0)
    }

    /// Country with the highest total for one (year, month).
    /// Equal totals resolve alphabetically.
    pub async fn top_country_for_month(&self, year: i32, month: u32) -> Result<Option<String>> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            SELECT country FROM visitor_records
            WHERE year = ? AND month = ?
            GROUP BY country
            ORDER BY SUM(visitors) DESC, country ASC
            LIMIT 1
            "#,
        )
        .bind(year)
        .bind(month as i32)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|(c,)| c))
    }

    /// Distinct sources present in a (year, month), for provenance checks
    pub async fn sources_for_month(&self, year: i32, month: u32) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT source FROM visitor_records WHERE year = ? AND month = ?",
        )
        .bind(year)
        .bind(month as i32)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(s,)| s).collect())
    }

    pub async fn list_countries(&self) -> Result<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT DISTINCT country FROM visitor_records ORDER BY country")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Raw records, optionally filtered by country and/or year
    pub async fn list_records(
        &self,
        country: Option<&str>,
        year: Option<i32>,
    ) -> Result<Vec<VisitorRecord>> {
        let rows: Vec<(i64, i64, String, i64, String, bool, i64)> = sqlx::query_as(
            r#"
            SELECT year, month, country, visitors, source, official, observed_at
            FROM visitor_records
            WHERE (?1 IS NULL OR country = ?1)
              AND (?2 IS NULL OR year = ?2)
            ORDER BY year DESC, month DESC, country ASC
            "#,
        )
        .bind(country)
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(year, month, country, visitors, source, official, observed_at)| VisitorRecord {
                    year: year as i32,
                    month: month as u32,
                    country,
                    visitors,
                    source: DataSource::parse(&source).unwrap_or(DataSource::External),
                    official,
                    observed_at: DateTime::from_timestamp_millis(observed_at)
                        .unwrap_or_else(Utc::now),
                },
            )
            .collect())
    }

    /// Visitor totals summed by year and country
    pub async fn yearly_totals(&self) -> Result<Vec<YearlyTotal>> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            r#"
            SELECT year, country, SUM(visitors) as total
            FROM visitor_records
            GROUP BY year, country
            ORDER BY year ASC, country ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(year, country, visitors)| YearlyTotal {
                year: year as i32,
                country,
                visitors,
            })
            .collect())
    }

    /// Visitor totals summed by month and country within one year
    pub async fn monthly_totals(&self, year: i32) -> Result<Vec<MonthlyTotal>> {
        let rows: Vec<(i64, String, i64)> = sqlx::query_as(
            r#"
            SELECT month, country, SUM(visitors) as total
            FROM visitor_records
            WHERE year = ?
            GROUP BY month, country
            ORDER BY month ASC, country ASC
            "#,
        )
        .bind(year)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(month, country, visitors)| MonthlyTotal {
                month: month as u32,
                country,
                visitors,
            })
            .collect())
    }

    /// Per-country comparison of the 2019 baseline against the 2020/2021
    /// trough and the 2025 recovery year. Countries without baseline data
    /// are omitted.
    pub async fn covid_impact(&self) -> Result<Vec<CovidImpact>> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(
            r#"
            SELECT country, year, SUM(visitors) as total
            FROM visitor_records
            WHERE year IN (?, ?, ?, ?)
            GROUP BY country, year
            ORDER BY country ASC
            "#,
        )
        .bind(BASELINE_YEAR)
        .bind(TROUGH_YEARS[0])
        .bind(TROUGH_YEARS[1])
        .bind(RECOVERY_YEAR)
        .fetch_all(&self.pool)
        .await?;

        let mut by_country: std::collections::BTreeMap<String, Vec<(i32, i64)>> =
            std::collections::BTreeMap::new();
        for (country, year, total) in rows {
            by_country
                .entry(country)
                .or_default()
                .push((year as i32, total));
        }

        let mut impacts = Vec::new();
        for (country, totals) in by_country {
            let year_total = |y: i32| totals.iter().find(|(year, _)| *year == y).map(|(_, t)| *t);

            let Some(baseline) = year_total(BASELINE_YEAR).filter(|b| *b > 0) else {
                continue;
            };
            let trough = TROUGH_YEARS
                .iter()
                .filter_map(|y| year_total(*y))
                .min()
                .unwrap_or(0);
            let recovery = year_total(RECOVERY_YEAR).unwrap_or(0);

            impacts.push(CovidImpact {
                country,
                pre_covid_baseline: baseline,
                trough_visitors: trough,
                recovery_visitors: recovery,
                decline_percent: round1((baseline - trough) as f64 / baseline as f64 * 100.0),
                recovery_percent: round1(recovery as f64 / baseline as f64 * 100.0),
            });
        }

        Ok(impacts)
    }

    /// Record count and freshest observation timestamp per source
    pub async fn source_stats(&self) -> Result<Vec<SourceStat>> {
        let rows: Vec<(String, i64, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT source, COUNT(*) as records, MAX(observed_at) as latest
            FROM visitor_records
            GROUP BY source
            ORDER BY records DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(source, records, latest)| {
                Some(SourceStat {
                    source: DataSource::parse(&source)?,
                    records,
                    latest_observed_at: latest.and_then(DateTime::from_timestamp_millis),
                })
            })
            .collect())
    }

    pub async fn get_snapshot(&self) -> Result<Option<StatsSnapshot>> {
        let row: Option<(i64, f64, String, i64, Option<i64>)> = sqlx::query_as(
            r#"
            SELECT total_visitors, monthly_growth_percent, top_country,
                   last_stats_update, last_ingest_update
            FROM stats_snapshot WHERE id = 1
            "#,
        )
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(
            |(total_visitors, monthly_growth_percent, top_country, stats_at, ingest_at)| {
                StatsSnapshot {
                    total_visitors,
                    monthly_growth_percent,
                    top_country,
                    last_stats_update: DateTime::from_timestamp_millis(stats_at)
                        .unwrap_or(DateTime::<Utc>::MIN_UTC),
                    last_ingest_update: ingest_at.and_then(DateTime::from_timestamp_millis),
                }
            },
        ))
    }

    /// Overwrite the single snapshot row with freshly derived stats.
    /// The ingest timestamp is carried over, not cleared.
    pub async fn upsert_snapshot(
        &self,
        total_visitors: i64,
        monthly_growth_percent: f64,
        top_country: &str,
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stats_snapshot (id, total_visitors, monthly_growth_percent, top_country, last_stats_update)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                total_visitors = excluded.total_visitors,
                monthly_growth_percent = excluded.monthly_growth_percent,
                top_country = excluded.top_country,
                last_stats_update = excluded.last_stats_update
            "#,
        )
        .bind(total_visitors)
        .bind(monthly_growth_percent)
        .bind(top_country)
        .bind(updated_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Stamp the last ingest time on the existing snapshot.
    /// No-op when no snapshot has been computed yet, so a failed first
    /// recomputation never leaves a placeholder row behind.
    pub async fn mark_ingest(&self, ingested_at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE stats_snapshot SET last_ingest_update = ? WHERE id = 1")
            .bind(ingested_at.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
