//! Database schema definitions

pub const CREATE_RECORDS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS visitor_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    year INTEGER NOT NULL,
    month INTEGER NOT NULL,
    country TEXT NOT NULL,
    visitors BIGINT NOT NULL,
    source TEXT NOT NULL,
    official INTEGER NOT NULL DEFAULT 1,
    observed_at BIGINT NOT NULL,
    UNIQUE(year, month, country)
)
"#;

// Single current snapshot, overwritten in place on every recomputation
pub const CREATE_STATS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS stats_snapshot (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    total_visitors BIGINT NOT NULL,
    monthly_growth_percent REAL NOT NULL,
    top_country TEXT NOT NULL,
    last_stats_update BIGINT NOT NULL,
    last_ingest_update BIGINT
)
"#;

// For current/previous month aggregation
pub const CREATE_INDEX_YEAR_MONTH: &str =
    "CREATE INDEX IF NOT EXISTS idx_records_year_month ON visitor_records(year, month)";

// For yearly summaries and covid-impact queries
pub const CREATE_INDEX_YEAR_COUNTRY: &str =
    "CREATE INDEX IF NOT EXISTS idx_records_year_country ON visitor_records(year, country)";

// For per-country record listings
pub const CREATE_INDEX_COUNTRY: &str =
    "CREATE INDEX IF NOT EXISTS idx_records_country ON visitor_records(country)";
