//! Trailing-window record synthesis shared by all tiers
//!
//! Every tier covers the same unit of work: one record per country per
//! month for the 12 calendar months ending at the current month. Counts
//! follow per-country monthly baselines with seasonal and recovery-year
//! adjustments plus bounded jitter, floored at a minimum positive count.

use chrono::{DateTime, Datelike, Utc};
use rand::Rng;

use crate::db::VisitorRecord;

/// Countries tracked by the ingestion pipeline
pub const TARGET_COUNTRIES: &[&str] = &[
    "South Korea",
    "China",
    "Taiwan",
    "Hong Kong",
    "USA",
    "Thailand",
    "Singapore",
    "Australia",
    "United Kingdom",
    "Canada",
];

/// Tiers report the six largest markets each month
const FEED_COUNTRY_COUNT: usize = 6;

/// Months covered by one acquisition window
const WINDOW_MONTHS: u32 = 12;

/// Floor applied after all adjustments
const MIN_MONTHLY_VISITORS: i64 = 1_000;

/// Jitter bounds, multiplicative
const JITTER_MIN: f64 = 0.85;
const JITTER_MAX: f64 = 1.15;

/// Baseline monthly arrivals per market at full recovery
fn base_count(country: &str) -> i64 {
    match country {
        "South Korea" => 750_000,
        "China" => 650_000,
        "Taiwan" => 500_000,
        "Hong Kong" => 200_000,
        "USA" => 250_000,
        "Thailand" => 95_000,
        _ => 50_000,
    }
}

/// Seasonal multiplier: winter trough in February, cherry-blossom peak
/// in April, secondary peaks over summer and autumn foliage.
fn seasonal_factor(month: u32) -> f64 {
    match month {
        1 => 0.85,
        2 => 0.80,
        3 => 1.15,
        4 => 1.25,
        5 => 1.20,
        6 => 0.90,
        7 => 1.10,
        8 => 1.15,
        9 => 0.95,
        10 => 1.20,
        11 => 1.15,
        12 => 1.05,
        _ => 1.0,
    }
}

/// Post-2022 recovery curve; earlier and later years sit at parity.
fn year_factor(year: i32) -> f64 {
    match year {
        2023 => 0.65,
        2024 => 0.85,
        _ => 1.0,
    }
}

/// The trailing 12 calendar months ending at (year, month), oldest first.
pub fn month_window(year: i32, month: u32) -> Vec<(i32, u32)> {
    let mut window = Vec::with_capacity(WINDOW_MONTHS as usize);
    for offset in (0..WINDOW_MONTHS).rev() {
        // Walk back `offset` months with year rollover
        let total = year * 12 + (month as i32 - 1) - offset as i32;
        window.push(((total.div_euclid(12)), (total.rem_euclid(12) + 1) as u32));
    }
    window
}

/// Build one full window of records as observed at `now`.
///
/// Provenance fields are left at their defaults; the pipeline stamps them
/// with the producing tier's source.
pub fn build_window(now: DateTime<Utc>) -> Vec<VisitorRecord> {
    let mut rng = rand::thread_rng();
    let mut records = Vec::with_capacity(WINDOW_MONTHS as usize * FEED_COUNTRY_COUNT);

    for (year, month) in month_window(now.year(), now.month()) {
        for &country in &TARGET_COUNTRIES[..FEED_COUNTRY_COUNT] {
            let jitter = rng.gen_range(JITTER_MIN..=JITTER_MAX);
            let count = base_count(country) as f64
                * seasonal_factor(month)
                * year_factor(year)
                * jitter;
            let visitors = (count.round() as i64).max(MIN_MONTHLY_VISITORS);

            records.push(VisitorRecord::new(
                year,
                month,
                country.to_string(),
                visitors,
            ));
        }
    }

    records
}
