//! Date and urgency helpers. Pure functions over calendar dates; "today" is
//! passed in explicitly so every result is deterministic.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use serde::Serialize;

use crate::contracts::models::Contract;

/// Contracts expiring within this many days count as "expiring soon".
pub const EXPIRING_SOON_DAYS: i64 = 90;

const MONTH_ABBREVIATIONS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Expired,
    Critical,
    High,
    Medium,
    Low,
}

/// Today's date in UTC.
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Signed whole days from `today` to `date`. Negative means the date is past.
pub fn days_until(date: NaiveDate, today: NaiveDate) -> i64 {
    (date - today).num_days()
}

/// expired < 0 ≤ critical ≤ 30 < high ≤ 60 < medium ≤ 90 < low
pub fn urgency_level(days: i64) -> Urgency {
    match days {
        d if d < 0 => Urgency::Expired,
        0..=30 => Urgency::Critical,
        31..=60 => Urgency::High,
        61..=90 => Urgency::Medium,
        _ => Urgency::Low,
    }
}

/// Last day to give notice: `end_date - notice_days`. `None` if either input
/// is absent.
pub fn cancellation_deadline(
    end_date: Option<NaiveDate>,
    notice_days: Option<i32>,
) -> Option<NaiveDate> {
    let end_date = end_date?;
    let notice_days = notice_days?;
    end_date.checked_sub_signed(Duration::days(i64::from(notice_days)))
}

pub fn is_past_cancellation_deadline(deadline: Option<NaiveDate>, today: NaiveDate) -> bool {
    deadline.map_or(false, |d| today > d)
}

/// Buckets contracts by the month of their end date. Contracts ending in a
/// different year are left out of every bucket.
pub fn group_by_month(contracts: &[Contract], year: i32) -> [Vec<&Contract>; 12] {
    let mut buckets: [Vec<&Contract>; 12] = std::array::from_fn(|_| Vec::new());
    for contract in contracts {
        if contract.end_date.year() == year {
            buckets[contract.end_date.month0() as usize].push(contract);
        }
    }
    buckets
}

/// `"Jan 2026"` … `"Dec 2026"`.
pub fn month_labels(year: i32) -> [String; 12] {
    std::array::from_fn(|i| format!("{} {year}", MONTH_ABBREVIATIONS[i]))
}

/// Human-readable byte count with up to two decimals: `1536` → `"1.5 KB"`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    let exponent = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let exponent = exponent.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(exponent as i32);
    let rounded = (value * 100.0).round() / 100.0;
    format!("{rounded} {}", UNITS[exponent])
}
