//! Calendar period helpers for driving multi-period downloads.

use aquiline_core::ledger::TimeRange;
use chrono::{Datelike, NaiveDate, TimeZone, Utc};

fn last_day_of_month(year: i32, month: u32) -> u32 {
    let first_of_next = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    }
    .expect("valid first-of-month date");
    first_of_next.pred_opt().expect("valid previous day").day()
}

/// One `(from, to)` range per month of `year`: first day 00:00:00 to
/// last day 23:59:59, UTC.
pub fn monthly_periods(year: i32) -> Vec<TimeRange> {
    (1..=12)
        .map(|month| {
            let last = last_day_of_month(year, month);
            TimeRange::new(
                Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(year, month, last, 23, 59, 59).unwrap(),
            )
        })
        .collect()
}

/// Four three-month ranges per `year` (T1 = Jan–Mar, … T4 = Oct–Dec).
pub fn trimestrial_periods(year: i32) -> Vec<TimeRange> {
    let months = monthly_periods(year);
    months
        .chunks(3)
        .map(|chunk| TimeRange::new(chunk[0].from, chunk[2].to))
        .collect()
}
