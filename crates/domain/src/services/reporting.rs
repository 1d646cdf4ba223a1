//! Reporting window calculations.

use chrono::{DateTime, Datelike, Duration, TimeZone, Utc};

use crate::models::ReportingWindow;

/// Window covering the calendar month before `now`: first instant of that
/// month through the last second of its final day.
pub fn previous_calendar_month(now: DateTime<Utc>) -> ReportingWindow {
    let (prev_year, prev_month) = if now.month() == 1 {
        (now.year() - 1, 12)
    } else {
        (now.year(), now.month() - 1)
    };

    let start_date = Utc
        .with_ymd_and_hms(prev_year, prev_month, 1, 0, 0, 0)
        .single()
        .expect("first of month is always a valid timestamp");

    let first_of_current = Utc
        .with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .expect("first of month is always a valid timestamp");
    let end_date = first_of_current - Duration::seconds(1);

    ReportingWindow {
        start_date,
        end_date,
    }
}

/// Window for a manual full-history export: from the user's first
/// transaction (or `now` if they have none) through `now`.
pub fn full_history(first_transaction: Option<DateTime<Utc>>, now: DateTime<Utc>) -> ReportingWindow {
    ReportingWindow {
        start_date: first_transaction.unwrap_or(now),
        end_date: now,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_previous_month_mid_year() {
        let now = Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap();
        let window = previous_calendar_month(now);
        assert_eq!(
            window.start_date,
            Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap()
        );
        // 2024 is a leap year
        assert_eq!(
            window.end_date,
            Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_previous_month_in_january_wraps_year() {
        let now = Utc.with_ymd_and_hms(2024, 1, 5, 0, 0, 0).unwrap();
        let window = previous_calendar_month(now);
        assert_eq!(
            window.start_date,
            Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            window.end_date,
            Utc.with_ymd_and_hms(2023, 12, 31, 23, 59, 59).unwrap()
        );
    }

    #[test]
    fn test_full_history_with_first_transaction() {
        let first = Utc.with_ymd_and_hms(2023, 6, 1, 12, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let window = full_history(Some(first), now);
        assert_eq!(window.start_date, first);
        assert_eq!(window.end_date, now);
    }

    #[test]
    fn test_full_history_without_transactions_is_empty_window() {
        let now = Utc::now();
        let window = full_history(None, now);
        assert_eq!(window.start_date, now);
        assert_eq!(window.end_date, now);
    }
}
