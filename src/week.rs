//! Week bucket utilities
//!
//! All weekly metrics are keyed by a Monday-aligned `NaiveDate`. Helpers here
//! align arbitrary dates to their week bucket and produce the closed timestamp
//! range covering one week.

use chrono::{DateTime, Datelike, Days, NaiveDate, TimeZone, Utc};

use crate::error::MetricsError;

/// Align a date to the Monday starting its ISO week
pub fn week_start_of(date: NaiveDate) -> NaiveDate {
    let days_since_monday = date.weekday().num_days_from_monday() as u64;
    date - Days::new(days_since_monday)
}

/// Closed timestamp range `[Mon 00:00:00, Sun 23:59:59]` for one week bucket
pub fn week_range(week_start: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let end_date = week_start + Days::new(6);
    let start = Utc.from_utc_datetime(
        &week_start
            .and_hms_opt(0, 0, 0)
            .unwrap_or_else(|| week_start.and_time(chrono::NaiveTime::MIN)),
    );
    let end = Utc.from_utc_datetime(
        &end_date
            .and_hms_opt(23, 59, 59)
            .unwrap_or_else(|| end_date.and_time(chrono::NaiveTime::MIN)),
    );
    (start, end)
}

/// Week bucket N weeks before the given one
pub fn weeks_before(week_start: NaiveDate, weeks: u32) -> NaiveDate {
    week_start - Days::new(u64::from(weeks) * 7)
}

/// The week bucket immediately preceding the given one
pub fn previous_week(week_start: NaiveDate) -> NaiveDate {
    weeks_before(week_start, 1)
}

/// The Monday-aligned bucket containing the current UTC date
pub fn current_week_start() -> NaiveDate {
    week_start_of(Utc::now().date_naive())
}

/// Validate that a week key is Monday-aligned
pub fn check_week_start(week_start: NaiveDate) -> Result<(), MetricsError> {
    if week_start.weekday() != chrono::Weekday::Mon {
        return Err(MetricsError::InvalidInput(format!(
            "week_start {week_start} is not Monday-aligned"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_start_alignment() {
        // 2024-01-15 is a Monday
        assert_eq!(week_start_of(date(2024, 1, 15)), date(2024, 1, 15));
        assert_eq!(week_start_of(date(2024, 1, 17)), date(2024, 1, 15));
        assert_eq!(week_start_of(date(2024, 1, 21)), date(2024, 1, 15));
        // Sunday belongs to the preceding Monday's week
        assert_eq!(week_start_of(date(2024, 1, 14)), date(2024, 1, 8));
    }

    #[test]
    fn test_week_range_is_closed() {
        let (start, end) = week_range(date(2024, 1, 15));
        assert_eq!(start.to_rfc3339(), "2024-01-15T00:00:00+00:00");
        assert_eq!(end.to_rfc3339(), "2024-01-21T23:59:59+00:00");
    }

    #[test]
    fn test_weeks_before() {
        assert_eq!(weeks_before(date(2024, 1, 15), 2), date(2024, 1, 1));
        assert_eq!(previous_week(date(2024, 1, 15)), date(2024, 1, 8));
    }

    #[test]
    fn test_week_start_validation() {
        assert!(check_week_start(date(2024, 1, 15)).is_ok());
        assert!(check_week_start(date(2024, 1, 16)).is_err());
    }
}
