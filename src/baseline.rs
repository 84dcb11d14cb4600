//! Baseline estimation
//!
//! A user's baseline is the arithmetic mean of their composite scores over a
//! trailing window of weeks strictly before the week being scored. Excluding
//! the target week keeps re-aggregation idempotent: a row's new baseline never
//! folds in its own previous composite. No qualifying rows means no baseline
//! (absence, not zero) - callers must treat the two differently.

use chrono::NaiveDate;

use crate::error::MetricsError;
use crate::store::MetricsStore;
use crate::week::{previous_week, weeks_before};

/// Default trailing window in weeks
pub const DEFAULT_BASELINE_WEEKS: u32 = 8;

/// Estimator for trailing historical reference scores
pub struct BaselineEstimator;

impl BaselineEstimator {
    /// Mean composite score over the `lookback_weeks` weeks before
    /// `week_start`, or `None` when no scored rows exist in the window
    pub fn baseline(
        store: &dyn MetricsStore,
        user_id: &str,
        week_start: NaiveDate,
        lookback_weeks: u32,
    ) -> Result<Option<f64>, MetricsError> {
        let from = weeks_before(week_start, lookback_weeks);
        let to = previous_week(week_start);
        let rows = store.rows_in_range(user_id, from, to)?;

        let scores: Vec<f64> = rows.iter().filter_map(|row| row.composite_score).collect();
        if scores.is_empty() {
            return Ok(None);
        }
        Ok(Some(scores.iter().sum::<f64>() / scores.len() as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::types::WeeklyUserMetrics;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_row(store: &MemoryStore, week: NaiveDate, score: Option<f64>) {
        let mut row = WeeklyUserMetrics::new("u1", week);
        row.composite_score = score;
        store.upsert(row).unwrap();
    }

    #[test]
    fn test_no_history_means_no_baseline() {
        let store = MemoryStore::new();
        let baseline =
            BaselineEstimator::baseline(&store, "u1", date(2024, 3, 4), DEFAULT_BASELINE_WEEKS)
                .unwrap();
        assert_eq!(baseline, None);
    }

    #[test]
    fn test_mean_over_scored_rows_only() {
        let store = MemoryStore::new();
        add_row(&store, date(2024, 2, 19), Some(60.0));
        add_row(&store, date(2024, 2, 26), Some(80.0));
        add_row(&store, date(2024, 2, 12), None); // unscored, ignored

        let baseline =
            BaselineEstimator::baseline(&store, "u1", date(2024, 3, 4), DEFAULT_BASELINE_WEEKS)
                .unwrap();
        assert_eq!(baseline, Some(70.0));
    }

    #[test]
    fn test_target_week_excluded() {
        let store = MemoryStore::new();
        let target = date(2024, 3, 4);
        add_row(&store, target, Some(10.0)); // own row from a prior run
        add_row(&store, date(2024, 2, 26), Some(80.0));

        let baseline =
            BaselineEstimator::baseline(&store, "u1", target, DEFAULT_BASELINE_WEEKS).unwrap();
        assert_eq!(baseline, Some(80.0));
    }

    #[test]
    fn test_rows_past_the_window_excluded() {
        let store = MemoryStore::new();
        let target = date(2024, 3, 4);
        // Exactly 8 weeks back is inside the window; 9 weeks back is not
        add_row(&store, weeks_before(target, 8), Some(40.0));
        add_row(&store, weeks_before(target, 9), Some(90.0));

        let baseline = BaselineEstimator::baseline(&store, "u1", target, 8).unwrap();
        assert_eq!(baseline, Some(40.0));
    }
}
