//! Peer cohort normalization
//!
//! Raw weekly counts are turned into signed z-scores against the user's role
//! cohort for the same week: all active users sharing the role, excluding the
//! user being scored. A user with no peer rows has nothing to compare
//! against: every z-score is 0, so their composite lands exactly at the
//! neutral midpoint.

use crate::error::MetricsError;
use crate::store::MetricsStore;
use crate::types::{NormalizedMetrics, RawMetrics, Role, WeeklyUserMetrics};
use chrono::NaiveDate;

/// Floor for cohort standard deviations; keeps division stable when a cohort
/// has zero variance in a metric
pub const STDDEV_FLOOR: f64 = 0.1;

/// Mean and sample standard deviation of one metric across a cohort
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MetricStats {
    pub mean: f64,
    pub stddev: f64,
}

impl MetricStats {
    fn from_values(values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        // Sample stddev needs n > 1; a singleton cohort gets the neutral unit
        let stddev = if values.len() > 1 {
            let variance =
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            variance.sqrt().max(STDDEV_FLOOR)
        } else {
            1.0
        };
        Self { mean, stddev }
    }

    fn z_score(&self, raw: f64) -> f64 {
        (raw - self.mean) / self.stddev
    }
}

/// Per-metric cohort statistics for one (role, week)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohortStats {
    pub tickets: MetricStats,
    pub story_points: MetricStats,
    pub prs_authored: MetricStats,
    pub prs_reviewed: MetricStats,
    pub commits: MetricStats,
    pub docs: MetricStats,
    pub meetings: MetricStats,
}

impl CohortStats {
    /// Compute statistics from a cohort's weekly rows, or `None` when the
    /// cohort is empty
    pub fn from_rows(rows: &[WeeklyUserMetrics]) -> Option<Self> {
        if rows.is_empty() {
            return None;
        }
        let column = |f: fn(&RawMetrics) -> f64| -> Vec<f64> {
            rows.iter().map(|row| f(&row.raw)).collect()
        };
        Some(Self {
            tickets: MetricStats::from_values(&column(|r| f64::from(r.tickets_completed))),
            story_points: MetricStats::from_values(&column(|r| r.story_points)),
            prs_authored: MetricStats::from_values(&column(|r| f64::from(r.prs_authored))),
            prs_reviewed: MetricStats::from_values(&column(|r| f64::from(r.prs_reviewed))),
            commits: MetricStats::from_values(&column(|r| f64::from(r.commits))),
            docs: MetricStats::from_values(&column(|r| f64::from(r.docs_authored))),
            meetings: MetricStats::from_values(&column(|r| r.meeting_hours)),
        })
    }
}

/// Normalizer for converting raw counts to peer-relative z-scores
pub struct PeerNormalizer;

impl PeerNormalizer {
    /// Normalize raw metrics against the role cohort for `week_start`,
    /// excluding `exclude_user_id`
    pub fn normalize(
        store: &dyn MetricsStore,
        raw: &RawMetrics,
        role: Role,
        week_start: NaiveDate,
        exclude_user_id: &str,
    ) -> Result<NormalizedMetrics, MetricsError> {
        let cohort = store.cohort_rows(role, week_start, exclude_user_id)?;
        Ok(match CohortStats::from_rows(&cohort) {
            Some(stats) => Self::normalize_against(raw, &stats),
            // No peers to compare against, so every metric reads average
            None => NormalizedMetrics::default(),
        })
    }

    /// Normalize raw metrics against precomputed cohort statistics
    pub fn normalize_against(raw: &RawMetrics, stats: &CohortStats) -> NormalizedMetrics {
        NormalizedMetrics {
            tickets: stats.tickets.z_score(f64::from(raw.tickets_completed)),
            story_points: stats.story_points.z_score(raw.story_points),
            prs_authored: stats.prs_authored.z_score(f64::from(raw.prs_authored)),
            prs_reviewed: stats.prs_reviewed.z_score(f64::from(raw.prs_reviewed)),
            commits: stats.commits.z_score(f64::from(raw.commits)),
            docs: stats.docs.z_score(f64::from(raw.docs_authored)),
            meetings: stats.meetings.z_score(raw.meeting_hours),
        }
    }
}
