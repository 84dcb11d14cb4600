//! Weekly aggregation
//!
//! Reduces one user's activity events for one calendar week into raw counts,
//! then runs the derivation stages (peer normalization, composite scoring,
//! baseline estimation) and upserts the resulting row. Aggregation is
//! idempotent: re-running over an unchanged event set reproduces the row
//! bit for bit.

use chrono::NaiveDate;

use crate::baseline::BaselineEstimator;
use crate::config::EngineConfig;
use crate::error::MetricsError;
use crate::normalizer::PeerNormalizer;
use crate::scorer::CompositeScorer;
use crate::store::{EventStore, MetricsStore, UserDirectory};
use crate::types::{ActivityEvent, EventKind, EventSource, RawMetrics, WeeklyUserMetrics};
use crate::week::{check_week_start, week_range};

/// Aggregator for weekly per-user metrics
pub struct WeeklyAggregator;

impl WeeklyAggregator {
    /// Reduce a week's events into raw counts
    ///
    /// Only recognized (source, kind) pairs contribute; anything else is
    /// ignored. Missing detail values count as zero so malformed connector
    /// data never aborts an aggregation.
    pub fn reduce(events: &[ActivityEvent]) -> RawMetrics {
        let mut raw = RawMetrics::default();

        for event in events {
            match (event.source, event.kind) {
                (EventSource::Tracker, EventKind::TicketCompleted) => {
                    raw.tickets_completed += 1;
                    raw.story_points += event
                        .ticket
                        .as_ref()
                        .and_then(|t| t.story_points)
                        .unwrap_or(0.0);
                }
                (EventSource::Vcs, EventKind::PrMerged) => raw.prs_authored += 1,
                (EventSource::Vcs, EventKind::PrReviewed) => raw.prs_reviewed += 1,
                (EventSource::Vcs, EventKind::Commits) => {
                    raw.commits += event
                        .commit_batch
                        .as_ref()
                        .and_then(|b| b.count)
                        .unwrap_or(0);
                }
                (EventSource::Docs, EventKind::DocCreated) => raw.docs_authored += 1,
                (EventSource::Calendar, EventKind::Meeting) => {
                    raw.meeting_hours += event
                        .meeting
                        .as_ref()
                        .and_then(|m| m.duration_hours)
                        .unwrap_or(0.0);
                }
                _ => {}
            }
        }

        raw
    }

    /// Aggregate one (user, week): reduce events, derive scores, upsert
    ///
    /// Fails with `UserNotFound` for an unknown user and `InvalidInput` for a
    /// week key that is not Monday-aligned. Flags and any previously written
    /// engagement status survive re-aggregation; raw counts, composite score,
    /// and baseline are recomputed in full every run.
    pub fn aggregate_week(
        events: &dyn EventStore,
        metrics: &dyn MetricsStore,
        directory: &dyn UserDirectory,
        config: &EngineConfig,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<WeeklyUserMetrics, MetricsError> {
        check_week_start(week_start)?;
        let user = directory
            .get_user(user_id)?
            .ok_or_else(|| MetricsError::UserNotFound(user_id.to_string()))?;

        let (start, end) = week_range(week_start);
        let week_events = events.events_for_user_in_window(user_id, start, end)?;
        let raw = Self::reduce(&week_events);

        let normalized =
            PeerNormalizer::normalize(metrics, &raw, user.role, week_start, user_id)?;
        let composite = CompositeScorer::score(&config.weights, &normalized, user.role);
        let baseline = BaselineEstimator::baseline(
            metrics,
            user_id,
            week_start,
            config.baseline_lookback_weeks,
        )?;

        let mut row = metrics
            .get(user_id, week_start)?
            .unwrap_or_else(|| WeeklyUserMetrics::new(user_id, week_start));
        row.raw = raw;
        row.composite_score = Some(composite);
        row.baseline_score = baseline;

        metrics.upsert(row.clone())?;
        Ok(row)
    }
}
