//! Pipeline orchestration
//!
//! [`MetricsEngine`] is the public API of the core: two externally callable
//! operations (`aggregate_week`, `update_engagement_status`) plus the manual
//! override write. HTTP handlers, CLIs, and schedulers are collaborators that
//! only ever call these and persist through the store traits.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::debug;

use crate::aggregator::WeeklyAggregator;
use crate::classifier::EngagementClassifier;
use crate::config::EngineConfig;
use crate::error::MetricsError;
use crate::store::{EventStore, MemoryStore, MetricsStore, UserDirectory};
use crate::types::{EngagementStatus, OverrideFlag, WeeklyUserMetrics};
use crate::week::check_week_start;

/// The aggregation-and-classification engine
#[derive(Clone)]
pub struct MetricsEngine {
    events: Arc<dyn EventStore>,
    metrics: Arc<dyn MetricsStore>,
    directory: Arc<dyn UserDirectory>,
    config: EngineConfig,
}

impl MetricsEngine {
    /// Build an engine over the given store handles
    pub fn new(
        events: Arc<dyn EventStore>,
        metrics: Arc<dyn MetricsStore>,
        directory: Arc<dyn UserDirectory>,
        config: EngineConfig,
    ) -> Self {
        Self {
            events,
            metrics,
            directory,
            config,
        }
    }

    /// Engine backed by a single in-memory store, returned alongside it
    pub fn with_memory_store(config: EngineConfig) -> (Self, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let engine = Self::new(store.clone(), store.clone(), store.clone(), config);
        (engine, store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Handle to the user directory this engine reads from
    pub fn directory(&self) -> Arc<dyn UserDirectory> {
        self.directory.clone()
    }

    /// Read one (user, week) row without aggregating
    pub fn metrics_row(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyUserMetrics>, MetricsError> {
        self.metrics.get(user_id, week_start)
    }

    /// Aggregate one (user, week) and persist the row with derived scores
    ///
    /// Idempotent; safe to call on demand from a query path or from the
    /// batch job.
    pub fn aggregate_week(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<WeeklyUserMetrics, MetricsError> {
        WeeklyAggregator::aggregate_week(
            self.events.as_ref(),
            self.metrics.as_ref(),
            self.directory.as_ref(),
            &self.config,
            user_id,
            week_start,
        )
    }

    /// Classify one (user, week) and persist the status onto its row
    ///
    /// Requires a prior `aggregate_week` for the key; fails with
    /// `MetricsNotFound` otherwise.
    pub fn update_engagement_status(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<WeeklyUserMetrics, MetricsError> {
        check_week_start(week_start)?;
        let classification = EngagementClassifier::classify_week(
            self.metrics.as_ref(),
            &self.config.detection,
            user_id,
            week_start,
        )?;
        debug!(
            user_id,
            week = %week_start,
            rule = classification.rule,
            status = %classification.status,
            "classified user-week"
        );
        self.metrics
            .set_status(user_id, week_start, classification.status)?
            .ok_or_else(|| MetricsError::MetricsNotFound {
                user_id: user_id.to_string(),
                week_start,
            })
    }

    /// Record a manual override on an existing row and pin it healthy
    ///
    /// The override survives later classification runs: the classifier's
    /// first rule returns healthy while the flag is present.
    pub fn apply_override(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        reason: &str,
        by: &str,
    ) -> Result<WeeklyUserMetrics, MetricsError> {
        check_week_start(week_start)?;
        let mut row = self.metrics.get(user_id, week_start)?.ok_or_else(|| {
            MetricsError::MetricsNotFound {
                user_id: user_id.to_string(),
                week_start,
            }
        })?;
        row.flags.status_override = Some(OverrideFlag {
            reason: reason.to_string(),
            by: by.to_string(),
            at: Utc::now(),
        });
        row.engagement_status = Some(EngagementStatus::Healthy);
        self.metrics.upsert(row.clone())?;
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ActivityEvent, Role, User};
    use chrono::{Days, TimeZone};
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_user(store: &MemoryStore, id: &str, role: Role) {
        store.add_user(User {
            id: id.to_string(),
            name: id.to_string(),
            email: format!("{id}@example.com"),
            role,
            team_id: None,
            onboarding_date: None,
            is_active: true,
        });
    }

    /// Seed one commit batch per week for consecutive weeks starting at
    /// `first_week`, with the given counts
    fn seed_weeks(store: &MemoryStore, user: &str, first_week: NaiveDate, counts: &[u32]) {
        for (i, count) in counts.iter().enumerate() {
            let week = first_week + Days::new(7 * i as u64);
            let occurred = Utc
                .from_utc_datetime(&week.and_hms_opt(12, 0, 0).unwrap());
            store
                .append(ActivityEvent::commit_batch(user, occurred, *count))
                .unwrap();
        }
    }

    #[test]
    fn test_classify_before_aggregate_fails() {
        let (engine, store) = MetricsEngine::with_memory_store(EngineConfig::default());
        add_user(&store, "u1", Role::Backend);

        let err = engine
            .update_engagement_status("u1", date(2024, 1, 15))
            .unwrap_err();
        assert!(matches!(err, MetricsError::MetricsNotFound { .. }));
    }

    #[test]
    fn test_aggregate_then_classify_roundtrip() {
        let (engine, store) = MetricsEngine::with_memory_store(EngineConfig::default());
        add_user(&store, "u1", Role::Backend);
        seed_weeks(&store, "u1", date(2024, 1, 1), &[5, 5, 5]);

        for i in 0..3u64 {
            let week = date(2024, 1, 1) + Days::new(7 * i);
            engine.aggregate_week("u1", week).unwrap();
            let row = engine.update_engagement_status("u1", week).unwrap();
            assert!(row.engagement_status.is_some());
        }

        // Solo cohort keeps every composite at 50, so nothing ever dips
        // below baseline and the history reads healthy
        let row = store.get("u1", date(2024, 1, 15)).unwrap().unwrap();
        assert_eq!(row.engagement_status, Some(EngagementStatus::Healthy));
        assert_eq!(row.baseline_score, Some(50.0));
    }

    #[test]
    fn test_override_survives_reclassification() {
        let (engine, store) = MetricsEngine::with_memory_store(EngineConfig::default());
        add_user(&store, "u1", Role::Backend);
        let week = date(2024, 1, 15);

        engine.aggregate_week("u1", week).unwrap();
        engine
            .apply_override("u1", week, "parental leave", "mgr1")
            .unwrap();

        let row = engine.update_engagement_status("u1", week).unwrap();
        assert_eq!(row.engagement_status, Some(EngagementStatus::Healthy));
        let flag = row.flags.status_override.unwrap();
        assert_eq!(flag.reason, "parental leave");
        assert_eq!(flag.by, "mgr1");
    }

    #[test]
    fn test_override_requires_existing_row() {
        let (engine, store) = MetricsEngine::with_memory_store(EngineConfig::default());
        add_user(&store, "u1", Role::Backend);

        let err = engine
            .apply_override("u1", date(2024, 1, 15), "pto", "mgr1")
            .unwrap_err();
        assert!(matches!(err, MetricsError::MetricsNotFound { .. }));
    }

    #[test]
    fn test_operations_reject_unaligned_weeks() {
        let (engine, store) = MetricsEngine::with_memory_store(EngineConfig::default());
        add_user(&store, "u1", Role::Backend);
        let tuesday = date(2024, 1, 16);

        assert!(matches!(
            engine.aggregate_week("u1", tuesday).unwrap_err(),
            MetricsError::InvalidInput(_)
        ));
        assert!(matches!(
            engine.update_engagement_status("u1", tuesday).unwrap_err(),
            MetricsError::InvalidInput(_)
        ));
    }

    #[test]
    fn test_peer_cohort_separates_scores() {
        let (engine, store) = MetricsEngine::with_memory_store(EngineConfig::default());
        for id in ["busy", "quiet", "peer1", "peer2"] {
            add_user(&store, id, Role::Backend);
        }
        let week = date(2024, 1, 15);
        seed_weeks(&store, "busy", week, &[40]);
        seed_weeks(&store, "peer1", week, &[10]);
        seed_weeks(&store, "peer2", week, &[12]);

        // First pass materializes rows, second sees the full cohort
        for _ in 0..2 {
            for id in ["busy", "quiet", "peer1", "peer2"] {
                engine.aggregate_week(id, week).unwrap();
            }
        }

        let busy = store.get("busy", week).unwrap().unwrap();
        let quiet = store.get("quiet", week).unwrap().unwrap();
        assert!(busy.composite_score.unwrap() > quiet.composite_score.unwrap());
    }
}
