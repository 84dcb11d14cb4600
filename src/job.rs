//! Batch aggregation job
//!
//! Drives the whole pipeline on a periodic interval: aggregate and classify
//! the current week for every active user, then backfill recent weeks that
//! have no row yet. Users share no mutable state, so per-user work fans out
//! on a bounded rayon pool; the metrics store serializes same-key writes. A
//! failure for one user is logged and counted, never aborting the batch. The
//! shutdown flag is only consulted between users, so an in-flight user-week
//! always finishes rather than leaving a half-updated row.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::NaiveDate;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::MetricsError;
use crate::pipeline::MetricsEngine;
use crate::week::{current_week_start, weeks_before};

/// Counters for one batch run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunStats {
    /// Users whose current week was aggregated and classified
    pub users_processed: usize,
    /// Missing (user, week) rows filled in by the backfill pass
    pub backfilled: usize,
    /// Per-user failures (logged, batch continued)
    pub errors: usize,
    /// Users skipped because shutdown was requested mid-batch
    pub skipped: usize,
}

enum Outcome {
    Done,
    Failed,
    Skipped,
}

/// Periodic batch job over all active users
pub struct AggregationJob {
    engine: MetricsEngine,
}

impl AggregationJob {
    pub fn new(engine: MetricsEngine) -> Self {
        Self { engine }
    }

    /// Run one full batch: current week for everyone, then backfill
    pub fn run_once(&self, shutdown: &AtomicBool) -> Result<RunStats, MetricsError> {
        let week = current_week_start();
        self.run_for_week(week, shutdown)
    }

    /// Run one full batch anchored at an explicit current week
    ///
    /// Split out from [`Self::run_once`] so tests can pin the week.
    pub fn run_for_week(
        &self,
        week: NaiveDate,
        shutdown: &AtomicBool,
    ) -> Result<RunStats, MetricsError> {
        let users = self.engine.directory().active_users()?;
        info!(week = %week, users = users.len(), "starting aggregation batch");

        let mut stats = RunStats::default();
        let outcomes: Vec<Outcome> = users
            .par_iter()
            .map(|user| {
                if shutdown.load(Ordering::Relaxed) {
                    return Outcome::Skipped;
                }
                self.process_user_week(&user.id, week)
            })
            .collect();
        for outcome in outcomes {
            match outcome {
                Outcome::Done => stats.users_processed += 1,
                Outcome::Failed => stats.errors += 1,
                Outcome::Skipped => stats.skipped += 1,
            }
        }

        stats.backfilled = self.backfill(week, &users, shutdown, &mut stats.errors)?;

        info!(
            week = %week,
            users_processed = stats.users_processed,
            backfilled = stats.backfilled,
            errors = stats.errors,
            skipped = stats.skipped,
            "aggregation batch finished"
        );
        Ok(stats)
    }

    /// Aggregate then classify one (user, week); failures are logged here
    fn process_user_week(&self, user_id: &str, week: NaiveDate) -> Outcome {
        let result = self
            .engine
            .aggregate_week(user_id, week)
            .and_then(|_| self.engine.update_engagement_status(user_id, week));
        match result {
            Ok(_) => Outcome::Done,
            Err(error) => {
                warn!(user_id, week = %week, %error, "user-week aggregation failed");
                Outcome::Failed
            }
        }
    }

    /// Fill in rows for recent weeks that were never aggregated
    fn backfill(
        &self,
        current_week: NaiveDate,
        users: &[crate::types::User],
        shutdown: &AtomicBool,
        errors: &mut usize,
    ) -> Result<usize, MetricsError> {
        let backfill_weeks = self.engine.config().backfill_weeks;
        let mut backfilled = 0;
        for weeks_ago in 1..=backfill_weeks {
            let week = weeks_before(current_week, weeks_ago);
            let outcomes: Vec<Option<Outcome>> = users
                .par_iter()
                .map(|user| {
                    if shutdown.load(Ordering::Relaxed) {
                        return None;
                    }
                    match self.engine.metrics_row(&user.id, week) {
                        Ok(Some(_)) => None,
                        Ok(None) => Some(self.process_user_week(&user.id, week)),
                        Err(error) => {
                            warn!(user_id = %user.id, week = %week, %error, "backfill lookup failed");
                            Some(Outcome::Failed)
                        }
                    }
                })
                .collect();
            for outcome in outcomes.into_iter().flatten() {
                match outcome {
                    Outcome::Done => backfilled += 1,
                    Outcome::Failed => *errors += 1,
                    Outcome::Skipped => {}
                }
            }
        }
        Ok(backfilled)
    }

    /// Run batches forever at the configured interval, starting immediately
    ///
    /// Returns once `shutdown` is set; the batch in progress completes its
    /// in-flight user-weeks first.
    pub fn run_scheduler(&self, shutdown: &AtomicBool) {
        let interval =
            Duration::from_secs(self.engine.config().aggregation_interval_hours * 3600);
        info!(interval_hours = self.engine.config().aggregation_interval_hours, "scheduler started");

        while !shutdown.load(Ordering::Relaxed) {
            if let Err(error) = self.run_once(shutdown) {
                warn!(%error, "aggregation batch failed");
            }
            // Sleep in short slices so shutdown is honored promptly
            let mut slept = Duration::ZERO;
            while slept < interval && !shutdown.load(Ordering::Relaxed) {
                let slice = Duration::from_secs(1).min(interval - slept);
                std::thread::sleep(slice);
                slept += slice;
            }
        }
        info!("scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::{EventStore, MemoryStore, MetricsStore};
    use crate::types::{ActivityEvent, Role, User};
    use chrono::{Days, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn add_user(store: &MemoryStore, id: &str, active: bool) {
        store.add_user(User {
            id: id.to_string(),
            name: id.to_string(),
            email: format!("{id}@example.com"),
            role: Role::Backend,
            team_id: None,
            onboarding_date: None,
            is_active: active,
        });
    }

    fn make_job(user_count: usize) -> (AggregationJob, std::sync::Arc<MemoryStore>) {
        let (engine, store) = MetricsEngine::with_memory_store(EngineConfig::default());
        for i in 0..user_count {
            add_user(&store, &format!("u{i}"), true);
        }
        (AggregationJob::new(engine), store)
    }

    #[test]
    fn test_batch_processes_all_active_users() {
        let (job, store) = make_job(5);
        add_user(&store, "inactive", false);
        let week = date(2024, 1, 15);

        let stats = job.run_for_week(week, &AtomicBool::new(false)).unwrap();

        assert_eq!(stats.users_processed, 5);
        assert_eq!(stats.errors, 0);
        for i in 0..5 {
            let row = store.get(&format!("u{i}"), week).unwrap().unwrap();
            assert!(row.engagement_status.is_some());
        }
        assert!(store.get("inactive", week).unwrap().is_none());
    }

    #[test]
    fn test_backfill_fills_missing_weeks_only() {
        let (job, store) = make_job(2);
        let week = date(2024, 2, 12);

        // u0 already has a row one week back; it must not be touched
        let prior = weeks_before(week, 1);
        let mut existing = crate::types::WeeklyUserMetrics::new("u0", prior);
        existing.composite_score = Some(99.0);
        store.upsert(existing).unwrap();

        let stats = job.run_for_week(week, &AtomicBool::new(false)).unwrap();

        // 4 backfill weeks x 2 users, minus the pre-existing row
        assert_eq!(stats.backfilled, 7);
        let row = store.get("u0", prior).unwrap().unwrap();
        assert_eq!(row.composite_score, Some(99.0));
        assert!(store.get("u1", weeks_before(week, 4)).unwrap().is_some());
        assert!(store.get("u1", weeks_before(week, 5)).unwrap().is_none());
    }

    #[test]
    fn test_shutdown_skips_remaining_users() {
        let (job, _store) = make_job(4);
        let shutdown = AtomicBool::new(true);

        let stats = job.run_for_week(date(2024, 1, 15), &shutdown).unwrap();
        assert_eq!(stats.users_processed, 0);
        assert_eq!(stats.skipped, 4);
        assert_eq!(stats.backfilled, 0);
    }

    #[test]
    fn test_batch_runs_build_usable_history() {
        // A user far below cohort peers ends up flagged after enough weeks
        let (engine, store) = MetricsEngine::with_memory_store(EngineConfig::default());
        for id in ["quiet", "p1", "p2", "p3"] {
            add_user(&store, id, true);
        }
        let job = AggregationJob::new(engine);
        let first_week = date(2024, 1, 1);

        for i in 0..12u64 {
            let week = first_week + Days::new(7 * i);
            for peer in ["p1", "p2", "p3"] {
                let occurred = Utc.from_utc_datetime(&week.and_hms_opt(10, 0, 0).unwrap());
                // Peers stay busy; "quiet" produces nothing after week 7
                store
                    .append(ActivityEvent::commit_batch(peer, occurred, 20))
                    .unwrap();
                store.append(ActivityEvent::pr_merged(peer, occurred)).unwrap();
                store.append(ActivityEvent::pr_reviewed(peer, occurred)).unwrap();
            }
            if i < 8 {
                let occurred = Utc.from_utc_datetime(&week.and_hms_opt(11, 0, 0).unwrap());
                store
                    .append(ActivityEvent::commit_batch("quiet", occurred, 18))
                    .unwrap();
                store.append(ActivityEvent::pr_reviewed("quiet", occurred)).unwrap();
            }
            job.run_for_week(week, &AtomicBool::new(false)).unwrap();
        }

        let last = store.get("quiet", first_week + Days::new(77)).unwrap().unwrap();
        // Having gone idle against an active cohort, the quiet user is no
        // longer healthy by the final week
        assert_ne!(
            last.engagement_status,
            Some(crate::types::EngagementStatus::Healthy)
        );
    }
}
