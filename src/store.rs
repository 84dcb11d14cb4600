//! Store contracts and the in-memory store
//!
//! The engine reads events and directory attributes and reads/writes weekly
//! metrics rows exclusively through the traits here. Persistence mechanics
//! belong to collaborators; [`MemoryStore`] is the bundled implementation used
//! by the CLI and tests. Writes to the same (user, week) key are serialized by
//! a single row-map mutex, which is what makes the upsert safe under the batch
//! job's parallel fan-out.

use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::error::MetricsError;
use crate::types::{
    ActivityEvent, CommitBatch, EngagementStatus, EventKind, EventSource, Role, User,
    WeeklyUserMetrics,
};

/// Read access to the append-only activity event log
pub trait EventStore: Send + Sync {
    /// All events for a user with `occurred_at` in the closed range
    /// `[start, end]`, in no particular order
    fn events_for_user_in_window(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, MetricsError>;

    /// Append one event to the log
    fn append(&self, event: ActivityEvent) -> Result<(), MetricsError>;

    /// Refresh the daily commit count for a (user, day)
    ///
    /// Replaces the commit-batch record for that day if one exists, otherwise
    /// creates it. This is how connectors publish the rolling daily count
    /// without mutating stored events.
    fn upsert_daily_commits(
        &self,
        user_id: &str,
        day: NaiveDate,
        count: u32,
    ) -> Result<(), MetricsError>;
}

/// Keyed, upsertable persistence for weekly metrics rows
pub trait MetricsStore: Send + Sync {
    /// Row for a (user, week) key, if one exists
    fn get(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyUserMetrics>, MetricsError>;

    /// Insert or fully replace the row for the row's (user, week) key
    fn upsert(&self, row: WeeklyUserMetrics) -> Result<(), MetricsError>;

    /// Rows for all active users sharing `role` at exactly `week_start`,
    /// excluding `exclude_user_id`
    fn cohort_rows(
        &self,
        role: Role,
        week_start: NaiveDate,
        exclude_user_id: &str,
    ) -> Result<Vec<WeeklyUserMetrics>, MetricsError>;

    /// One user's rows with `week_start` in the closed range `[from, to]`
    fn rows_in_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WeeklyUserMetrics>, MetricsError>;

    /// Up to `limit` of one user's rows at or before `week_start`, newest
    /// first
    fn recent_weeks(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        limit: usize,
    ) -> Result<Vec<WeeklyUserMetrics>, MetricsError>;

    /// Write the engagement status onto an existing row, returning the
    /// updated row, or `None` when no row exists for the key
    fn set_status(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        status: EngagementStatus,
    ) -> Result<Option<WeeklyUserMetrics>, MetricsError>;
}

/// Read access to user role and team attributes
pub trait UserDirectory: Send + Sync {
    fn get_user(&self, user_id: &str) -> Result<Option<User>, MetricsError>;

    fn active_users(&self) -> Result<Vec<User>, MetricsError>;
}

/// In-memory implementation of all three store contracts
#[derive(Default)]
pub struct MemoryStore {
    users: RwLock<HashMap<String, User>>,
    events: RwLock<Vec<ActivityEvent>>,
    rows: Mutex<HashMap<(String, NaiveDate), WeeklyUserMetrics>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user in the directory
    pub fn add_user(&self, user: User) {
        self.users
            .write()
            .expect("user map poisoned")
            .insert(user.id.clone(), user);
    }

    fn lookup_role(&self, user_id: &str) -> Option<(Role, bool)> {
        self.users
            .read()
            .expect("user map poisoned")
            .get(user_id)
            .map(|u| (u.role, u.is_active))
    }
}

impl EventStore for MemoryStore {
    fn events_for_user_in_window(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ActivityEvent>, MetricsError> {
        let events = self.events.read().expect("event log poisoned");
        Ok(events
            .iter()
            .filter(|e| e.user_id == user_id && e.occurred_at >= start && e.occurred_at <= end)
            .cloned()
            .collect())
    }

    fn append(&self, event: ActivityEvent) -> Result<(), MetricsError> {
        self.events.write().expect("event log poisoned").push(event);
        Ok(())
    }

    fn upsert_daily_commits(
        &self,
        user_id: &str,
        day: NaiveDate,
        count: u32,
    ) -> Result<(), MetricsError> {
        let mut events = self.events.write().expect("event log poisoned");
        let existing = events.iter_mut().find(|e| {
            e.user_id == user_id
                && e.source == EventSource::Vcs
                && e.kind == EventKind::Commits
                && e.commit_batch.as_ref().map(|b| b.day) == Some(day)
        });
        match existing {
            Some(event) => {
                event.commit_batch = Some(CommitBatch {
                    day,
                    count: Some(count),
                });
            }
            None => {
                let occurred_at = Utc.from_utc_datetime(
                    &day.and_hms_opt(12, 0, 0)
                        .unwrap_or_else(|| day.and_time(chrono::NaiveTime::MIN)),
                );
                events.push(ActivityEvent::commit_batch(user_id, occurred_at, count));
            }
        }
        Ok(())
    }
}

impl MetricsStore for MemoryStore {
    fn get(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<WeeklyUserMetrics>, MetricsError> {
        let rows = self.rows.lock().expect("row map poisoned");
        Ok(rows.get(&(user_id.to_string(), week_start)).cloned())
    }

    fn upsert(&self, row: WeeklyUserMetrics) -> Result<(), MetricsError> {
        let key = (row.user_id.clone(), row.week_start);
        self.rows.lock().expect("row map poisoned").insert(key, row);
        Ok(())
    }

    fn cohort_rows(
        &self,
        role: Role,
        week_start: NaiveDate,
        exclude_user_id: &str,
    ) -> Result<Vec<WeeklyUserMetrics>, MetricsError> {
        let rows = self.rows.lock().expect("row map poisoned");
        Ok(rows
            .values()
            .filter(|row| {
                row.week_start == week_start
                    && row.user_id != exclude_user_id
                    && self.lookup_role(&row.user_id) == Some((role, true))
            })
            .cloned()
            .collect())
    }

    fn rows_in_range(
        &self,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<WeeklyUserMetrics>, MetricsError> {
        let rows = self.rows.lock().expect("row map poisoned");
        let mut result: Vec<_> = rows
            .values()
            .filter(|row| row.user_id == user_id && row.week_start >= from && row.week_start <= to)
            .cloned()
            .collect();
        result.sort_by_key(|row| row.week_start);
        Ok(result)
    }

    fn recent_weeks(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        limit: usize,
    ) -> Result<Vec<WeeklyUserMetrics>, MetricsError> {
        let rows = self.rows.lock().expect("row map poisoned");
        let mut result: Vec<_> = rows
            .values()
            .filter(|row| row.user_id == user_id && row.week_start <= week_start)
            .cloned()
            .collect();
        result.sort_by_key(|row| std::cmp::Reverse(row.week_start));
        result.truncate(limit);
        Ok(result)
    }

    fn set_status(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        status: EngagementStatus,
    ) -> Result<Option<WeeklyUserMetrics>, MetricsError> {
        let mut rows = self.rows.lock().expect("row map poisoned");
        Ok(rows
            .get_mut(&(user_id.to_string(), week_start))
            .map(|row| {
                row.engagement_status = Some(status);
                row.clone()
            }))
    }
}

impl UserDirectory for MemoryStore {
    fn get_user(&self, user_id: &str) -> Result<Option<User>, MetricsError> {
        let users = self.users.read().expect("user map poisoned");
        Ok(users.get(user_id).cloned())
    }

    fn active_users(&self) -> Result<Vec<User>, MetricsError> {
        let users = self.users.read().expect("user map poisoned");
        let mut active: Vec<_> = users.values().filter(|u| u.is_active).cloned().collect();
        active.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(active)
    }
}
