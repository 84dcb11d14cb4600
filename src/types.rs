//! Core data types
//!
//! This module defines the activity events consumed by the engine, the weekly
//! per-user metrics rows it produces, and the typed exception flags attached
//! to a week.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MetricsError;

/// Source system an activity event originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Tracker,
    Vcs,
    Docs,
    Calendar,
}

/// Activity event types, scoped per source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    TicketCompleted,
    PrMerged,
    PrReviewed,
    Commits,
    DocCreated,
    Meeting,
}

/// Ticket event data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketDetail {
    /// Story points attached to the ticket, if estimated
    pub story_points: Option<f64>,
}

/// Daily commit batch data
///
/// Connectors refresh a user's commit count once per day by upserting the
/// batch record for that (user, day) rather than mutating a stored event,
/// keeping the event log append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitBatch {
    /// Calendar day the batch covers
    pub day: NaiveDate,
    /// Number of commits pushed that day
    pub count: Option<u32>,
}

/// Meeting event data
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingDetail {
    /// Meeting duration in hours
    pub duration_hours: Option<f64>,
}

/// An activity event with timestamp and kind-specific payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Unique event identifier
    pub event_id: Uuid,
    /// User the event belongs to
    pub user_id: String,
    /// Source system
    pub source: EventSource,
    /// Event kind
    pub kind: EventKind,
    /// When the activity occurred
    pub occurred_at: DateTime<Utc>,
    /// Ticket data (present when kind is TicketCompleted)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ticket: Option<TicketDetail>,
    /// Commit batch data (present when kind is Commits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_batch: Option<CommitBatch>,
    /// Meeting data (present when kind is Meeting)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meeting: Option<MeetingDetail>,
}

impl ActivityEvent {
    fn bare(
        user_id: &str,
        source: EventSource,
        kind: EventKind,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            user_id: user_id.to_string(),
            source,
            kind,
            occurred_at,
            ticket: None,
            commit_batch: None,
            meeting: None,
        }
    }

    /// Tracker event for a completed ticket
    pub fn ticket_completed(
        user_id: &str,
        occurred_at: DateTime<Utc>,
        story_points: Option<f64>,
    ) -> Self {
        let mut event = Self::bare(
            user_id,
            EventSource::Tracker,
            EventKind::TicketCompleted,
            occurred_at,
        );
        event.ticket = Some(TicketDetail { story_points });
        event
    }

    /// VCS event for a merged pull request authored by the user
    pub fn pr_merged(user_id: &str, occurred_at: DateTime<Utc>) -> Self {
        Self::bare(user_id, EventSource::Vcs, EventKind::PrMerged, occurred_at)
    }

    /// VCS event for a pull request reviewed by the user
    pub fn pr_reviewed(user_id: &str, occurred_at: DateTime<Utc>) -> Self {
        Self::bare(user_id, EventSource::Vcs, EventKind::PrReviewed, occurred_at)
    }

    /// VCS daily commit batch
    pub fn commit_batch(
        user_id: &str,
        occurred_at: DateTime<Utc>,
        count: u32,
    ) -> Self {
        let mut event = Self::bare(user_id, EventSource::Vcs, EventKind::Commits, occurred_at);
        event.commit_batch = Some(CommitBatch {
            day: occurred_at.date_naive(),
            count: Some(count),
        });
        event
    }

    /// Docs event for a created document
    pub fn doc_created(user_id: &str, occurred_at: DateTime<Utc>) -> Self {
        Self::bare(user_id, EventSource::Docs, EventKind::DocCreated, occurred_at)
    }

    /// Calendar event for an attended meeting
    pub fn meeting(user_id: &str, occurred_at: DateTime<Utc>, duration_hours: f64) -> Self {
        let mut event = Self::bare(
            user_id,
            EventSource::Calendar,
            EventKind::Meeting,
            occurred_at,
        );
        event.meeting = Some(MeetingDetail {
            duration_hours: Some(duration_hours),
        });
        event
    }
}

/// Raw weekly activity counts for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMetrics {
    pub tickets_completed: u32,
    pub story_points: f64,
    pub prs_authored: u32,
    pub prs_reviewed: u32,
    pub commits: u32,
    pub docs_authored: u32,
    pub meeting_hours: f64,
}

/// Peer-normalized metrics: signed z-scores, one per raw metric
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedMetrics {
    pub tickets: f64,
    pub story_points: f64,
    pub prs_authored: f64,
    pub prs_reviewed: f64,
    pub commits: f64,
    pub docs: f64,
    pub meetings: f64,
}

/// Engagement-risk status of a user-week
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngagementStatus {
    Healthy,
    Watch,
    NeedsReview,
}

impl std::fmt::Display for EngagementStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngagementStatus::Healthy => write!(f, "healthy"),
            EngagementStatus::Watch => write!(f, "watch"),
            EngagementStatus::NeedsReview => write!(f, "needs_review"),
        }
    }
}

/// Engineering role used for peer cohorts and score weights
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Backend,
    Frontend,
    Devops,
    Manager,
    /// Any role without its own weight table; scored with backend weights
    #[serde(other)]
    Other,
}

/// A user as read from the directory; the engine never manages identity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(default)]
    pub team_id: Option<String>,
    #[serde(default)]
    pub onboarding_date: Option<NaiveDate>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

/// PTO exception covering a date range
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtoFlag {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Onboarding exception up to a cutoff date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardingFlag {
    pub until: NaiveDate,
}

/// Role-change exception; a two-week grace period follows the change date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleChangeFlag {
    pub date: NaiveDate,
}

/// On-call exception for exactly one week bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnCallFlag {
    pub week: NaiveDate,
}

/// Manual status override recorded by a manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverrideFlag {
    pub reason: String,
    pub by: String,
    pub at: DateTime<Utc>,
}

/// Typed exception markers attached to one user-week
///
/// Connectors and admin tooling publish flags as a flat key-value map; the
/// map is validated into this structure once at the store boundary via
/// [`WeekFlags::from_loose_json`]. Each recognized exception kind carries only
/// its own typed fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeekFlags {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pto: Option<PtoFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub onboarding: Option<OnboardingFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_change: Option<RoleChangeFlag>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_call: Option<OnCallFlag>,
    #[serde(default, rename = "override", skip_serializing_if = "Option::is_none")]
    pub status_override: Option<OverrideFlag>,
}

impl WeekFlags {
    /// True when no marker of any kind is set
    pub fn is_empty(&self) -> bool {
        self.pto.is_none()
            && self.onboarding.is_none()
            && self.role_change.is_none()
            && self.on_call.is_none()
            && self.status_override.is_none()
    }

    /// Parse connector-style flat flags, e.g.
    /// `{"pto": true, "pto_start": "2024-01-08", "pto_end": "2024-01-19"}`.
    ///
    /// A marker whose companion fields are missing or malformed is dropped
    /// rather than erroring; only a non-object value is rejected.
    pub fn from_loose_json(value: &serde_json::Value) -> Result<Self, MetricsError> {
        if value.is_null() {
            return Ok(Self::default());
        }
        let map = value.as_object().ok_or_else(|| {
            MetricsError::InvalidInput("flags must be a JSON object".to_string())
        })?;

        let truthy = |key: &str| map.get(key).and_then(serde_json::Value::as_bool) == Some(true);
        let date_field = |key: &str| {
            map.get(key)
                .and_then(serde_json::Value::as_str)
                .and_then(|s| s.parse::<NaiveDate>().ok())
        };

        let mut flags = Self::default();

        if truthy("pto") {
            if let (Some(start), Some(end)) = (date_field("pto_start"), date_field("pto_end")) {
                flags.pto = Some(PtoFlag { start, end });
            }
        }
        if truthy("onboarding") {
            if let Some(until) = date_field("onboarding_until") {
                flags.onboarding = Some(OnboardingFlag { until });
            }
        }
        if truthy("role_change") {
            if let Some(date) = date_field("role_change_date") {
                flags.role_change = Some(RoleChangeFlag { date });
            }
        }
        if truthy("on_call") {
            if let Some(week) = date_field("on_call_week") {
                flags.on_call = Some(OnCallFlag { week });
            }
        }
        if truthy("override") {
            let text = |key: &str| {
                map.get(key)
                    .and_then(serde_json::Value::as_str)
                    .map(str::to_string)
            };
            if let Some(reason) = text("override_reason") {
                flags.status_override = Some(OverrideFlag {
                    reason,
                    by: text("override_by").unwrap_or_else(|| "unknown".to_string()),
                    at: map
                        .get("override_at")
                        .and_then(serde_json::Value::as_str)
                        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
                        .unwrap_or_else(Utc::now),
                });
            }
        }

        Ok(flags)
    }
}

/// One row of aggregated weekly metrics per (user, week)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyUserMetrics {
    pub user_id: String,
    /// Monday-aligned week bucket
    pub week_start: NaiveDate,
    /// Raw activity counts for the week
    #[serde(flatten)]
    pub raw: RawMetrics,
    /// Composite productivity score, 0-100
    #[serde(default)]
    pub composite_score: Option<f64>,
    /// Trailing historical reference score
    #[serde(default)]
    pub baseline_score: Option<f64>,
    /// Derived engagement-risk status
    #[serde(default)]
    pub engagement_status: Option<EngagementStatus>,
    /// Exception and override markers
    #[serde(default)]
    pub flags: WeekFlags,
}

impl WeeklyUserMetrics {
    /// Empty row for a (user, week) key
    pub fn new(user_id: &str, week_start: NaiveDate) -> Self {
        Self {
            user_id: user_id.to_string(),
            week_start,
            raw: RawMetrics::default(),
            composite_score: None,
            baseline_score: None,
            engagement_status: None,
            flags: WeekFlags::default(),
        }
    }

    /// No tickets, authored PRs, or commits this week
    ///
    /// This is the inactivity shape the sustained-inactivity rule checks on
    /// lookback rows (docs are checked only on the current week).
    pub fn is_inactive(&self) -> bool {
        self.raw.tickets_completed == 0 && self.raw.prs_authored == 0 && self.raw.commits == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_event_kind_serialization() {
        let kind = EventKind::TicketCompleted;
        let json = serde_json::to_string(&kind).unwrap();
        assert_eq!(json, "\"ticket_completed\"");

        let parsed: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, EventKind::TicketCompleted);
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&EngagementStatus::NeedsReview).unwrap();
        assert_eq!(json, "\"needs_review\"");
        assert_eq!(EngagementStatus::NeedsReview.to_string(), "needs_review");
    }

    #[test]
    fn test_unknown_role_parses_as_other() {
        let role: Role = serde_json::from_str("\"data_scientist\"").unwrap();
        assert_eq!(role, Role::Other);
    }

    #[test]
    fn test_event_deserialization_with_payload() {
        let json = r#"{
            "event_id": "550e8400-e29b-41d4-a716-446655440000",
            "user_id": "u1",
            "source": "tracker",
            "kind": "ticket_completed",
            "occurred_at": "2024-01-15T10:00:00Z",
            "ticket": {"story_points": 5.0}
        }"#;

        let event: ActivityEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.source, EventSource::Tracker);
        assert_eq!(event.kind, EventKind::TicketCompleted);
        assert_eq!(event.ticket.unwrap().story_points, Some(5.0));
    }

    #[test]
    fn test_loose_flags_parsing() {
        let value = serde_json::json!({
            "pto": true,
            "pto_start": "2024-01-08",
            "pto_end": "2024-01-19",
            "on_call": true,
            "on_call_week": "2024-01-15"
        });

        let flags = WeekFlags::from_loose_json(&value).unwrap();
        let pto = flags.pto.unwrap();
        assert_eq!(pto.start, date(2024, 1, 8));
        assert_eq!(pto.end, date(2024, 1, 19));
        assert_eq!(flags.on_call.unwrap().week, date(2024, 1, 15));
        assert!(flags.onboarding.is_none());
    }

    #[test]
    fn test_loose_flags_missing_companions_dropped() {
        // pto without dates must not produce a marker
        let value = serde_json::json!({"pto": true});
        let flags = WeekFlags::from_loose_json(&value).unwrap();
        assert!(flags.pto.is_none());
        assert!(flags.is_empty());
    }

    #[test]
    fn test_loose_flags_rejects_non_object() {
        let value = serde_json::json!(["pto"]);
        assert!(WeekFlags::from_loose_json(&value).is_err());
    }

    #[test]
    fn test_weekly_metrics_row_flattens_raw_fields() {
        let mut row = WeeklyUserMetrics::new("u1", date(2024, 1, 15));
        row.raw.commits = 12;

        let json = serde_json::to_value(&row).unwrap();
        assert_eq!(json["commits"], 12);
        assert_eq!(json["week_start"], "2024-01-15");
    }

    #[test]
    fn test_inactivity_shape() {
        let mut row = WeeklyUserMetrics::new("u1", date(2024, 1, 15));
        assert!(row.is_inactive());
        row.raw.meeting_hours = 10.0;
        assert!(row.is_inactive());
        row.raw.commits = 1;
        assert!(!row.is_inactive());
    }
}
