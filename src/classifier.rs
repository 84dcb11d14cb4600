//! Engagement classification
//!
//! Turns one weekly row plus a bounded lookback window of prior rows into an
//! engagement-risk status. The decision procedure is an explicit ordered list
//! of pure predicate rules over an immutable [`LookbackSnapshot`]; the first
//! rule that fires wins. Sustained-threshold rules deliberately precede the
//! sudden-drop rule, so week three of a decline reads `needs_review` even when
//! that week also qualifies as a sudden drop.

use chrono::{Days, NaiveDate};

use crate::config::DetectionConfig;
use crate::error::MetricsError;
use crate::store::MetricsStore;
use crate::types::{EngagementStatus, WeekFlags, WeeklyUserMetrics};
use crate::week::previous_week;

/// Grace period after a role change during which low activity is excused
const ROLE_CHANGE_GRACE_DAYS: u64 = 14;

/// True when any exception marker excuses low activity for `week_start`
///
/// - PTO covering the week start
/// - onboarding up to and including its cutoff date
/// - a role change within the trailing two-week grace period
/// - on-call duty for exactly this week bucket
pub fn check_exceptions(flags: &WeekFlags, week_start: NaiveDate) -> bool {
    if let Some(pto) = &flags.pto {
        if pto.start <= week_start && week_start <= pto.end {
            return true;
        }
    }
    if let Some(onboarding) = &flags.onboarding {
        if week_start <= onboarding.until {
            return true;
        }
    }
    if let Some(role_change) = &flags.role_change {
        if week_start <= role_change.date + Days::new(ROLE_CHANGE_GRACE_DAYS) {
            return true;
        }
    }
    if let Some(on_call) = &flags.on_call {
        if on_call.week == week_start {
            return true;
        }
    }
    false
}

/// Immutable view of everything the rules may consult for one user-week
#[derive(Debug, Clone)]
pub struct LookbackSnapshot {
    /// Week being classified
    pub week_start: NaiveDate,
    /// The row under classification
    pub row: WeeklyUserMetrics,
    /// Up to `needs_review_weeks` rows with `week_start` up to and including
    /// the target week, newest first (the target row is index 0 once written)
    pub recent: Vec<WeeklyUserMetrics>,
    /// The immediately preceding week's row, if one exists
    pub previous: Option<WeeklyUserMetrics>,
}

impl LookbackSnapshot {
    /// Load the lookback window for a row from the metrics store
    pub fn load(
        store: &dyn MetricsStore,
        config: &DetectionConfig,
        row: WeeklyUserMetrics,
    ) -> Result<Self, MetricsError> {
        let week_start = row.week_start;
        let recent = store.recent_weeks(&row.user_id, week_start, config.needs_review_weeks)?;
        let previous = store.get(&row.user_id, previous_week(week_start))?;
        Ok(Self {
            week_start,
            row,
            recent,
            previous,
        })
    }

    /// Rows of the lookback where the composite fell below the low-engagement
    /// threshold relative to that row's own baseline, with no exception
    /// covering that row's week
    fn below_threshold_count(&self, config: &DetectionConfig) -> usize {
        self.recent
            .iter()
            .filter(|wm| {
                match (wm.composite_score, wm.baseline_score) {
                    (Some(composite), Some(baseline)) => {
                        composite < baseline * (1.0 - config.low_engagement_threshold)
                            && !check_exceptions(&wm.flags, wm.week_start)
                    }
                    _ => false,
                }
            })
            .count()
    }
}

/// Result of classification: the status and the rule that produced it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: EngagementStatus,
    /// Name of the rule that fired; "default" when none did
    pub rule: &'static str,
}

type RuleFn = fn(&DetectionConfig, &LookbackSnapshot) -> Option<EngagementStatus>;

/// One ordered entry of the decision procedure
pub struct Rule {
    pub name: &'static str,
    check: RuleFn,
}

/// The decision procedure, in evaluation order
pub const RULES: &[Rule] = &[
    Rule {
        name: "manual_override",
        check: manual_override,
    },
    Rule {
        name: "exception_override",
        check: exception_override,
    },
    Rule {
        name: "insufficient_data",
        check: insufficient_data,
    },
    Rule {
        name: "sustained_needs_review",
        check: sustained_needs_review,
    },
    Rule {
        name: "sustained_watch",
        check: sustained_watch,
    },
    Rule {
        name: "sudden_drop",
        check: sudden_drop,
    },
    Rule {
        name: "low_collaboration",
        check: low_collaboration,
    },
    Rule {
        name: "sustained_inactivity",
        check: sustained_inactivity,
    },
];

/// A manager's override pins the week to healthy until the flag is removed
fn manual_override(_: &DetectionConfig, snap: &LookbackSnapshot) -> Option<EngagementStatus> {
    snap.row
        .flags
        .status_override
        .as_ref()
        .map(|_| EngagementStatus::Healthy)
}

fn exception_override(_: &DetectionConfig, snap: &LookbackSnapshot) -> Option<EngagementStatus> {
    check_exceptions(&snap.row.flags, snap.week_start).then_some(EngagementStatus::Healthy)
}

/// Without both a composite and a baseline there is nothing to judge
fn insufficient_data(_: &DetectionConfig, snap: &LookbackSnapshot) -> Option<EngagementStatus> {
    (snap.row.baseline_score.is_none() || snap.row.composite_score.is_none())
        .then_some(EngagementStatus::Healthy)
}

fn sustained_needs_review(
    config: &DetectionConfig,
    snap: &LookbackSnapshot,
) -> Option<EngagementStatus> {
    (snap.recent.len() >= config.needs_review_weeks
        && snap.below_threshold_count(config) >= config.needs_review_weeks)
        .then_some(EngagementStatus::NeedsReview)
}

fn sustained_watch(config: &DetectionConfig, snap: &LookbackSnapshot) -> Option<EngagementStatus> {
    (snap.recent.len() >= config.watch_weeks
        && snap.below_threshold_count(config) >= config.watch_weeks)
        .then_some(EngagementStatus::Watch)
}

/// A steep one-week drop from an otherwise healthy level
fn sudden_drop(config: &DetectionConfig, snap: &LookbackSnapshot) -> Option<EngagementStatus> {
    let composite = snap.row.composite_score?;
    let baseline = snap.row.baseline_score?;
    if composite >= baseline * (1.0 - config.sudden_drop_threshold) {
        return None;
    }
    let previous_score = snap.previous.as_ref()?.composite_score?;
    (previous_score >= baseline * 0.9).then_some(EngagementStatus::Watch)
}

/// Authoring PRs while reviewing none, as a pattern across the lookback
fn low_collaboration(_: &DetectionConfig, snap: &LookbackSnapshot) -> Option<EngagementStatus> {
    if snap.row.raw.prs_reviewed != 0 || snap.row.raw.prs_authored == 0 {
        return None;
    }
    let recent_reviews: u32 = snap
        .recent
        .iter()
        .take(4)
        .map(|wm| wm.raw.prs_reviewed)
        .sum();
    (recent_reviews == 0 && snap.recent.len() >= 2).then_some(EngagementStatus::Watch)
}

/// All output metrics at zero this week and the week before, unexcused
fn sustained_inactivity(
    _: &DetectionConfig,
    snap: &LookbackSnapshot,
) -> Option<EngagementStatus> {
    let raw = &snap.row.raw;
    if raw.tickets_completed != 0
        || raw.prs_authored != 0
        || raw.commits != 0
        || raw.docs_authored != 0
    {
        return None;
    }
    let inactive_weeks = snap
        .recent
        .iter()
        .take(2)
        .filter(|wm| wm.is_inactive() && !check_exceptions(&wm.flags, wm.week_start))
        .count();
    (inactive_weeks >= 2).then_some(EngagementStatus::Watch)
}

/// Classifier running the ordered decision procedure
pub struct EngagementClassifier;

impl EngagementClassifier {
    /// Classify a snapshot; first matching rule wins, default healthy
    pub fn classify(config: &DetectionConfig, snapshot: &LookbackSnapshot) -> Classification {
        for rule in RULES {
            if let Some(status) = (rule.check)(config, snapshot) {
                return Classification {
                    status,
                    rule: rule.name,
                };
            }
        }
        Classification {
            status: EngagementStatus::Healthy,
            rule: "default",
        }
    }

    /// Load the lookback for an existing row and classify it
    ///
    /// Fails with `MetricsNotFound` when the (user, week) row does not exist;
    /// callers must aggregate before classifying.
    pub fn classify_week(
        store: &dyn MetricsStore,
        config: &DetectionConfig,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Classification, MetricsError> {
        let row = store
            .get(user_id, week_start)?
            .ok_or_else(|| MetricsError::MetricsNotFound {
                user_id: user_id.to_string(),
                week_start,
            })?;
        let snapshot = LookbackSnapshot::load(store, config, row)?;
        Ok(Self::classify(config, &snapshot))
    }
}
