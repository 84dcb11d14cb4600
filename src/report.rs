//! Report rollups
//!
//! Read-only summaries over the weekly metrics store: per-user history with a
//! trend, per-team status counts, and an org-wide weekly report. These never
//! write; they exist for the query paths that sit on top of the engine.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MetricsError;
use crate::store::{MetricsStore, UserDirectory};
use crate::types::{EngagementStatus, User, WeeklyUserMetrics};
use crate::week::weeks_before;

/// Dead band around the historical mean within which a score reads stable
const TREND_DEAD_BAND: f64 = 5.0;

/// Direction of a user's composite score relative to their recent history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// One user's current week plus recent history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSummary {
    pub user_id: String,
    pub user_name: String,
    pub role: crate::types::Role,
    pub current_week: WeeklyUserMetrics,
    pub previous_weeks: Vec<WeeklyUserMetrics>,
    pub trend: Trend,
    pub engagement_status: EngagementStatus,
}

/// Status counts and average score for one team in one week
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamSummary {
    pub team_id: String,
    pub week_start: NaiveDate,
    pub total_members: usize,
    pub healthy_count: usize,
    pub watch_count: usize,
    pub needs_review_count: usize,
    pub average_composite_score: f64,
    pub members: Vec<UserSummary>,
}

/// Org-wide weekly report across all teams
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyReport {
    pub week_start: NaiveDate,
    pub generated_at: chrono::DateTime<Utc>,
    pub teams: Vec<TeamSummary>,
    pub total_users: usize,
    pub healthy_users: usize,
    pub watch_users: usize,
    pub needs_review_users: usize,
}

/// Builder for read-only rollups over the metrics store
pub struct ReportBuilder<'a> {
    metrics: &'a dyn MetricsStore,
    directory: &'a dyn UserDirectory,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(metrics: &'a dyn MetricsStore, directory: &'a dyn UserDirectory) -> Self {
        Self { metrics, directory }
    }

    /// Summary for one user at `week_start`, with `history_weeks` of context
    ///
    /// Fails with `MetricsNotFound` when the current week has no row yet.
    pub fn user_summary(
        &self,
        user_id: &str,
        week_start: NaiveDate,
        history_weeks: u32,
    ) -> Result<UserSummary, MetricsError> {
        let user = self
            .directory
            .get_user(user_id)?
            .ok_or_else(|| MetricsError::UserNotFound(user_id.to_string()))?;
        let current = self.metrics.get(user_id, week_start)?.ok_or_else(|| {
            MetricsError::MetricsNotFound {
                user_id: user_id.to_string(),
                week_start,
            }
        })?;

        let mut previous = self.metrics.rows_in_range(
            user_id,
            weeks_before(week_start, history_weeks),
            weeks_before(week_start, 1),
        )?;
        // Newest first, matching the classifier's lookback orientation
        previous.reverse();

        let trend = compute_trend(current.composite_score, &previous);
        let engagement_status = current
            .engagement_status
            .unwrap_or(EngagementStatus::Healthy);

        Ok(UserSummary {
            user_id: user.id,
            user_name: user.name,
            role: user.role,
            current_week: current,
            previous_weeks: previous,
            trend,
            engagement_status,
        })
    }

    /// Summary for one team's active members at `week_start`
    ///
    /// Members without a row for the week are counted in `total_members` but
    /// contribute no score or status.
    pub fn team_summary(
        &self,
        team_id: &str,
        week_start: NaiveDate,
    ) -> Result<TeamSummary, MetricsError> {
        let members: Vec<User> = self
            .directory
            .active_users()?
            .into_iter()
            .filter(|u| u.team_id.as_deref() == Some(team_id))
            .collect();
        if members.is_empty() {
            return Err(MetricsError::InvalidInput(format!(
                "team {team_id} has no active members"
            )));
        }
        self.summarize_team(team_id, &members, week_start)
    }

    /// Report across every team with active members, plus org-wide counts
    pub fn weekly_report(&self, week_start: NaiveDate) -> Result<WeeklyReport, MetricsError> {
        let users = self.directory.active_users()?;

        let mut by_team: BTreeMap<String, Vec<User>> = BTreeMap::new();
        for user in &users {
            if let Some(team_id) = &user.team_id {
                by_team.entry(team_id.clone()).or_default().push(user.clone());
            }
        }

        let mut teams = Vec::with_capacity(by_team.len());
        for (team_id, members) in &by_team {
            teams.push(self.summarize_team(team_id, members, week_start)?);
        }

        let mut report = WeeklyReport {
            week_start,
            generated_at: Utc::now(),
            teams,
            total_users: users.len(),
            healthy_users: 0,
            watch_users: 0,
            needs_review_users: 0,
        };
        for user in &users {
            match self.status_of(&user.id, week_start)? {
                Some(EngagementStatus::Watch) => report.watch_users += 1,
                Some(EngagementStatus::NeedsReview) => report.needs_review_users += 1,
                _ => report.healthy_users += 1,
            }
        }
        Ok(report)
    }

    fn status_of(
        &self,
        user_id: &str,
        week_start: NaiveDate,
    ) -> Result<Option<EngagementStatus>, MetricsError> {
        Ok(self
            .metrics
            .get(user_id, week_start)?
            .and_then(|row| row.engagement_status))
    }

    fn summarize_team(
        &self,
        team_id: &str,
        members: &[User],
        week_start: NaiveDate,
    ) -> Result<TeamSummary, MetricsError> {
        let mut summary = TeamSummary {
            team_id: team_id.to_string(),
            week_start,
            total_members: members.len(),
            healthy_count: 0,
            watch_count: 0,
            needs_review_count: 0,
            average_composite_score: 0.0,
            members: Vec::new(),
        };

        let mut total_score = 0.0;
        let mut scored = 0usize;
        for user in members {
            let user_summary = match self.user_summary(&user.id, week_start, 4) {
                Ok(user_summary) => user_summary,
                // No row for this member yet; count membership only
                Err(MetricsError::MetricsNotFound { .. }) => {
                    summary.healthy_count += 1;
                    continue;
                }
                Err(err) => return Err(err),
            };
            match user_summary.engagement_status {
                EngagementStatus::Healthy => summary.healthy_count += 1,
                EngagementStatus::Watch => summary.watch_count += 1,
                EngagementStatus::NeedsReview => summary.needs_review_count += 1,
            }
            if let Some(score) = user_summary.current_week.composite_score {
                total_score += score;
                scored += 1;
            }
            summary.members.push(user_summary);
        }
        if scored > 0 {
            summary.average_composite_score = total_score / scored as f64;
        }
        Ok(summary)
    }
}

/// Compare the current composite to the mean of prior weeks' composites
fn compute_trend(current: Option<f64>, previous: &[WeeklyUserMetrics]) -> Trend {
    let Some(current) = current else {
        return Trend::Stable;
    };
    let history: Vec<f64> = previous.iter().filter_map(|r| r.composite_score).collect();
    if history.is_empty() {
        return Trend::Stable;
    }
    let mean = history.iter().sum::<f64>() / history.len() as f64;
    if current > mean + TREND_DEAD_BAND {
        Trend::Improving
    } else if current < mean - TREND_DEAD_BAND {
        Trend::Declining
    } else {
        Trend::Stable
    }
}
