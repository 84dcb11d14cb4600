//! Engine configuration
//!
//! Weight tables and detection thresholds are explicit values handed to the
//! engine at construction, so alternative configurations can be exercised side
//! by side in tests. Every field has a serde default matching the production
//! configuration, so a partial JSON document is a valid config.

use serde::{Deserialize, Serialize};

use crate::types::{NormalizedMetrics, Role};

/// Per-metric weights for one role; the seven weights sum to 1.0
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub tickets: f64,
    pub story_points: f64,
    pub prs_authored: f64,
    pub prs_reviewed: f64,
    pub commits: f64,
    pub docs: f64,
    pub meetings: f64,
}

impl ScoreWeights {
    /// Weighted blend of normalized metrics, centered so an average peer
    /// lands at 50 and ±1 standard deviation moves the score by ±10
    pub fn blend(&self, normalized: &NormalizedMetrics) -> f64 {
        let mut score = 0.0;
        score += (50.0 + normalized.tickets * 10.0) * self.tickets;
        score += (50.0 + normalized.story_points * 10.0) * self.story_points;
        score += (50.0 + normalized.prs_authored * 10.0) * self.prs_authored;
        score += (50.0 + normalized.prs_reviewed * 10.0) * self.prs_reviewed;
        score += (50.0 + normalized.commits * 10.0) * self.commits;
        score += (50.0 + normalized.docs * 10.0) * self.docs;
        score += (50.0 + normalized.meetings * 10.0) * self.meetings;
        score
    }
}

/// Weight tables keyed by role
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleWeights {
    pub backend: ScoreWeights,
    pub frontend: ScoreWeights,
    pub devops: ScoreWeights,
    pub manager: ScoreWeights,
}

impl RoleWeights {
    /// Weight set for a role; roles without their own table score as backend
    pub fn for_role(&self, role: Role) -> &ScoreWeights {
        match role {
            Role::Backend | Role::Other => &self.backend,
            Role::Frontend => &self.frontend,
            Role::Devops => &self.devops,
            Role::Manager => &self.manager,
        }
    }
}

impl Default for RoleWeights {
    fn default() -> Self {
        let engineer = ScoreWeights {
            tickets: 0.25,
            story_points: 0.20,
            prs_authored: 0.15,
            prs_reviewed: 0.15,
            commits: 0.10,
            docs: 0.10,
            meetings: 0.05,
        };
        Self {
            backend: engineer,
            frontend: engineer,
            devops: ScoreWeights {
                tickets: 0.20,
                story_points: 0.15,
                prs_authored: 0.15,
                prs_reviewed: 0.15,
                commits: 0.15,
                docs: 0.15,
                meetings: 0.05,
            },
            manager: ScoreWeights {
                tickets: 0.15,
                story_points: 0.10,
                prs_authored: 0.10,
                prs_reviewed: 0.10,
                commits: 0.05,
                docs: 0.20,
                meetings: 0.30,
            },
        }
    }
}

/// Thresholds and lookback widths for the engagement classifier
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Fraction below baseline counting as low engagement (0.3 = 30% below)
    pub low_engagement_threshold: f64,
    /// Fraction below baseline counting as a sudden drop (0.4 = 40% below)
    pub sudden_drop_threshold: f64,
    /// Low weeks needed to trigger watch
    pub watch_weeks: usize,
    /// Low weeks needed to trigger needs_review; also the lookback width
    pub needs_review_weeks: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            low_engagement_threshold: 0.3,
            sudden_drop_threshold: 0.4,
            watch_weeks: 2,
            needs_review_weeks: 3,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Composite score weight tables
    pub weights: RoleWeights,
    /// Engagement detection thresholds
    pub detection: DetectionConfig,
    /// Trailing window for the baseline estimator, in weeks
    pub baseline_lookback_weeks: u32,
    /// How many past weeks the batch job backfills when rows are missing
    pub backfill_weeks: u32,
    /// Interval between batch runs, in hours
    pub aggregation_interval_hours: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            weights: RoleWeights::default(),
            detection: DetectionConfig::default(),
            baseline_lookback_weeks: 8,
            backfill_weeks: 4,
            aggregation_interval_hours: 24,
        }
    }
}

impl EngineConfig {
    /// Load a configuration from JSON; absent fields take their defaults
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_weight_tables_sum_to_one() {
        let weights = RoleWeights::default();
        for table in [
            &weights.backend,
            &weights.frontend,
            &weights.devops,
            &weights.manager,
        ] {
            let sum = table.tickets
                + table.story_points
                + table.prs_authored
                + table.prs_reviewed
                + table.commits
                + table.docs
                + table.meetings;
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unknown_role_uses_backend_weights() {
        let weights = RoleWeights::default();
        assert_eq!(weights.for_role(Role::Other), &weights.backend);
    }

    #[test]
    fn test_neutral_metrics_blend_to_fifty() {
        let weights = RoleWeights::default();
        let neutral = NormalizedMetrics::default();
        for role in [Role::Backend, Role::Frontend, Role::Devops, Role::Manager] {
            let score = weights.for_role(role).blend(&neutral);
            assert!((score - 50.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_partial_config_takes_defaults() {
        let config =
            EngineConfig::from_json(r#"{"detection": {"watch_weeks": 4}}"#).unwrap();
        assert_eq!(config.detection.watch_weeks, 4);
        assert_eq!(config.detection.needs_review_weeks, 3);
        assert_eq!(config.baseline_lookback_weeks, 8);
        assert_eq!(config.weights, RoleWeights::default());
    }
}
