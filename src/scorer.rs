//! Composite scoring
//!
//! Blends peer-normalized metrics through role-specific weights into a single
//! bounded 0-100 score. An average peer lands at 50; each standard deviation
//! above or below the cohort moves the score by 10 points per unit of weight.

use crate::config::RoleWeights;
use crate::types::{NormalizedMetrics, Role};

/// Scorer for combining normalized metrics into a composite score
pub struct CompositeScorer;

impl CompositeScorer {
    /// Composite score for a role, clamped to [0, 100]
    pub fn score(weights: &RoleWeights, normalized: &NormalizedMetrics, role: Role) -> f64 {
        weights.for_role(role).blend(normalized).clamp(0.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn uniform(z: f64) -> NormalizedMetrics {
        NormalizedMetrics {
            tickets: z,
            story_points: z,
            prs_authored: z,
            prs_reviewed: z,
            commits: z,
            docs: z,
            meetings: z,
        }
    }

    #[test]
    fn test_neutral_peer_scores_fifty() {
        let weights = RoleWeights::default();
        let score = CompositeScorer::score(&weights, &uniform(0.0), Role::Backend);
        assert_eq!(score, 50.0);
    }

    #[test]
    fn test_one_stddev_above_scores_sixty() {
        // Weights sum to 1.0, so a uniform +1z adds exactly 10 points
        let weights = RoleWeights::default();
        let score = CompositeScorer::score(&weights, &uniform(1.0), Role::Devops);
        assert!((score - 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_score_clamped_to_bounds() {
        let weights = RoleWeights::default();
        assert_eq!(
            CompositeScorer::score(&weights, &uniform(50.0), Role::Backend),
            100.0
        );
        assert_eq!(
            CompositeScorer::score(&weights, &uniform(-50.0), Role::Backend),
            0.0
        );
    }

    #[test]
    fn test_unknown_role_scores_like_backend() {
        let weights = RoleWeights::default();
        let normalized = NormalizedMetrics {
            tickets: 2.0,
            docs: -1.0,
            ..NormalizedMetrics::default()
        };
        assert_eq!(
            CompositeScorer::score(&weights, &normalized, Role::Other),
            CompositeScorer::score(&weights, &normalized, Role::Backend),
        );
    }

    #[test]
    fn test_role_weights_differentiate_scores() {
        let weights = RoleWeights::default();
        let meetings_heavy = NormalizedMetrics {
            meetings: 3.0,
            ..NormalizedMetrics::default()
        };
        let manager = CompositeScorer::score(&weights, &meetings_heavy, Role::Manager);
        let backend = CompositeScorer::score(&weights, &meetings_heavy, Role::Backend);
        assert!(manager > backend);
    }
}
