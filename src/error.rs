//! Error types for the teampulse engine

use chrono::NaiveDate;
use thiserror::Error;

/// Errors that can occur during aggregation or classification
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("No weekly metrics for user {user_id}, week {week_start}; aggregate before classifying")]
    MetricsNotFound {
        user_id: String,
        week_start: NaiveDate,
    },

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Store error: {0}")]
    StoreError(String),
}
