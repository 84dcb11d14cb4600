//! Teampulse - engagement analytics engine for weekly team activity signals
//!
//! Teampulse turns a per-user activity event log (issue tracker, source
//! control, docs, calendar) into weekly metrics rollups through a
//! deterministic pipeline: event reduction → peer cohort normalization →
//! role-weighted composite scoring → baseline estimation → engagement
//! classification.
//!
//! ## Modules
//!
//! - **Aggregation**: reduce a week of events into raw counts and derive
//!   scores ([`aggregator`], [`normalizer`], [`scorer`], [`baseline`])
//! - **Classification**: ordered-rule engagement detector with exception
//!   handling ([`classifier`])
//! - **Orchestration**: the public engine facade and the periodic batch job
//!   ([`pipeline`], [`job`])

pub mod aggregator;
pub mod baseline;
pub mod classifier;
pub mod config;
pub mod error;
pub mod job;
pub mod normalizer;
pub mod pipeline;
pub mod report;
pub mod scorer;
pub mod store;
pub mod types;
pub mod week;

pub use config::{DetectionConfig, EngineConfig, RoleWeights, ScoreWeights};
pub use error::MetricsError;
pub use job::{AggregationJob, RunStats};
pub use pipeline::MetricsEngine;
pub use store::{EventStore, MemoryStore, MetricsStore, UserDirectory};
pub use types::{
    ActivityEvent, EngagementStatus, EventKind, EventSource, RawMetrics, Role, User, WeekFlags,
    WeeklyUserMetrics,
};

/// Engine version embedded in reports and CLI output
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
