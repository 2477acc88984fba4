//! Engagement analytics for Group Scholar cohorts.
//!
//! A batch of activity records is turned into a score-ordered index, a
//! ranking, a search index, a recency cache and a collaboration graph. See
//! [`analysis::AnalysisBatch`] for the entry point.

pub mod analysis;
pub mod cache;
pub mod config;
pub mod engagement_index;
pub mod error;
pub mod fields;
pub mod graph;
pub mod models;
pub mod ranking;
pub mod report;
pub mod search;
pub mod skills;
pub mod source;
pub mod summary;
pub mod telemetry;
pub mod trend;
pub mod trie;

pub use analysis::AnalysisBatch;
pub use config::EngineConfig;
pub use error::{AnalyticsError, Result};
