use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AnalyticsError {
    /// Input outside a declared range: scores, capacities, self-edges.
    #[error("validation error: {0}")]
    Validation(String),
    #[error("skill table error: {0}")]
    SkillTable(String),
    #[error("record source error: {0}")]
    Source(String),
}

impl AnalyticsError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<csv::Error> for AnalyticsError {
    fn from(e: csv::Error) -> Self {
        Self::Source(e.to_string())
    }
}

impl From<serde_json::Error> for AnalyticsError {
    fn from(e: serde_json::Error) -> Self {
        Self::Source(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AnalyticsError>;
