use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementLevel {
    Low,
    Medium,
    High,
}

impl EngagementLevel {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" => Some(Self::Medium),
            "high" => Some(Self::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A single piece of student activity as delivered by a record source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    pub student_id: String,
    pub activity_type: String,
    pub occurred_at: NaiveDate,
    /// 0..=10
    pub score: f64,
    /// 0..=100
    pub quality: f64,
    pub engagement_level: EngagementLevel,
    #[serde(default)]
    pub collaborator_ids: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Mentor,
    Admin,
}

impl Role {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Self::Student),
            "mentor" => Some(Self::Mentor),
            "admin" => Some(Self::Admin),
            _ => None,
        }
    }
}

/// Directory entry for a student, joined onto activity to build summaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    pub student_id: String,
    pub display_name: String,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentSummary {
    pub student_id: String,
    pub display_name: String,
    pub email: String,
    pub aggregate_score: f64,
    pub role: Role,
    pub activity_count: usize,
    pub last_active: Option<NaiveDate>,
}

/// Score band used by `EngagementIndex::categorize`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EngagementBand {
    Low,
    Medium,
    High,
}

impl EngagementBand {
    pub const LOW_CEILING: f64 = 5.0;
    pub const HIGH_FLOOR: f64 = 15.0;

    pub fn for_score(score: f64) -> Self {
        if score < Self::LOW_CEILING {
            Self::Low
        } else if score < Self::HIGH_FLOOR {
            Self::Medium
        } else {
            Self::High
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TrendDirection {
    Rising,
    Steady,
    Falling,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentTrend {
    pub student_id: String,
    pub weighted_engagement: f64,
    pub weekly_slope: f64,
    pub direction: TrendDirection,
    pub activity_count: usize,
}
