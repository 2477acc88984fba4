use std::collections::HashMap;

use chrono::NaiveDate;

use crate::engagement_index::MAX_SCORE;
use crate::models::{ActivityRecord, Role, StudentProfile, StudentSummary};
use crate::trend::{activity_weight, recency_weight};

/// Builds one summary per student: every profile in directory order, then
/// students that only appear in activity, in first-seen order. The
/// aggregate score is the recency-weighted, quality-adjusted activity score
/// clamped to the engagement index range.
pub fn summarize(
    records: &[ActivityRecord],
    profiles: &[StudentProfile],
    as_of: NaiveDate,
) -> Vec<StudentSummary> {
    let mut totals: HashMap<&str, (f64, usize, Option<NaiveDate>)> = HashMap::new();
    let mut unlisted: Vec<&str> = Vec::new();
    let listed: HashMap<&str, &StudentProfile> = profiles
        .iter()
        .map(|p| (p.student_id.as_str(), p))
        .collect();

    for record in records {
        let days_ago = (as_of - record.occurred_at).num_days();
        let entry = totals.entry(record.student_id.as_str()).or_insert_with(|| {
            if !listed.contains_key(record.student_id.as_str()) {
                unlisted.push(record.student_id.as_str());
            }
            (0.0, 0, None)
        });
        entry.0 += activity_weight(record) * recency_weight(days_ago);
        entry.1 += 1;
        entry.2 = entry.2.max(Some(record.occurred_at));
    }

    let summary_for = |student_id: &str, display_name: &str, email: &str, role: Role| {
        let (score, activity_count, last_active) =
            totals.get(student_id).copied().unwrap_or((0.0, 0, None));
        StudentSummary {
            student_id: student_id.to_string(),
            display_name: display_name.to_string(),
            email: email.to_string(),
            aggregate_score: score.clamp(0.0, MAX_SCORE),
            role,
            activity_count,
            last_active,
        }
    };

    let mut summaries: Vec<StudentSummary> = profiles
        .iter()
        .map(|p| {
            summary_for(
                p.student_id.as_str(),
                p.display_name.as_str(),
                p.email.as_str(),
                p.role,
            )
        })
        .collect();
    summaries.extend(
        unlisted
            .into_iter()
            .map(|id| summary_for(id, id, "", Role::Student)),
    );
    summaries
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::EngagementLevel;

    fn as_of() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 1).unwrap()
    }

    fn activity(student: &str, days_ago: i64, score: f64, quality: f64) -> ActivityRecord {
        ActivityRecord {
            student_id: student.to_string(),
            activity_type: "lab".to_string(),
            occurred_at: as_of() - Duration::days(days_ago),
            score,
            quality,
            engagement_level: EngagementLevel::Medium,
            collaborator_ids: Vec::new(),
        }
    }

    fn profile(id: &str, name: &str, role: Role) -> StudentProfile {
        StudentProfile {
            student_id: id.to_string(),
            display_name: name.to_string(),
            email: format!("{}@groupscholar.com", id.to_lowercase()),
            role,
        }
    }

    #[test]
    fn joins_profiles_and_activity() {
        let records = vec![
            activity("S1", 1, 10.0, 100.0),
            activity("S1", 20, 5.0, 80.0),
            activity("S9", 2, 4.0, 50.0),
        ];
        let profiles = vec![
            profile("S1", "Avery Lee", Role::Student),
            profile("M1", "Jules Moreno", Role::Mentor),
        ];
        let summaries = summarize(&records, &profiles, as_of());

        assert_eq!(summaries.len(), 3);
        let avery = &summaries[0];
        assert_eq!(avery.display_name, "Avery Lee");
        assert!((avery.aggregate_score - (10.0 + 4.0 * 0.7)).abs() < 1e-9);
        assert_eq!(avery.activity_count, 2);
        assert_eq!(avery.last_active, Some(as_of() - Duration::days(1)));

        assert_eq!(summaries[1].aggregate_score, 0.0);
        assert_eq!(summaries[1].role, Role::Mentor);

        assert_eq!(summaries[2].student_id, "S9");
        assert_eq!(summaries[2].display_name, "S9");
        assert!((summaries[2].aggregate_score - 2.0).abs() < 1e-9);
    }

    #[test]
    fn scores_are_clamped() {
        let records: Vec<ActivityRecord> = (0..20).map(|_| activity("S1", 0, 10.0, 100.0)).collect();
        let summaries = summarize(&records, &[], as_of());
        assert_eq!(summaries[0].aggregate_score, MAX_SCORE);
    }
}
