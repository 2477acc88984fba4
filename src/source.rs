use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use serde::Deserialize;

use crate::error::{AnalyticsError, Result};
use crate::models::{ActivityRecord, EngagementLevel, Role, StudentProfile};

pub const MAX_ACTIVITY_SCORE: f64 = 10.0;
pub const MAX_QUALITY: f64 = 100.0;

#[derive(Deserialize)]
struct ActivityRow {
    student_id: String,
    activity_type: String,
    occurred_at: NaiveDate,
    score: f64,
    quality: f64,
    engagement_level: String,
    collaborators: Option<String>,
}

#[derive(Deserialize)]
struct ProfileRow {
    student_id: String,
    display_name: String,
    email: String,
    role: String,
}

pub fn load_activities(path: &Path) -> Result<Vec<ActivityRecord>> {
    read_activities(csv::Reader::from_path(path)?)
}

pub fn load_profiles(path: &Path) -> Result<Vec<StudentProfile>> {
    read_profiles(csv::Reader::from_path(path)?)
}

pub fn read_activities<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<ActivityRecord>> {
    let mut records = Vec::new();
    for (i, result) in reader.deserialize::<ActivityRow>().enumerate() {
        let row = result?;
        let line = i + 2;
        records.push(validate_activity(row, line)?);
    }
    Ok(records)
}

pub fn read_profiles<R: Read>(mut reader: csv::Reader<R>) -> Result<Vec<StudentProfile>> {
    let mut profiles = Vec::new();
    for (i, result) in reader.deserialize::<ProfileRow>().enumerate() {
        let row = result?;
        let line = i + 2;
        let role = Role::parse(&row.role).ok_or_else(|| {
            AnalyticsError::Source(format!("line {line}: unknown role {:?}", row.role))
        })?;
        profiles.push(StudentProfile {
            student_id: row.student_id.trim().to_string(),
            display_name: row.display_name.trim().to_string(),
            email: row.email.trim().to_string(),
            role,
        });
    }
    Ok(profiles)
}

fn validate_activity(row: ActivityRow, line: usize) -> Result<ActivityRecord> {
    if !(0.0..=MAX_ACTIVITY_SCORE).contains(&row.score) {
        return Err(AnalyticsError::validation(format!(
            "line {line}: score {} outside [0, {MAX_ACTIVITY_SCORE}]",
            row.score
        )));
    }
    if !(0.0..=MAX_QUALITY).contains(&row.quality) {
        return Err(AnalyticsError::validation(format!(
            "line {line}: quality {} outside [0, {MAX_QUALITY}]",
            row.quality
        )));
    }
    let engagement_level = EngagementLevel::parse(&row.engagement_level).ok_or_else(|| {
        AnalyticsError::Source(format!(
            "line {line}: unknown engagement level {:?}",
            row.engagement_level
        ))
    })?;

    let collaborator_ids = row
        .collaborators
        .unwrap_or_default()
        .split(';')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    Ok(ActivityRecord {
        student_id: row.student_id.trim().to_string(),
        activity_type: row.activity_type.trim().to_string(),
        occurred_at: row.occurred_at,
        score: row.score,
        quality: row.quality,
        engagement_level,
        collaborator_ids,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    const ACTIVITIES: &str = "\
student_id,activity_type,occurred_at,score,quality,engagement_level,collaborators
S1,quiz,2026-02-02,8.5,90,high,S2; S3
S2,lab,2026-02-03,6,70,Medium,
";

    #[test]
    fn reads_activity_rows() {
        let records = read_activities(csv::Reader::from_reader(ACTIVITIES.as_bytes())).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].collaborator_ids, vec!["S2", "S3"]);
        assert_eq!(records[0].engagement_level, EngagementLevel::High);
        assert!(records[1].collaborator_ids.is_empty());
        assert_eq!(
            records[1].occurred_at,
            NaiveDate::from_ymd_opt(2026, 2, 3).unwrap()
        );
    }

    #[test]
    fn stale_rows_fall_outside_the_window() {
        let raw = format!("{ACTIVITIES}S3,forum,2020-01-01,7,80,low,\n");
        let records = read_activities(csv::Reader::from_reader(raw.as_bytes())).unwrap();
        assert_eq!(records.len(), 3);

        let as_of = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        let kept = crate::trend::within_window(records, as_of, 90);
        let ids: Vec<&str> = kept.iter().map(|r| r.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S1", "S2"]);
    }

    #[test]
    fn rejects_out_of_range_rows() {
        let raw = "\
student_id,activity_type,occurred_at,score,quality,engagement_level,collaborators
S1,quiz,2026-02-02,11,90,high,
";
        let err = read_activities(csv::Reader::from_reader(raw.as_bytes())).unwrap_err();
        assert!(matches!(err, AnalyticsError::Validation(ref m) if m.contains("line 2")));

        let raw = "\
student_id,activity_type,occurred_at,score,quality,engagement_level,collaborators
S1,quiz,2026-02-02,5,90,extreme,
";
        assert!(matches!(
            read_activities(csv::Reader::from_reader(raw.as_bytes())),
            Err(AnalyticsError::Source(_))
        ));
    }

    #[test]
    fn loads_profiles_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            "student_id,display_name,email,role\nS1,Avery Lee,avery.lee@groupscholar.com,student\nM1,Jules Moreno,jules@groupscholar.com,mentor\n"
        )
        .unwrap();
        let profiles = load_profiles(file.path()).unwrap();
        assert_eq!(profiles.len(), 2);
        assert_eq!(profiles[1].role, Role::Mentor);
        assert_eq!(profiles[0].display_name, "Avery Lee");
    }
}
