use anyhow::Context;
use chrono::NaiveDate;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use groupscholar_engagement_analytics::models::{
    ActivityRecord, EngagementLevel, Role, StudentProfile,
};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

async fn upsert_student(
    pool: &PgPool,
    profile: &StudentProfile,
    cohort: &str,
) -> anyhow::Result<Uuid> {
    let role = match profile.role {
        Role::Student => "student",
        Role::Mentor => "mentor",
        Role::Admin => "admin",
    };
    let id: Uuid = sqlx::query(
        r#"
        INSERT INTO cohort_engagement.students (id, student_key, full_name, email, role, cohort)
        VALUES ($1, $2, $3, $4, $5, $6)
        ON CONFLICT (student_key) DO UPDATE
        SET full_name = EXCLUDED.full_name, email = EXCLUDED.email,
            role = EXCLUDED.role, cohort = EXCLUDED.cohort
        RETURNING id
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(&profile.student_id)
    .bind(&profile.display_name)
    .bind(&profile.email)
    .bind(role)
    .bind(cohort)
    .fetch_one(pool)
    .await?
    .get("id");
    Ok(id)
}

async fn insert_activity(
    pool: &PgPool,
    record: &ActivityRecord,
    source_key: &str,
) -> anyhow::Result<bool> {
    let student_id: Option<Uuid> = sqlx::query(
        "SELECT id FROM cohort_engagement.students WHERE student_key = $1",
    )
    .bind(&record.student_id)
    .fetch_optional(pool)
    .await?
    .map(|row| row.get("id"));
    let student_id = student_id
        .with_context(|| format!("activity for unknown student {}", record.student_id))?;

    let result = sqlx::query(
        r#"
        INSERT INTO cohort_engagement.activities
        (id, student_id, activity_type, occurred_at, score, quality,
         engagement_level, collaborators, source_key)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        ON CONFLICT (source_key) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(student_id)
    .bind(&record.activity_type)
    .bind(record.occurred_at)
    .bind(record.score)
    .bind(record.quality)
    .bind(record.engagement_level.as_str())
    .bind(&record.collaborator_ids)
    .bind(source_key)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub async fn seed(pool: &PgPool) -> anyhow::Result<()> {
    let students = vec![
        ("S1", "Avery Lee", "avery.lee@groupscholar.com", Role::Student, "2026"),
        ("S2", "Jules Moreno", "jules.moreno@groupscholar.com", Role::Student, "2025"),
        ("S3", "Kiara Patel", "kiara.patel@groupscholar.com", Role::Student, "2026"),
        ("M1", "Morgan Hale", "morgan.hale@groupscholar.com", Role::Mentor, "2026"),
    ];

    for (key, name, email, role, cohort) in students {
        let profile = StudentProfile {
            student_id: key.to_string(),
            display_name: name.to_string(),
            email: email.to_string(),
            role,
        };
        upsert_student(pool, &profile, cohort).await?;
    }

    let activities = vec![
        ("seed-001", "S1", "quiz", 8.5, 90.0, EngagementLevel::High, vec!["S3"], (2026, 2, 2)),
        ("seed-002", "S2", "forum", 4.0, 60.0, EngagementLevel::Medium, vec![], (2026, 1, 30)),
        ("seed-003", "S3", "lab", 7.0, 85.0, EngagementLevel::High, vec!["S1"], (2026, 1, 28)),
        ("seed-004", "M1", "office_hours", 9.0, 95.0, EngagementLevel::High, vec!["S2"], (2026, 2, 3)),
    ];

    for (source_key, student, kind, score, quality, level, collaborators, (y, m, d)) in activities {
        let record = ActivityRecord {
            student_id: student.to_string(),
            activity_type: kind.to_string(),
            occurred_at: NaiveDate::from_ymd_opt(y, m, d).context("invalid date")?,
            score,
            quality,
            engagement_level: level,
            collaborator_ids: collaborators.into_iter().map(str::to_string).collect(),
        };
        insert_activity(pool, &record, source_key).await?;
    }

    Ok(())
}

/// Loads a profile CSV and an activity CSV into the store. Returns the number
/// of new activities.
pub async fn import_csv(
    pool: &PgPool,
    profiles: &[StudentProfile],
    activities: &[ActivityRecord],
    cohort: &str,
) -> anyhow::Result<usize> {
    for profile in profiles {
        upsert_student(pool, profile, cohort).await?;
    }

    let mut inserted = 0usize;
    for record in activities {
        let source_key = format!(
            "import-{}-{}-{}-{}",
            record.student_id,
            record.activity_type,
            record.occurred_at,
            Uuid::new_v4()
        );
        if insert_activity(pool, record, &source_key).await? {
            inserted += 1;
        }
    }
    Ok(inserted)
}

pub async fn fetch_profiles(
    pool: &PgPool,
    cohort: Option<&str>,
) -> anyhow::Result<Vec<StudentProfile>> {
    let mut query = String::from(
        "SELECT student_key, full_name, email, role FROM cohort_engagement.students",
    );
    if cohort.is_some() {
        query.push_str(" WHERE cohort = $1");
    }
    query.push_str(" ORDER BY student_key");

    let mut rows = sqlx::query(&query);
    if let Some(value) = cohort {
        rows = rows.bind(value);
    }

    let mut profiles = Vec::new();
    for row in rows.fetch_all(pool).await? {
        let role: String = row.get("role");
        profiles.push(StudentProfile {
            student_id: row.get("student_key"),
            display_name: row.get("full_name"),
            email: row.get("email"),
            role: Role::parse(&role).with_context(|| format!("unknown role {role}"))?,
        });
    }
    Ok(profiles)
}

pub async fn fetch_activities(
    pool: &PgPool,
    since_date: NaiveDate,
    cohort: Option<&str>,
) -> anyhow::Result<Vec<ActivityRecord>> {
    let mut query = String::from(
        "SELECT st.student_key, a.activity_type, a.occurred_at, a.score, a.quality, \
         a.engagement_level, a.collaborators \
         FROM cohort_engagement.activities a \
         JOIN cohort_engagement.students st ON st.id = a.student_id \
         WHERE a.occurred_at >= $1",
    );
    if cohort.is_some() {
        query.push_str(" AND st.cohort = $2");
    }
    query.push_str(" ORDER BY a.occurred_at, a.id");

    let mut rows = sqlx::query(&query).bind(since_date);
    if let Some(value) = cohort {
        rows = rows.bind(value);
    }

    let mut records = Vec::new();
    for row in rows.fetch_all(pool).await? {
        let level: String = row.get("engagement_level");
        records.push(ActivityRecord {
            student_id: row.get("student_key"),
            activity_type: row.get("activity_type"),
            occurred_at: row.get("occurred_at"),
            score: row.get("score"),
            quality: row.get("quality"),
            engagement_level: EngagementLevel::parse(&level)
                .with_context(|| format!("unknown engagement level {level}"))?,
            collaborator_ids: row.get("collaborators"),
        });
    }
    Ok(records)
}
