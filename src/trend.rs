use std::collections::HashMap;

use chrono::{Duration, NaiveDate};

use crate::models::{ActivityRecord, StudentTrend, TrendDirection};

/// Weekly slope magnitude below which a student counts as steady.
pub const STEADY_SLOPE: f64 = 0.25;

/// Engagement contributed by one activity before recency weighting.
pub fn activity_weight(record: &ActivityRecord) -> f64 {
    record.score * (record.quality / 100.0)
}

pub fn recency_weight(days_ago: i64) -> f64 {
    match days_ago {
        i64::MIN..=7 => 1.0,
        8..=30 => 0.7,
        31..=60 => 0.4,
        _ => 0.2,
    }
}

pub fn cutoff_date(as_of: NaiveDate, since_days: i64) -> NaiveDate {
    Duration::try_days(since_days.max(1))
        .and_then(|span| as_of.checked_sub_signed(span))
        .unwrap_or(NaiveDate::MIN)
}

/// Keeps activity on or after the cutoff, matching the Postgres source.
pub fn within_window(
    records: Vec<ActivityRecord>,
    as_of: NaiveDate,
    since_days: i64,
) -> Vec<ActivityRecord> {
    let cutoff = cutoff_date(as_of, since_days);
    records
        .into_iter()
        .filter(|record| record.occurred_at >= cutoff)
        .collect()
}

/// Recency-weighted engagement and a least-squares weekly slope per
/// student, for activity inside the window. Strongest engagement first.
pub fn score_trends(records: &[ActivityRecord], as_of: NaiveDate, since_days: i64) -> Vec<StudentTrend> {
    let cutoff = cutoff_date(as_of, since_days);
    let in_window: Vec<(&ActivityRecord, i64)> = records
        .iter()
        .filter(|record| record.occurred_at >= cutoff && record.occurred_at <= as_of)
        .map(|record| (record, (as_of - record.occurred_at).num_days()))
        .collect();
    // Buckets span the oldest activity seen, never more than the window.
    let oldest = in_window.iter().map(|(_, days_ago)| *days_ago).max().unwrap_or(0);
    let window_weeks = since_days.max(1).saturating_add(6) / 7;
    let weeks = (oldest / 7 + 1).min(window_weeks).max(1) as usize;

    struct Accumulator {
        weighted: f64,
        count: usize,
        weekly: Vec<f64>,
        first_seen: usize,
    }

    let mut by_student: HashMap<&str, Accumulator> = HashMap::new();
    for (record, days_ago) in in_window {
        let first_seen = by_student.len();
        let entry = by_student
            .entry(record.student_id.as_str())
            .or_insert_with(|| Accumulator {
                weighted: 0.0,
                count: 0,
                weekly: vec![0.0; weeks],
                first_seen,
            });

        let base = activity_weight(record);
        entry.weighted += base * recency_weight(days_ago);
        entry.count += 1;
        // weekly[0] is the oldest week, weekly[weeks - 1] the current one.
        let week_back = (days_ago as usize / 7).min(weeks - 1);
        entry.weekly[weeks - 1 - week_back] += base;
    }

    let mut accumulated: Vec<(&str, Accumulator)> = by_student.into_iter().collect();
    accumulated.sort_by_key(|(_, acc)| acc.first_seen);

    let mut trends: Vec<StudentTrend> = accumulated
        .into_iter()
        .map(|(student_id, acc)| {
            let slope = least_squares_slope(&acc.weekly);
            StudentTrend {
                student_id: student_id.to_string(),
                weighted_engagement: acc.weighted,
                weekly_slope: slope,
                direction: direction_for(slope),
                activity_count: acc.count,
            }
        })
        .collect();
    trends.sort_by(|a, b| {
        b.weighted_engagement
            .partial_cmp(&a.weighted_engagement)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    trends
}

pub fn direction_for(slope: f64) -> TrendDirection {
    if slope > STEADY_SLOPE {
        TrendDirection::Rising
    } else if slope < -STEADY_SLOPE {
        TrendDirection::Falling
    } else {
        TrendDirection::Steady
    }
}

fn least_squares_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean_x = (n - 1) as f64 / 2.0;
    let mean_y = values.iter().sum::<f64>() / n as f64;
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - mean_x;
        numerator += dx * (y - mean_y);
        denominator += dx * dx;
    }
    numerator / denominator
}
