use std::fmt::Write;

use crate::analysis::AnalysisBatch;
use crate::models::TrendDirection;

pub fn build_report(batch: &AnalysisBatch, cohort: Option<&str>, since_days: i64) -> String {
    let mut output = String::new();
    let cohort_label = cohort.unwrap_or("all cohorts");
    let stats = batch.stats();

    let _ = writeln!(output, "# Cohort Engagement Report");
    let _ = writeln!(
        output,
        "Generated for {} as of {} ({} students, {} activities)",
        cohort_label,
        batch.as_of(),
        stats.count,
        batch.records().len()
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Engagement Bands");

    if stats.count == 0 {
        let _ = writeln!(output, "No students recorded for this batch.");
    } else {
        let _ = writeln!(
            output,
            "- high: {} / medium: {} / low: {}",
            stats.distribution.high, stats.distribution.medium, stats.distribution.low
        );
        let _ = writeln!(
            output,
            "- mean {:.2}, median {:.2}, range {:.2} to {:.2}",
            stats.mean, stats.median, stats.min, stats.max
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Top Performers");

    let top: Vec<_> = batch
        .ranked_list()
        .iter()
        .filter(|r| r.is_top_performer)
        .collect();
    if top.is_empty() {
        let _ = writeln!(output, "No ranked students in this batch.");
    } else {
        for ranked in top.iter().take(10) {
            let _ = writeln!(
                output,
                "- #{} {} ({}) score {:.2}, percentile {}",
                ranked.rank,
                ranked.summary.display_name,
                ranked.summary.email,
                ranked.summary.aggregate_score,
                ranked.percentile
            );
        }
    }

    let trends = batch.trends(since_days);
    let _ = writeln!(output);
    let _ = writeln!(output, "## Momentum (last {since_days} days)");

    let falling: Vec<_> = trends
        .iter()
        .filter(|t| t.direction == TrendDirection::Falling)
        .collect();
    let rising = trends
        .iter()
        .filter(|t| t.direction == TrendDirection::Rising)
        .count();
    if trends.is_empty() {
        let _ = writeln!(output, "No activity recorded for this window.");
    } else {
        let _ = writeln!(
            output,
            "- {} rising, {} falling, {} steady",
            rising,
            falling.len(),
            trends.len() - rising - falling.len()
        );
        for trend in falling.iter().take(5) {
            let _ = writeln!(
                output,
                "- falling: {} slope {:.2} across {} activities",
                trend.student_id, trend.weekly_slope, trend.activity_count
            );
        }
    }

    let communities = batch.communities();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Collaboration Communities");

    if communities.is_empty() {
        let _ = writeln!(output, "No collaboration clusters detected.");
    } else {
        for (i, community) in communities.iter().enumerate() {
            let _ = writeln!(
                output,
                "- community {}: {} ({} internal links)",
                i + 1,
                community.members.join(", "),
                community.internal_edges
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Influential");

    let centrality = batch.centrality();
    let influential: Vec<_> = centrality.iter().filter(|c| c.influence > 0.0).take(5).collect();
    if influential.is_empty() {
        let _ = writeln!(output, "No collaboration recorded.");
    } else {
        for node in influential {
            let _ = writeln!(
                output,
                "- {} influence {:.2} (degree {:.2}, reach {:.2})",
                node.student_id, node.influence, node.degree, node.closeness
            );
        }
    }

    output
}
