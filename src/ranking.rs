use serde::Serialize;

use crate::models::{Role, StudentSummary};
use crate::telemetry::{self, SharedTelemetry, TelemetryEvent};

pub const DEFAULT_TOP_PERFORMER_FRACTION: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedStudent {
    pub summary: StudentSummary,
    /// 1-based.
    pub rank: usize,
    pub percentile: u32,
    pub is_top_performer: bool,
}

pub struct RankingEngine {
    top_performer_fraction: f64,
    telemetry: SharedTelemetry,
}

impl Default for RankingEngine {
    fn default() -> Self {
        Self::new(DEFAULT_TOP_PERFORMER_FRACTION, telemetry::noop())
    }
}

impl RankingEngine {
    pub fn new(top_performer_fraction: f64, telemetry: SharedTelemetry) -> Self {
        Self {
            top_performer_fraction: top_performer_fraction.clamp(0.0, 1.0),
            telemetry,
        }
    }

    /// Ranks students with a positive score, highest first. Ties keep the
    /// order they had in `records`.
    pub fn rank(&self, records: &[StudentSummary]) -> Vec<RankedStudent> {
        let eligible: Vec<&StudentSummary> = records
            .iter()
            .filter(|r| r.role == Role::Student && r.aggregate_score > 0.0)
            .collect();
        let filtered_out = records.len() - eligible.len();

        let sorted = merge_sort_desc(eligible);
        let total = sorted.len();
        let top_cutoff = (total as f64 * self.top_performer_fraction).ceil() as usize;

        let ranked: Vec<RankedStudent> = sorted
            .into_iter()
            .enumerate()
            .map(|(i, summary)| {
                let rank = i + 1;
                RankedStudent {
                    summary: summary.clone(),
                    rank,
                    percentile: percentile_for(rank, total),
                    is_top_performer: rank <= top_cutoff,
                }
            })
            .collect();

        self.telemetry.record(&TelemetryEvent::RankingComputed {
            ranked: ranked.len(),
            filtered_out,
        });
        ranked
    }
}

pub fn percentile_for(rank: usize, total: usize) -> u32 {
    if total == 0 {
        return 0;
    }
    (((total - rank + 1) as f64 / total as f64) * 100.0).round() as u32
}

fn merge_sort_desc(items: Vec<&StudentSummary>) -> Vec<&StudentSummary> {
    if items.len() <= 1 {
        return items;
    }
    let mut left = items;
    let right = left.split_off(left.len() / 2);
    merge_desc(merge_sort_desc(left), merge_sort_desc(right))
}

fn merge_desc<'a>(
    left: Vec<&'a StudentSummary>,
    right: Vec<&'a StudentSummary>,
) -> Vec<&'a StudentSummary> {
    let mut merged = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        // Left wins ties so equal scores keep their input order.
        let take_left = match (left.peek(), right.peek()) {
            (Some(l), Some(r)) => l.aggregate_score >= r.aggregate_score,
            _ => break,
        };
        if take_left {
            merged.extend(left.next());
        } else {
            merged.extend(right.next());
        }
    }
    merged.extend(left);
    merged.extend(right);
    merged
}
