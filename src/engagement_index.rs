//! Arena-backed binary tree ordered by engagement score. Never rebalanced,
//! so monotonic input degrades it to a list.

use std::cmp::Ordering;
use std::collections::HashMap;

use serde::Serialize;

use crate::error::{AnalyticsError, Result};
use crate::models::EngagementBand;
use crate::telemetry::{self, SharedTelemetry, TelemetryEvent};

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 100.0;

#[derive(Debug, Clone)]
pub struct IndexNode<P> {
    pub student_id: String,
    pub score: f64,
    pub payload: P,
    left: Option<usize>,
    right: Option<usize>,
    subtree_size: usize,
    seq: usize,
}

impl<P> IndexNode<P> {
    pub fn sequence(&self) -> usize {
        self.seq
    }
}

#[derive(Debug)]
pub struct Categories<'a, P> {
    pub low: Vec<&'a IndexNode<P>>,
    pub medium: Vec<&'a IndexNode<P>>,
    pub high: Vec<&'a IndexNode<P>>,
}

impl<'a, P> Categories<'a, P> {
    pub fn total(&self) -> usize {
        self.low.len() + self.medium.len() + self.high.len()
    }

    pub fn band(&self, band: EngagementBand) -> &[&'a IndexNode<P>] {
        match band {
            EngagementBand::Low => &self.low,
            EngagementBand::Medium => &self.medium,
            EngagementBand::High => &self.high,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BandDistribution {
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndexStats {
    pub count: usize,
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
    pub distribution: BandDistribution,
}

pub struct EngagementIndex<P> {
    nodes: Vec<IndexNode<P>>,
    root: Option<usize>,
    by_id: HashMap<String, usize>,
    telemetry: SharedTelemetry,
}

impl<P> Default for EngagementIndex<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EngagementIndex<P> {
    pub fn new() -> Self {
        Self::with_telemetry(telemetry::noop())
    }

    pub fn with_telemetry(telemetry: SharedTelemetry) -> Self {
        Self {
            nodes: Vec::new(),
            root: None,
            by_id: HashMap::new(),
            telemetry,
        }
    }

    /// Builds an index from `(id, score, payload)` triples in the given
    /// order. Every score is validated before anything is inserted.
    pub fn build<I>(entries: I, telemetry: SharedTelemetry) -> Result<Self>
    where
        I: IntoIterator<Item = (String, f64, P)>,
    {
        let entries: Vec<(String, f64, P)> = entries.into_iter().collect();
        for (student_id, score, _) in entries.iter() {
            validate_score(student_id, *score)?;
        }

        let mut index = Self::with_telemetry(telemetry);
        index.nodes.reserve(entries.len());
        for (student_id, score, payload) in entries {
            index.insert(student_id, score, payload)?;
        }
        index.telemetry.record(&TelemetryEvent::IndexBuilt {
            records: index.len(),
            depth: index.depth(),
        });
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Inserts a node; equal scores go to the right so in-order traversal
    /// keeps insertion order among ties.
    pub fn insert(&mut self, student_id: impl Into<String>, score: f64, payload: P) -> Result<()> {
        let student_id = student_id.into();
        validate_score(&student_id, score)?;

        let new_index = self.nodes.len();
        let mut parent = None;
        let mut current = self.root;
        while let Some(i) = current {
            let node = &mut self.nodes[i];
            node.subtree_size += 1;
            parent = Some(i);
            current = if score < node.score {
                node.left
            } else {
                node.right
            };
        }

        match parent {
            None => self.root = Some(new_index),
            Some(p) => {
                let node = &mut self.nodes[p];
                if score < node.score {
                    node.left = Some(new_index);
                } else {
                    node.right = Some(new_index);
                }
            }
        }

        self.by_id.entry(student_id.clone()).or_insert(new_index);
        self.nodes.push(IndexNode {
            student_id,
            score,
            payload,
            left: None,
            right: None,
            subtree_size: 1,
            seq: new_index,
        });
        Ok(())
    }

    pub fn in_order(&self) -> Vec<&IndexNode<P>> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack = Vec::new();
        let mut current = self.root;
        loop {
            while let Some(i) = current {
                stack.push(i);
                current = self.nodes[i].left;
            }
            let Some(i) = stack.pop() else { break };
            out.push(&self.nodes[i]);
            current = self.nodes[i].right;
        }
        out
    }

    pub fn categorize(&self) -> Categories<'_, P> {
        let mut categories = Categories {
            low: Vec::new(),
            medium: Vec::new(),
            high: Vec::new(),
        };
        for node in self.in_order() {
            match EngagementBand::for_score(node.score) {
                EngagementBand::Low => categories.low.push(node),
                EngagementBand::Medium => categories.medium.push(node),
                EngagementBand::High => categories.high.push(node),
            }
        }
        debug_assert_eq!(categories.total(), self.len());
        categories
    }

    pub fn range(&self, min: f64, max: f64) -> Vec<&IndexNode<P>> {
        let mut out = Vec::new();
        if min > max {
            return out;
        }
        let mut stack = Vec::new();
        let mut current = self.root;
        loop {
            while let Some(i) = current {
                let node = &self.nodes[i];
                stack.push(i);
                // Left subtree is strictly below this node's score.
                current = if node.score > min { node.left } else { None };
            }
            let Some(i) = stack.pop() else { break };
            let node = &self.nodes[i];
            if node.score >= min && node.score <= max {
                out.push(node);
            }
            current = if node.score <= max { node.right } else { None };
        }
        out
    }

    /// Number of stored scores strictly below `score`.
    pub fn rank(&self, score: f64) -> usize {
        let mut count = 0;
        let mut current = self.root;
        while let Some(i) = current {
            let node = &self.nodes[i];
            if node.score < score {
                count += self.size_of(node.left) + 1;
                current = node.right;
            } else {
                current = node.left;
            }
        }
        count
    }

    /// Rank of a stored record: strictly lower scores plus equal scores
    /// inserted before it.
    pub fn position_of(&self, student_id: &str) -> Option<usize> {
        let target = self.by_id.get(student_id).copied()?;
        let key = (self.nodes[target].score, self.nodes[target].seq);
        let mut count = 0;
        let mut current = self.root;
        while let Some(i) = current {
            let node = &self.nodes[i];
            match compare_keys((node.score, node.seq), key) {
                Ordering::Less => {
                    count += self.size_of(node.left) + 1;
                    current = node.right;
                }
                Ordering::Equal => return Some(count + self.size_of(node.left)),
                Ordering::Greater => current = node.left,
            }
        }
        None
    }

    pub fn percentile(&self, score: f64) -> u32 {
        let size = self.len();
        if size == 0 {
            return 0;
        }
        let rank = self.rank(score);
        (((size - rank) as f64 / size as f64) * 100.0).round() as u32
    }

    pub fn top_n(&self, n: usize) -> Vec<&IndexNode<P>> {
        let mut nodes = self.in_order();
        nodes.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        nodes.truncate(n);
        nodes
    }

    pub fn bottom_n(&self, n: usize) -> Vec<&IndexNode<P>> {
        let mut nodes = self.in_order();
        nodes.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal));
        nodes.truncate(n);
        nodes
    }

    pub fn stats(&self) -> IndexStats {
        let ordered = self.in_order();
        if ordered.is_empty() {
            return IndexStats::default();
        }

        let mut distribution = BandDistribution::default();
        let mut total = 0.0;
        for node in ordered.iter() {
            total += node.score;
            match EngagementBand::for_score(node.score) {
                EngagementBand::Low => distribution.low += 1,
                EngagementBand::Medium => distribution.medium += 1,
                EngagementBand::High => distribution.high += 1,
            }
        }

        let count = ordered.len();
        let mid = count / 2;
        let median = if count % 2 == 0 {
            (ordered[mid - 1].score + ordered[mid].score) / 2.0
        } else {
            ordered[mid].score
        };

        IndexStats {
            count,
            mean: total / count as f64,
            median,
            min: ordered[0].score,
            max: ordered[count - 1].score,
            distribution,
        }
    }

    /// Searches both subtrees, since the tree is ordered by score rather
    /// than by id. O(n).
    pub fn find_student(&self, student_id: &str) -> Option<&IndexNode<P>> {
        let mut stack: Vec<usize> = self.root.into_iter().collect();
        let mut best: Option<&IndexNode<P>> = None;
        while let Some(i) = stack.pop() {
            let node = &self.nodes[i];
            if node.student_id == student_id && best.map_or(true, |b| node.seq < b.seq) {
                best = Some(node);
            }
            stack.extend(node.left);
            stack.extend(node.right);
        }
        best
    }

    pub fn lookup(&self, student_id: &str) -> Option<&IndexNode<P>> {
        self.by_id.get(student_id).map(|&i| &self.nodes[i])
    }

    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack: Vec<(usize, usize)> = self.root.map(|r| (r, 1)).into_iter().collect();
        while let Some((i, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            let node = &self.nodes[i];
            if let Some(left) = node.left {
                stack.push((left, depth + 1));
            }
            if let Some(right) = node.right {
                stack.push((right, depth + 1));
            }
        }
        deepest
    }

    fn size_of(&self, node: Option<usize>) -> usize {
        node.map_or(0, |i| self.nodes[i].subtree_size)
    }
}

fn compare_keys(a: (f64, usize), b: (f64, usize)) -> Ordering {
    a.0.partial_cmp(&b.0)
        .unwrap_or(Ordering::Equal)
        .then(a.1.cmp(&b.1))
}

fn validate_score(student_id: &str, score: f64) -> Result<()> {
    if !score.is_finite() || !(MIN_SCORE..=MAX_SCORE).contains(&score) {
        return Err(AnalyticsError::validation(format!(
            "score {score} for {student_id} outside [{MIN_SCORE}, {MAX_SCORE}]"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn index_of(scores: &[f64]) -> EngagementIndex<()> {
        let mut index = EngagementIndex::new();
        for (i, score) in scores.iter().enumerate() {
            index.insert(format!("S{i}"), *score, ()).unwrap();
        }
        index
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let mut index: EngagementIndex<()> = EngagementIndex::new();
        assert!(matches!(
            index.insert("S1", 100.5, ()),
            Err(AnalyticsError::Validation(_))
        ));
        assert!(index.insert("S1", -1.0, ()).is_err());
        assert!(index.insert("S1", f64::NAN, ()).is_err());
        assert!(index.is_empty());
    }

    #[test]
    fn build_is_all_or_nothing() {
        let entries = vec![
            ("S1".to_string(), 10.0, ()),
            ("S2".to_string(), 140.0, ()),
        ];
        assert!(EngagementIndex::build(entries, telemetry::noop()).is_err());
    }

    #[test]
    fn duplicates_keep_insertion_order() {
        let index = index_of(&[10.0, 10.0, 3.0, 10.0]);
        let ids: Vec<&str> = index.in_order().iter().map(|n| n.student_id.as_str()).collect();
        assert_eq!(ids, vec!["S2", "S0", "S1", "S3"]);
        assert_eq!(index.position_of("S0"), Some(1));
        assert_eq!(index.position_of("S3"), Some(3));
        assert_eq!(index.position_of("missing"), None);
    }

    #[test]
    fn categorize_uses_band_edges() {
        let index = index_of(&[0.0, 4.99, 5.0, 14.99, 15.0, 100.0]);
        let categories = index.categorize();
        assert_eq!(categories.low.len(), 2);
        assert_eq!(categories.medium.len(), 2);
        assert_eq!(categories.high.len(), 2);
        assert_eq!(categories.band(EngagementBand::High)[0].score, 15.0);
    }

    #[test]
    fn rank_and_percentile() {
        let index = index_of(&[20.0, 10.0, 30.0, 10.0]);
        assert_eq!(index.rank(10.0), 0);
        assert_eq!(index.rank(20.0), 2);
        assert_eq!(index.rank(31.0), 4);
        assert_eq!(index.percentile(10.0), 100);
        assert_eq!(index.percentile(30.0), 25);

        let empty: EngagementIndex<()> = EngagementIndex::new();
        assert_eq!(empty.percentile(10.0), 0);
    }

    #[test]
    fn top_and_bottom() {
        let index = index_of(&[12.0, 40.0, 7.0, 40.0, 1.0]);
        let top: Vec<&str> = index.top_n(3).iter().map(|n| n.student_id.as_str()).collect();
        assert_eq!(top, vec!["S1", "S3", "S0"]);
        let bottom: Vec<f64> = index.bottom_n(2).iter().map(|n| n.score).collect();
        assert_eq!(bottom, vec![1.0, 7.0]);
        assert_eq!(index.top_n(50).len(), 5);
    }

    #[test]
    fn range_is_inclusive() {
        let index = index_of(&[12.0, 40.0, 7.0, 15.0, 1.0, 15.0]);
        let scores: Vec<f64> = index.range(7.0, 15.0).iter().map(|n| n.score).collect();
        assert_eq!(scores, vec![7.0, 12.0, 15.0, 15.0]);
        assert!(index.range(50.0, 60.0).is_empty());
        assert!(index.range(20.0, 10.0).is_empty());
    }

    #[test]
    fn stats_cover_empty_and_even_counts() {
        let empty: EngagementIndex<()> = EngagementIndex::new();
        assert_eq!(empty.stats(), IndexStats::default());

        let stats = index_of(&[2.0, 8.0, 20.0, 30.0]).stats();
        assert_eq!(stats.count, 4);
        assert!((stats.mean - 15.0).abs() < 1e-9);
        assert!((stats.median - 14.0).abs() < 1e-9);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.max, 30.0);
        assert_eq!(
            stats.distribution,
            BandDistribution {
                low: 1,
                medium: 1,
                high: 2
            }
        );
    }

    #[test]
    fn monotonic_inserts_degrade_to_a_list() {
        let scores: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let index = index_of(&scores);
        assert_eq!(index.depth(), 50);
        assert_eq!(index.rank(25.0), 25);
    }

    #[test]
    fn find_student_searches_whole_tree() {
        let index = index_of(&[50.0, 10.0, 90.0, 5.0]);
        assert_eq!(index.find_student("S3").map(|n| n.score), Some(5.0));
        assert_eq!(index.lookup("S2").map(|n| n.score), Some(90.0));
        assert!(index.find_student("S9").is_none());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            failure_persistence: None,
            .. ProptestConfig::default()
        })]

        #[test]
        fn prop_in_order_is_sorted(scores in proptest::collection::vec(0.0f64..=100.0, 0..64)) {
            let index = index_of(&scores);
            let ordered: Vec<f64> = index.in_order().iter().map(|n| n.score).collect();
            prop_assert_eq!(ordered.len(), scores.len());
            prop_assert!(ordered.windows(2).all(|w| w[0] <= w[1]));
        }

        #[test]
        fn prop_categorize_is_partition(scores in proptest::collection::vec(0.0f64..=100.0, 0..64)) {
            let index = index_of(&scores);
            let categories = index.categorize();
            prop_assert_eq!(categories.total(), index.len());
            prop_assert!(categories.low.iter().all(|n| n.score < 5.0));
            prop_assert!(categories.medium.iter().all(|n| n.score >= 5.0 && n.score < 15.0));
            prop_assert!(categories.high.iter().all(|n| n.score >= 15.0));
        }

        #[test]
        fn prop_rank_counts_lower_scores(
            scores in proptest::collection::vec(0.0f64..=100.0, 1..64),
            probe in 0.0f64..=100.0,
        ) {
            let index = index_of(&scores);
            let expected = scores.iter().filter(|s| **s < probe).count();
            prop_assert_eq!(index.rank(probe), expected);
        }
    }
}
