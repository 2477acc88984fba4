//! Undirected collaboration graph. Edge weights count shared activities and
//! are stored on both endpoints.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::error::{AnalyticsError, Result};
use crate::models::ActivityRecord;
use crate::telemetry::{self, SharedTelemetry, TelemetryEvent};

pub const DEGREE_WEIGHT: f64 = 0.6;
pub const CLOSENESS_WEIGHT: f64 = 0.4;
/// Contribution of a node two hops away relative to a direct neighbor.
const TWO_HOP_DISCOUNT: f64 = 0.5;

#[derive(Debug, Clone, Default)]
pub struct GraphNode {
    pub neighbors: BTreeMap<String, u32>,
    activity: HashMap<usize, u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeCentrality {
    pub student_id: String,
    pub degree: f64,
    pub closeness: f64,
    pub influence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Community {
    pub members: Vec<String>,
    pub internal_edges: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecommendWeights {
    pub collaborative: f64,
    pub content: f64,
}

impl Default for RecommendWeights {
    fn default() -> Self {
        Self {
            collaborative: 0.7,
            content: 0.3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub category: String,
    pub score: f64,
    pub collaborative: f64,
    pub content: f64,
}

pub struct CollaborationGraph {
    nodes: BTreeMap<String, GraphNode>,
    categories: Vec<String>,
    category_index: HashMap<String, usize>,
    telemetry: SharedTelemetry,
}

impl Default for CollaborationGraph {
    fn default() -> Self {
        Self::new(telemetry::noop())
    }
}

impl CollaborationGraph {
    pub fn new(telemetry: SharedTelemetry) -> Self {
        Self {
            nodes: BTreeMap::new(),
            categories: Vec::new(),
            category_index: HashMap::new(),
            telemetry,
        }
    }

    /// One node per student, one activity count per record and one edge
    /// increment per listed collaborator. A record naming its own student
    /// as collaborator contributes no edge.
    pub fn from_records(records: &[ActivityRecord], telemetry: SharedTelemetry) -> Self {
        let mut graph = Self::new(telemetry);
        for record in records {
            graph.record_activity(&record.student_id, &record.activity_type);
            for collaborator in record.collaborator_ids.iter() {
                if collaborator != &record.student_id {
                    graph.link(&record.student_id, collaborator);
                }
            }
        }
        graph.telemetry.record(&TelemetryEvent::GraphBuilt {
            nodes: graph.node_count(),
            edges: graph.edge_count(),
        });
        graph
    }

    pub fn add_node(&mut self, student_id: &str) {
        self.nodes.entry(student_id.to_string()).or_default();
    }

    pub fn add_edge(&mut self, a: &str, b: &str) -> Result<u32> {
        if a == b {
            return Err(AnalyticsError::validation(format!(
                "self-edge on {a} is not allowed"
            )));
        }
        Ok(self.link(a, b))
    }

    fn link(&mut self, a: &str, b: &str) -> u32 {
        debug_assert_ne!(a, b);
        self.add_node(a);
        self.add_node(b);

        let mut weight = 0;
        for (from, to) in [(a, b), (b, a)] {
            if let Some(node) = self.nodes.get_mut(from) {
                let entry = node.neighbors.entry(to.to_string()).or_insert(0);
                *entry += 1;
                weight = *entry;
            }
        }
        debug_assert_eq!(self.edge_weight(a, b), self.edge_weight(b, a));
        weight
    }

    pub fn record_activity(&mut self, student_id: &str, category: &str) {
        let next = self.categories.len();
        let idx = *self
            .category_index
            .entry(category.to_string())
            .or_insert(next);
        if idx == next {
            self.categories.push(category.to_string());
        }
        let node = self.nodes.entry(student_id.to_string()).or_default();
        *node.activity.entry(idx).or_insert(0) += 1;
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.values().map(|n| n.neighbors.len()).sum::<usize>() / 2
    }

    pub fn node(&self, student_id: &str) -> Option<&GraphNode> {
        self.nodes.get(student_id)
    }

    pub fn edge_weight(&self, a: &str, b: &str) -> Option<u32> {
        self.nodes.get(a)?.neighbors.get(b).copied()
    }

    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn connected_components(&self) -> Vec<Vec<String>> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut components = Vec::new();

        for start in self.nodes.keys() {
            if !visited.insert(start.as_str()) {
                continue;
            }
            let mut component = Vec::new();
            let mut stack = vec![start.as_str()];
            while let Some(current) = stack.pop() {
                component.push(current.to_string());
                for neighbor in self.neighbor_ids(current) {
                    if visited.insert(neighbor) {
                        stack.push(neighbor);
                    }
                }
            }
            component.sort();
            components.push(component);
        }
        components
    }

    /// Degree centrality plus an approximate closeness from 1- and 2-hop
    /// reach, blended into an influence score. Highest influence first.
    pub fn centrality(&self) -> Vec<NodeCentrality> {
        let others = self.nodes.len().saturating_sub(1);
        let mut out: Vec<NodeCentrality> = self
            .nodes
            .iter()
            .map(|(id, node)| {
                if others == 0 {
                    return NodeCentrality {
                        student_id: id.clone(),
                        degree: 0.0,
                        closeness: 0.0,
                        influence: 0.0,
                    };
                }
                let one_hop = node.neighbors.len();
                let mut two_hop: HashSet<&str> = HashSet::new();
                for neighbor in node.neighbors.keys() {
                    for second in self.neighbor_ids(neighbor) {
                        if second != id.as_str() && !node.neighbors.contains_key(second) {
                            two_hop.insert(second);
                        }
                    }
                }

                let degree = one_hop as f64 / others as f64;
                let closeness =
                    (one_hop as f64 + TWO_HOP_DISCOUNT * two_hop.len() as f64) / others as f64;
                NodeCentrality {
                    student_id: id.clone(),
                    degree,
                    closeness,
                    influence: DEGREE_WEIGHT * degree + CLOSENESS_WEIGHT * closeness,
                }
            })
            .collect();
        out.sort_by(|a, b| b.influence.partial_cmp(&a.influence).unwrap_or(Ordering::Equal));
        out
    }

    /// Greedy local community growth. From each unassigned seed, keep adding
    /// the unassigned neighbor with the best ratio of links into the
    /// community to its own degree while that ratio beats `min_gain`.
    /// Single-node communities are dropped.
    pub fn detect_communities(&self, min_gain: f64) -> Vec<Community> {
        let mut assigned: HashSet<&str> = HashSet::new();
        let mut communities = Vec::new();
        let mut discarded = 0;

        for seed in self.nodes.keys() {
            if !assigned.insert(seed.as_str()) {
                continue;
            }
            let mut members: Vec<&str> = vec![seed.as_str()];
            let mut member_set: HashSet<&str> = HashSet::from([seed.as_str()]);

            loop {
                let candidates: BTreeSet<&str> = members
                    .iter()
                    .flat_map(|m| self.neighbor_ids(m))
                    .filter(|c| !assigned.contains(c))
                    .collect();

                let mut best: Option<(&str, f64)> = None;
                for candidate in candidates {
                    let gain = self.community_gain(candidate, &member_set);
                    if best.map_or(true, |(_, g)| gain > g) {
                        best = Some((candidate, gain));
                    }
                }

                match best {
                    Some((candidate, gain)) if gain > min_gain => {
                        assigned.insert(candidate);
                        member_set.insert(candidate);
                        members.push(candidate);
                    }
                    _ => break,
                }
            }

            if members.len() < 2 {
                discarded += 1;
                continue;
            }
            let internal_edges = members
                .iter()
                .map(|m| {
                    self.neighbor_ids(m)
                        .filter(|n| member_set.contains(n))
                        .count()
                })
                .sum::<usize>()
                / 2;
            let mut members: Vec<String> = members.into_iter().map(str::to_string).collect();
            members.sort();
            communities.push(Community {
                members,
                internal_edges,
            });
        }

        self.telemetry.record(&TelemetryEvent::CommunitiesDetected {
            communities: communities.len(),
            discarded,
        });
        communities
    }

    pub fn activity_vector(&self, student_id: &str) -> Option<Vec<f64>> {
        let node = self.nodes.get(student_id)?;
        let mut vector = vec![0.0; self.categories.len()];
        for (&idx, &count) in node.activity.iter() {
            vector[idx] = count as f64;
        }
        Some(vector)
    }

    /// The `k` students most similar to `student_id` by activity mix, with
    /// their cosine similarity. Only positive similarities are returned.
    pub fn similar_students(&self, student_id: &str, k: usize) -> Vec<(String, f64)> {
        let Some(target) = self.activity_vector(student_id) else {
            return Vec::new();
        };
        let mut peers: Vec<(String, f64)> = self
            .nodes
            .keys()
            .filter(|id| id.as_str() != student_id)
            .filter_map(|id| {
                let vector = self.activity_vector(id)?;
                let similarity = cosine_similarity(&target, &vector);
                (similarity > 0.0).then(|| (id.clone(), similarity))
            })
            .collect();
        peers.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        peers.truncate(k);
        peers
    }

    /// Activity categories to suggest to `student_id`, blending what similar
    /// peers do (collaborative) with categories the student under-uses
    /// relative to the population (content). Ties keep category order.
    pub fn recommend(&self, student_id: &str, k: usize, weights: RecommendWeights) -> Vec<Recommendation> {
        let Some(own) = self.activity_vector(student_id) else {
            return Vec::new();
        };
        let width = self.categories.len();

        let mut collaborative = vec![0.0; width];
        for (peer, similarity) in self.similar_students(student_id, k) {
            if let Some(vector) = self.activity_vector(&peer) {
                for (slot, count) in collaborative.iter_mut().zip(vector.iter()) {
                    *slot += similarity * count;
                }
            }
        }
        normalize_by_max(&mut collaborative);

        let population = self.average_shares();
        let own_shares = shares(&own);
        let mut content: Vec<f64> = population
            .iter()
            .zip(own_shares.iter())
            .map(|(avg, mine)| (avg - mine).max(0.0))
            .collect();
        normalize_by_max(&mut content);

        let mut out: Vec<Recommendation> = self
            .categories
            .iter()
            .enumerate()
            .map(|(i, category)| Recommendation {
                category: category.clone(),
                score: weights.collaborative * collaborative[i] + weights.content * content[i],
                collaborative: collaborative[i],
                content: content[i],
            })
            .filter(|r| r.score > 0.0)
            .collect();
        out.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        out
    }

    fn average_shares(&self) -> Vec<f64> {
        let width = self.categories.len();
        let mut totals = vec![0.0; width];
        let mut active = 0usize;
        for id in self.nodes.keys() {
            let Some(vector) = self.activity_vector(id) else {
                continue;
            };
            if vector.iter().all(|c| *c == 0.0) {
                continue;
            }
            active += 1;
            for (total, share) in totals.iter_mut().zip(shares(&vector)) {
                *total += share;
            }
        }
        if active > 0 {
            for total in totals.iter_mut() {
                *total /= active as f64;
            }
        }
        totals
    }

    fn community_gain(&self, candidate: &str, members: &HashSet<&str>) -> f64 {
        let degree = self.nodes.get(candidate).map_or(0, |n| n.neighbors.len());
        if degree == 0 {
            return 0.0;
        }
        let internal = self
            .neighbor_ids(candidate)
            .filter(|n| members.contains(n))
            .count();
        internal as f64 / degree as f64
    }

    fn neighbor_ids<'a>(&'a self, student_id: &str) -> impl Iterator<Item = &'a str> + 'a {
        self.nodes
            .get(student_id)
            .into_iter()
            .flat_map(|node| node.neighbors.keys().map(String::as_str))
    }
}

/// Cosine of the angle between two vectors; 0 when either is all zeros or
/// the lengths differ.
pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-12 {
        0.0
    } else {
        dot / denom
    }
}

fn shares(vector: &[f64]) -> Vec<f64> {
    let total: f64 = vector.iter().sum();
    if total <= 0.0 {
        return vec![0.0; vector.len()];
    }
    vector.iter().map(|c| c / total).collect()
}

fn normalize_by_max(values: &mut [f64]) {
    let max = values.iter().cloned().fold(0.0, f64::max);
    if max > 0.0 {
        for value in values.iter_mut() {
            *value /= max;
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::EngagementLevel;

    fn record(student: &str, activity: &str, collaborators: &[&str]) -> ActivityRecord {
        ActivityRecord {
            student_id: student.to_string(),
            activity_type: activity.to_string(),
            occurred_at: NaiveDate::from_ymd_opt(2026, 2, 2).unwrap(),
            score: 7.0,
            quality: 80.0,
            engagement_level: EngagementLevel::Medium,
            collaborator_ids: collaborators.iter().map(|c| c.to_string()).collect(),
        }
    }

    fn graph_of(edges: &[(&str, &str)]) -> CollaborationGraph {
        let mut graph = CollaborationGraph::default();
        for (a, b) in edges {
            graph.add_edge(a, b).unwrap();
        }
        graph
    }

    #[test]
    fn edges_are_symmetric_and_weighted() {
        let mut graph = CollaborationGraph::default();
        assert_eq!(graph.add_edge("A", "B").unwrap(), 1);
        assert_eq!(graph.add_edge("B", "A").unwrap(), 2);
        assert_eq!(graph.edge_weight("A", "B"), Some(2));
        assert_eq!(graph.edge_weight("B", "A"), Some(2));
        assert_eq!(graph.edge_count(), 1);
        assert!(matches!(
            graph.add_edge("A", "A"),
            Err(AnalyticsError::Validation(_))
        ));
        assert_eq!(graph.node_count(), 2);
    }

    #[test]
    fn from_records_builds_nodes_and_edges() {
        let records = vec![
            record("S1", "quiz", &["S2", "S1"]),
            record("S2", "lab", &["S1"]),
            record("S3", "quiz", &[]),
        ];
        let graph = CollaborationGraph::from_records(&records, telemetry::noop());
        assert_eq!(graph.node_count(), 3);
        assert_eq!(graph.edge_weight("S1", "S2"), Some(2));
        assert_eq!(graph.edge_weight("S1", "S1"), None);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.categories(), &["quiz".to_string(), "lab".to_string()]);
        assert_eq!(graph.activity_vector("S3"), Some(vec![1.0, 0.0]));
    }

    #[test]
    fn components_partition_nodes() {
        let mut graph = graph_of(&[("A", "B"), ("B", "C"), ("D", "E")]);
        graph.add_node("F");
        let components = graph.connected_components();
        assert_eq!(
            components,
            vec![
                vec!["A".to_string(), "B".to_string(), "C".to_string()],
                vec!["D".to_string(), "E".to_string()],
                vec!["F".to_string()],
            ]
        );
        let total: usize = components.iter().map(Vec::len).sum();
        assert_eq!(total, graph.node_count());
    }

    #[test]
    fn centrality_uses_two_hop_reach() {
        // Path A - B - C - D
        let graph = graph_of(&[("A", "B"), ("B", "C"), ("C", "D")]);
        let scores = graph.centrality();
        let b = scores.iter().find(|c| c.student_id == "B").unwrap();
        assert!((b.degree - 2.0 / 3.0).abs() < 1e-9);
        assert!((b.closeness - 2.5 / 3.0).abs() < 1e-9);
        assert!((b.influence - (0.6 * 2.0 / 3.0 + 0.4 * 2.5 / 3.0)).abs() < 1e-9);

        let a = scores.iter().find(|c| c.student_id == "A").unwrap();
        assert!((a.closeness - 1.5 / 3.0).abs() < 1e-9);
        assert_eq!(scores[0].student_id, "B");

        assert!(graph_of(&[]).centrality().is_empty());
    }

    #[test]
    fn lone_student_scores_zero() {
        let mut graph = CollaborationGraph::default();
        graph.add_node("A");
        let scores = graph.centrality();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].student_id, "A");
        assert_eq!(scores[0].degree, 0.0);
        assert_eq!(scores[0].closeness, 0.0);
        assert_eq!(scores[0].influence, 0.0);
    }

    #[test]
    fn communities_follow_dense_clusters() {
        let graph = graph_of(&[
            ("A", "B"),
            ("B", "C"),
            ("A", "C"),
            ("C", "D"),
            ("D", "E"),
            ("E", "F"),
            ("D", "F"),
        ]);
        let communities = graph.detect_communities(0.4);
        let members: Vec<Vec<String>> = communities.iter().map(|c| c.members.clone()).collect();
        assert_eq!(
            members,
            vec![
                vec!["A".to_string(), "B".to_string(), "C".to_string()],
                vec!["D".to_string(), "E".to_string(), "F".to_string()],
            ]
        );
        assert_eq!(communities[0].internal_edges, 3);
    }

    #[test]
    fn singleton_communities_are_dropped() {
        let mut graph = graph_of(&[("A", "B")]);
        graph.add_node("Z");
        let communities = graph.detect_communities(0.0);
        assert_eq!(communities.len(), 1);
        assert_eq!(communities[0].members, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn cosine_similarity_bounds() {
        let v = [3.0, 1.0, 2.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-9);
        assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 4.0]), 0.0);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn recommendations_blend_peers_and_gaps() {
        let records = vec![
            record("S1", "quiz", &[]),
            record("S1", "quiz", &[]),
            record("S2", "quiz", &[]),
            record("S2", "lab", &[]),
            record("S3", "forum", &[]),
        ];
        let graph = CollaborationGraph::from_records(&records, telemetry::noop());

        let similar = graph.similar_students("S1", 5);
        assert_eq!(similar.len(), 1);
        assert_eq!(similar[0].0, "S2");

        let recs = graph.recommend("S1", 5, RecommendWeights::default());
        let categories: Vec<&str> = recs.iter().map(|r| r.category.as_str()).collect();
        // quiz: peer weight only; lab: peer + gap; forum: gap only.
        assert_eq!(categories, vec!["lab", "quiz", "forum"]);
        assert!(recs.iter().all(|r| r.score > 0.0));

        assert!(graph.recommend("nobody", 5, RecommendWeights::default()).is_empty());
    }
}
