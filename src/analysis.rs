use chrono::NaiveDate;

use crate::cache::{CacheStats, PrefetchSource, RecencyCache};
use crate::config::EngineConfig;
use crate::engagement_index::{Categories, EngagementIndex, IndexStats};
use crate::error::Result;
use crate::graph::{CollaborationGraph, Community, NodeCentrality, Recommendation};
use crate::models::{ActivityRecord, StudentProfile, StudentSummary, StudentTrend};
use crate::ranking::{RankedStudent, RankingEngine};
use crate::search::{FuzzyMatch, SearchIndex};
use crate::skills::SkillDependencyGraph;
use crate::summary;
use crate::telemetry::SharedTelemetry;
use crate::trend;

pub struct AnalysisBatch {
    as_of: NaiveDate,
    records: Vec<ActivityRecord>,
    summaries: Vec<StudentSummary>,
    index: EngagementIndex<StudentSummary>,
    ranked: Vec<RankedStudent>,
    search: SearchIndex,
    graph: CollaborationGraph,
    skills: SkillDependencyGraph,
    cache: RecencyCache<String, StudentSummary>,
    config: EngineConfig,
}

impl AnalysisBatch {
    pub fn build(
        records: Vec<ActivityRecord>,
        profiles: &[StudentProfile],
        skills: SkillDependencyGraph,
        config: EngineConfig,
        as_of: NaiveDate,
        telemetry: SharedTelemetry,
    ) -> Result<Self> {
        config.validate()?;
        let summaries = summary::summarize(&records, profiles, as_of);

        let index = EngagementIndex::build(
            summaries
                .iter()
                .map(|s| (s.student_id.clone(), s.aggregate_score, s.clone())),
            telemetry.clone(),
        )?;
        let ranked = RankingEngine::new(config.top_performer_fraction, telemetry.clone())
            .rank(&summaries);
        let search = SearchIndex::from_records_with_telemetry(
            &summaries,
            config.search.clone(),
            telemetry.clone(),
        )?;
        let graph = CollaborationGraph::from_records(&records, telemetry.clone());
        let cache = RecencyCache::with_telemetry(config.cache_capacity, telemetry)?;

        Ok(Self {
            as_of,
            records,
            summaries,
            index,
            ranked,
            search,
            graph,
            skills,
            cache,
            config,
        })
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn records(&self) -> &[ActivityRecord] {
        &self.records
    }

    pub fn summaries(&self) -> &[StudentSummary] {
        &self.summaries
    }

    pub fn index(&self) -> &EngagementIndex<StudentSummary> {
        &self.index
    }

    pub fn search(&self) -> &SearchIndex {
        &self.search
    }

    pub fn graph(&self) -> &CollaborationGraph {
        &self.graph
    }

    pub fn skills(&self) -> &SkillDependencyGraph {
        &self.skills
    }

    pub fn categorize(&self) -> Categories<'_, StudentSummary> {
        self.index.categorize()
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    pub fn ranked_list(&self) -> &[RankedStudent] {
        &self.ranked
    }

    pub fn fuzzy_search(&self, term: &str) -> Vec<FuzzyMatch<'_>> {
        self.search.fuzzy_search(term, self.config.fuzzy_max_edit_ops)
    }

    /// Per-student lookup through the recency cache. A miss falls back to
    /// the index and then warms the cache with the student's collaborators.
    pub fn student(&mut self, student_id: &str) -> Option<StudentSummary> {
        let key = student_id.to_string();
        if let Some(hit) = self.cache.get(&key) {
            return Some(hit.clone());
        }
        let found = self.index.lookup(student_id)?.payload.clone();
        self.cache.put(key.clone(), found.clone());
        let peers = CollaboratorPrefetch {
            graph: &self.graph,
            index: &self.index,
        };
        self.cache.prefetch(&key, &peers);
        Some(found)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn communities(&self) -> Vec<Community> {
        self.graph.detect_communities(self.config.community_min_gain)
    }

    pub fn centrality(&self) -> Vec<NodeCentrality> {
        self.graph.centrality()
    }

    pub fn recommend(&self, student_id: &str) -> Vec<Recommendation> {
        self.graph.recommend(
            student_id,
            self.config.recommend_peers,
            self.config.recommend_weights(),
        )
    }

    pub fn trends(&self, since_days: i64) -> Vec<StudentTrend> {
        trend::score_trends(&self.records, self.as_of, since_days)
    }

    pub fn learning_path<S: AsRef<str>>(&self, current_skills: &[S], target: &str) -> Option<Vec<String>> {
        self.skills.learning_path(current_skills, target)
    }
}

/// Collaborators of a student, strongest ties first.
struct CollaboratorPrefetch<'a> {
    graph: &'a CollaborationGraph,
    index: &'a EngagementIndex<StudentSummary>,
}

impl PrefetchSource<String, StudentSummary> for CollaboratorPrefetch<'_> {
    fn related(&self, key: &String) -> Result<Vec<(String, StudentSummary)>> {
        let Some(node) = self.graph.node(key) else {
            return Ok(Vec::new());
        };
        let mut peers: Vec<(&String, u32)> = node.neighbors.iter().map(|(id, w)| (id, *w)).collect();
        peers.sort_by(|a, b| b.1.cmp(&a.1));
        Ok(peers
            .into_iter()
            .filter_map(|(id, _)| {
                self.index
                    .lookup(id)
                    .map(|node| (id.clone(), node.payload.clone()))
            })
            .collect())
    }
}
