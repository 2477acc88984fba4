use std::path::Path;

use serde::Deserialize;

use crate::error::{AnalyticsError, Result};
use crate::graph::RecommendWeights;
use crate::ranking::DEFAULT_TOP_PERFORMER_FRACTION;
use crate::search::SearchConfig;

/// Tunables for one analysis batch. Every field has a default, so a config
/// file only needs to name what it overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub cache_capacity: usize,
    pub top_performer_fraction: f64,
    pub fuzzy_max_edit_ops: usize,
    pub recommend_peers: usize,
    pub community_min_gain: f64,
    pub collaborative_weight: f64,
    pub content_weight: f64,
    pub search: SearchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 128,
            top_performer_fraction: DEFAULT_TOP_PERFORMER_FRACTION,
            fuzzy_max_edit_ops: 2,
            recommend_peers: 5,
            community_min_gain: 0.0,
            collaborative_weight: 0.7,
            content_weight: 0.3,
            search: SearchConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AnalyticsError::Source(format!("cannot read config {}: {e}", path.display()))
        })?;
        Self::from_json(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cache_capacity == 0 {
            return Err(AnalyticsError::validation("cache_capacity must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.top_performer_fraction) {
            return Err(AnalyticsError::validation(
                "top_performer_fraction must be within [0, 1]",
            ));
        }
        for (name, weight) in [
            ("collaborative_weight", self.collaborative_weight),
            ("content_weight", self.content_weight),
        ] {
            if !(0.0..=1.0).contains(&weight) {
                return Err(AnalyticsError::validation(format!(
                    "{name} must be within [0, 1]"
                )));
            }
        }
        Ok(())
    }

    pub fn recommend_weights(&self) -> RecommendWeights {
        RecommendWeights {
            collaborative: self.collaborative_weight,
            content: self.content_weight,
        }
    }
}
