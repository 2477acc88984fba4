use std::sync::Arc;

use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent<'a> {
    IndexBuilt { records: usize, depth: usize },
    RankingComputed { ranked: usize, filtered_out: usize },
    SearchIndexBuilt { records: usize, terms: usize },
    CacheEviction { size: usize, capacity: usize },
    PrefetchSkipped { reason: &'a str },
    GraphBuilt { nodes: usize, edges: usize },
    CommunitiesDetected { communities: usize, discarded: usize },
}

pub trait Telemetry: Send + Sync {
    fn record(&self, event: &TelemetryEvent<'_>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetry;

impl Telemetry for NoopTelemetry {
    fn record(&self, _event: &TelemetryEvent<'_>) {}
}

/// Forwards events to `tracing` with structured fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingTelemetry;

impl Telemetry for TracingTelemetry {
    fn record(&self, event: &TelemetryEvent<'_>) {
        match event {
            TelemetryEvent::IndexBuilt { records, depth } => {
                info!(records, depth, "engagement index built");
            }
            TelemetryEvent::RankingComputed {
                ranked,
                filtered_out,
            } => {
                info!(ranked, filtered_out, "ranking computed");
            }
            TelemetryEvent::SearchIndexBuilt { records, terms } => {
                info!(records, terms, "search index built");
            }
            TelemetryEvent::CacheEviction { size, capacity } => {
                debug!(size, capacity, "recency cache evicted lru entry");
            }
            TelemetryEvent::PrefetchSkipped { reason } => {
                warn!(reason, "cache prefetch skipped");
            }
            TelemetryEvent::GraphBuilt { nodes, edges } => {
                info!(nodes, edges, "collaboration graph built");
            }
            TelemetryEvent::CommunitiesDetected {
                communities,
                discarded,
            } => {
                debug!(communities, discarded, "communities detected");
            }
        }
    }
}

pub type SharedTelemetry = Arc<dyn Telemetry>;

pub fn noop() -> SharedTelemetry {
    Arc::new(NoopTelemetry)
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Mutex;

    use super::*;

    /// Captures event names so tests can assert on what was reported.
    #[derive(Default)]
    pub struct RecordingTelemetry {
        pub events: Mutex<Vec<String>>,
    }

    impl Telemetry for RecordingTelemetry {
        fn record(&self, event: &TelemetryEvent<'_>) {
            let name = match event {
                TelemetryEvent::IndexBuilt { .. } => "index_built",
                TelemetryEvent::RankingComputed { .. } => "ranking_computed",
                TelemetryEvent::SearchIndexBuilt { .. } => "search_index_built",
                TelemetryEvent::CacheEviction { .. } => "cache_eviction",
                TelemetryEvent::PrefetchSkipped { .. } => "prefetch_skipped",
                TelemetryEvent::GraphBuilt { .. } => "graph_built",
                TelemetryEvent::CommunitiesDetected { .. } => "communities_detected",
            };
            self.events
                .lock()
                .expect("telemetry mutex poisoned")
                .push(name.to_string());
        }
    }
}
