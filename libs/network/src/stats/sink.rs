//! Observability sinks
//!
//! A tracker registers a read-only [`StatsSource`] with a sink on start and
//! unregisters it on shutdown. Sinks never mutate tracker state.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;

/// Read-only view of a running tracker
pub trait StatsSource: Send + Sync {
    fn requests_per_second(&self) -> f64;

    fn average_processing_time_ms(&self) -> f64;

    fn total_requests(&self) -> u64;
}

/// Registration point for stats sources
pub trait ObservabilitySink: Send + Sync {
    fn register(&self, name: &str, source: Arc<dyn StatsSource>);

    fn unregister(&self, name: &str);

    /// Push current values to the backend, for sinks that need it
    fn publish(&self) {}
}

/// Point-in-time copy of one source
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub name: String,
    pub requests_per_second: f64,
    pub average_processing_time_ms: f64,
    pub total_requests: u64,
}

impl StatsSnapshot {
    pub fn capture(name: impl Into<String>, source: &dyn StatsSource) -> Self {
        Self {
            name: name.into(),
            requests_per_second: source.requests_per_second(),
            average_processing_time_ms: source.average_processing_time_ms(),
            total_requests: source.total_requests(),
        }
    }
}

/// In-process sink queried by name
#[derive(Default)]
pub struct StatsRegistry {
    sources: DashMap<String, Arc<dyn StatsSource>>,
}

impl StatsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self, name: &str) -> Option<StatsSnapshot> {
        self.sources
            .get(name)
            .map(|source| StatsSnapshot::capture(name, source.value().as_ref()))
    }

    /// Snapshots of every registered source, sorted by name
    pub fn snapshots(&self) -> Vec<StatsSnapshot> {
        let mut snapshots: Vec<_> = self
            .sources
            .iter()
            .map(|entry| StatsSnapshot::capture(entry.key().as_str(), entry.value().as_ref()))
            .collect();
        snapshots.sort_by(|a, b| a.name.cmp(&b.name));
        snapshots
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.sources.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl ObservabilitySink for StatsRegistry {
    fn register(&self, name: &str, source: Arc<dyn StatsSource>) {
        self.sources.insert(name.to_string(), source);
    }

    fn unregister(&self, name: &str) {
        self.sources.remove(name);
    }
}

/// Publishes registered sources as `metrics` gauges on every [`publish`](ObservabilitySink::publish)
#[cfg(feature = "monitoring")]
#[derive(Default)]
pub struct MetricsSink {
    sources: DashMap<String, Arc<dyn StatsSource>>,
}

#[cfg(feature = "monitoring")]
impl MetricsSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "monitoring")]
impl ObservabilitySink for MetricsSink {
    fn register(&self, name: &str, source: Arc<dyn StatsSource>) {
        self.sources.insert(name.to_string(), source);
    }

    fn unregister(&self, name: &str) {
        self.sources.remove(name);
    }

    fn publish(&self) {
        for entry in self.sources.iter() {
            let tracker = entry.key().clone();
            let source = entry.value();
            metrics::gauge!("rpc_requests_per_second", "tracker" => tracker.clone())
                .set(source.requests_per_second());
            metrics::gauge!("rpc_average_processing_time_ms", "tracker" => tracker.clone())
                .set(source.average_processing_time_ms());
            metrics::gauge!("rpc_requests_total", "tracker" => tracker)
                .set(source.total_requests() as f64);
        }
    }
}
