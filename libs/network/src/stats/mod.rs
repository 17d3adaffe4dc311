//! Request statistics and their observability surface

pub mod sink;
pub mod tracker;

#[cfg(feature = "monitoring")]
pub use sink::MetricsSink;
pub use sink::{ObservabilitySink, StatsRegistry, StatsSnapshot, StatsSource};
pub use tracker::StatsTracker;
