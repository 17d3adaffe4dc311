//! Latency/Throughput Tracker
//!
//! ## Purpose
//!
//! Rolling statistics over completed requests: the mean processing time of
//! the most recent `window_size` samples and the request rate.
//!
//! ## Rate Definition
//!
//! Completions are counted in fixed windows of `rate_interval_ms`. The rate
//! is the count of the most recent *complete* window scaled to one second.
//! Windows roll lazily whenever the tracker is touched; if more than one
//! full window passed without traffic the rate is zero.
//!
//! ## Lifecycle
//!
//! ```text
//! start() ──→ Running ──shutdown()──→ Stopped
//!                                     (records ignored, queries frozen)
//! ```
//!
//! All state sits behind one mutex, so every operation is applied atomically
//! and in some total order, regardless of how many connections complete
//! requests concurrently.

use crate::config::StatsConfig;
use crate::stats::sink::{ObservabilitySink, StatsSnapshot, StatsSource};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Running,
    Stopped,
}

/// Fixed-capacity ring buffer of the newest samples
#[derive(Debug)]
struct SampleWindow {
    samples: Vec<u64>,
    capacity: usize,
    /// Next slot to overwrite once full
    position: usize,
    /// Sum of the held samples
    sum: u128,
}

impl SampleWindow {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            capacity,
            position: 0,
            sum: 0,
        }
    }

    fn record(&mut self, sample: u64) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.sum -= u128::from(self.samples[self.position]);
            self.samples[self.position] = sample;
            self.position = (self.position + 1) % self.capacity;
        }
        self.sum += u128::from(sample);
    }

    fn average(&self) -> f64 {
        if self.samples.is_empty() {
            0.0
        } else {
            self.sum as f64 / self.samples.len() as f64
        }
    }

    fn len(&self) -> usize {
        self.samples.len()
    }
}

#[derive(Debug)]
struct RateWindow {
    interval: Duration,
    window_start: Instant,
    current: u64,
    /// Count of the last complete window
    completed: u64,
}

impl RateWindow {
    fn new(interval: Duration, now: Instant) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            window_start: now,
            current: 0,
            completed: 0,
        }
    }

    fn roll(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.window_start);
        if elapsed < self.interval {
            return;
        }

        let interval_ns = self.interval.as_nanos();
        let windows = elapsed.as_nanos() / interval_ns;
        self.completed = if windows == 1 { self.current } else { 0 };
        self.current = 0;

        let into_current = Duration::from_nanos((elapsed.as_nanos() % interval_ns) as u64);
        self.window_start = now.checked_sub(into_current).unwrap_or(now);
    }

    fn per_second(&self) -> f64 {
        self.completed as f64 / self.interval.as_secs_f64()
    }
}

#[derive(Debug)]
struct TrackerState {
    lifecycle: Lifecycle,
    samples: SampleWindow,
    rate: RateWindow,
    total: u64,
}

/// Shared state; registered with sinks as the read-only source
#[derive(Debug)]
struct TrackerCore {
    state: Mutex<TrackerState>,
}

impl TrackerCore {
    fn record_at(&self, elapsed_ms: u64, now: Instant) -> bool {
        let mut state = self.state.lock();
        if state.lifecycle == Lifecycle::Stopped {
            return false;
        }
        state.rate.roll(now);
        state.rate.current += 1;
        state.samples.record(elapsed_ms);
        state.total += 1;
        true
    }

    fn rate_at(&self, now: Instant) -> f64 {
        let mut state = self.state.lock();
        if state.lifecycle == Lifecycle::Running {
            state.rate.roll(now);
        }
        state.rate.per_second()
    }

    fn average(&self) -> f64 {
        self.state.lock().samples.average()
    }
}

impl StatsSource for TrackerCore {
    fn requests_per_second(&self) -> f64 {
        self.rate_at(Instant::now())
    }

    fn average_processing_time_ms(&self) -> f64 {
        self.average()
    }

    fn total_requests(&self) -> u64 {
        self.state.lock().total
    }
}

struct Shared {
    name: String,
    core: Arc<TrackerCore>,
    sink: Option<Arc<dyn ObservabilitySink>>,
}

/// Handle to one tracker; clones share state
#[derive(Clone)]
pub struct StatsTracker {
    shared: Arc<Shared>,
}

impl StatsTracker {
    /// Start a tracker, registering it with `sink` under `name`
    pub fn start(
        config: &StatsConfig,
        name: impl Into<String>,
        sink: Option<Arc<dyn ObservabilitySink>>,
    ) -> Self {
        let name = name.into();
        let core = Arc::new(TrackerCore {
            state: Mutex::new(TrackerState {
                lifecycle: Lifecycle::Running,
                samples: SampleWindow::new(config.window_size),
                rate: RateWindow::new(config.rate_interval(), Instant::now()),
                total: 0,
            }),
        });

        if let Some(sink) = &sink {
            sink.register(&name, core.clone());
        }
        debug!(tracker = %name, window_size = config.window_size, "Stats tracker started");

        Self {
            shared: Arc::new(Shared { name, core, sink }),
        }
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Record one completed request; ignored once stopped
    pub fn record_sample(&self, elapsed_ms: u64) {
        self.record_sample_at(elapsed_ms, Instant::now());
    }

    fn record_sample_at(&self, elapsed_ms: u64, now: Instant) {
        if !self.shared.core.record_at(elapsed_ms, now) {
            debug!(tracker = %self.shared.name, "Sample ignored, tracker stopped");
        }
    }

    pub fn query_requests_per_second(&self) -> f64 {
        self.shared.core.rate_at(Instant::now())
    }

    /// Mean of the held samples, 0 when none
    pub fn query_average_processing_time(&self) -> f64 {
        self.shared.core.average()
    }

    pub fn total_requests(&self) -> u64 {
        self.shared.core.total_requests()
    }

    /// Samples currently held, at most `window_size`
    pub fn sample_count(&self) -> usize {
        self.shared.core.state.lock().samples.len()
    }

    pub fn is_running(&self) -> bool {
        self.shared.core.state.lock().lifecycle == Lifecycle::Running
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot::capture(self.shared.name.as_str(), self.shared.core.as_ref())
    }

    /// Stop the tracker and unregister it; later calls do nothing
    pub fn shutdown(&self) {
        let was_running = {
            let mut state = self.shared.core.state.lock();
            std::mem::replace(&mut state.lifecycle, Lifecycle::Stopped) == Lifecycle::Running
        };
        if !was_running {
            return;
        }

        if let Some(sink) = &self.shared.sink {
            sink.unregister(&self.shared.name);
        }
        info!(
            tracker = %self.shared.name,
            total_requests = self.total_requests(),
            "Stats tracker stopped"
        );
    }
}

impl std::fmt::Debug for StatsTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatsTracker")
            .field("name", &self.shared.name)
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::sink::StatsRegistry;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tracker() -> StatsTracker {
        StatsTracker::start(&StatsConfig::default(), "test", None)
    }

    #[test]
    fn test_full_window_averages_exactly() {
        let tracker = tracker();
        for _ in 0..100 {
            tracker.record_sample(7);
        }
        assert_eq!(tracker.query_average_processing_time(), 7.0);
        assert_eq!(tracker.sample_count(), 100);

        tracker.record_sample(107);
        assert_eq!(tracker.sample_count(), 100);
        // 99 samples of 7 and one of 107
        assert_eq!(tracker.query_average_processing_time(), 8.0);
        assert_eq!(tracker.total_requests(), 101);
    }

    #[test]
    fn test_oldest_sample_is_evicted_first() {
        let config = StatsConfig {
            window_size: 3,
            ..StatsConfig::default()
        };
        let tracker = StatsTracker::start(&config, "small", None);
        for sample in [100, 1, 1, 1] {
            tracker.record_sample(sample);
        }
        assert_eq!(tracker.query_average_processing_time(), 1.0);
    }

    #[test]
    fn test_empty_tracker_reports_zero() {
        let tracker = tracker();
        assert_eq!(tracker.query_average_processing_time(), 0.0);
        assert_eq!(tracker.query_requests_per_second(), 0.0);
    }

    #[test]
    fn test_rate_uses_last_complete_window() {
        let tracker = tracker();
        let start = tracker.shared.core.state.lock().rate.window_start;

        for i in 0..5 {
            tracker.record_sample_at(1, start + Duration::from_millis(100 * i));
        }
        // Window still open: nothing complete yet
        assert_eq!(tracker.shared.core.rate_at(start + Duration::from_millis(900)), 0.0);
        // First window closed with 5 completions
        assert_eq!(tracker.shared.core.rate_at(start + Duration::from_millis(1500)), 5.0);
        // A whole idle window later the rate drops to zero
        assert_eq!(tracker.shared.core.rate_at(start + Duration::from_millis(3100)), 0.0);
    }

    #[test]
    fn test_rate_scales_to_per_second() {
        let config = StatsConfig {
            rate_interval_ms: 500,
            ..StatsConfig::default()
        };
        let tracker = StatsTracker::start(&config, "half-second", None);
        let start = tracker.shared.core.state.lock().rate.window_start;

        for i in 0..3 {
            tracker.record_sample_at(1, start + Duration::from_millis(10 * i));
        }
        assert_eq!(tracker.shared.core.rate_at(start + Duration::from_millis(600)), 6.0);
    }

    #[test]
    fn test_stopped_tracker_ignores_samples() {
        let tracker = tracker();
        tracker.record_sample(10);
        tracker.shutdown();
        tracker.record_sample(1000);

        assert!(!tracker.is_running());
        assert_eq!(tracker.total_requests(), 1);
        assert_eq!(tracker.query_average_processing_time(), 10.0);
    }

    #[derive(Default)]
    struct CountingSink {
        registered: AtomicUsize,
        unregistered: AtomicUsize,
    }

    impl ObservabilitySink for CountingSink {
        fn register(&self, _name: &str, _source: Arc<dyn StatsSource>) {
            self.registered.fetch_add(1, Ordering::SeqCst);
        }

        fn unregister(&self, _name: &str) {
            self.unregistered.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_shutdown_twice_releases_sink_once() {
        let sink = Arc::new(CountingSink::default());
        let tracker = StatsTracker::start(&StatsConfig::default(), "idempotent", Some(sink.clone()));
        let clone = tracker.clone();

        tracker.shutdown();
        clone.shutdown();

        assert_eq!(sink.registered.load(Ordering::SeqCst), 1);
        assert_eq!(sink.unregistered.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_registry_sees_live_values_until_shutdown() {
        let registry = Arc::new(StatsRegistry::new());
        let tracker = StatsTracker::start(&StatsConfig::default(), "server", Some(registry.clone()));

        tracker.record_sample(4);
        tracker.record_sample(6);
        let snapshot = registry.snapshot("server").unwrap();
        assert_eq!(snapshot.average_processing_time_ms, 5.0);
        assert_eq!(snapshot.total_requests, 2);

        tracker.shutdown();
        assert!(!registry.is_registered("server"));
    }

    #[test]
    fn test_concurrent_recording_loses_nothing() {
        let tracker = tracker();
        let threads: Vec<_> = (0..8)
            .map(|_| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        tracker.record_sample(3);
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        assert_eq!(tracker.total_requests(), 4000);
        assert_eq!(tracker.sample_count(), 100);
        assert_eq!(tracker.query_average_processing_time(), 3.0);
    }
}
