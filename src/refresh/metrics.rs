//! # Refresh Metrics
//!
//! The [`MetricsAggregator`] receives every refresh outcome (successes,
//! failures, throttle rejections, each retry attempt) and keeps:
//!
//! ```text
//!     record(result)
//!          │
//!          ├──► counters ──────────► total = successful + failed
//!          │
//!          ├──► duration window ───► last 100 successful durations
//!          │                         └─► average_refresh_duration_ms
//!          │
//!          ├──► error distribution ► failures per kind since reset
//!          │
//!          └──► event queue ───────► flushed to an EventSink when it
//!                                    reaches batch_size, or every
//!                                    flush_interval, whichever first
//! ```
//!
//! Flushing only exports queued events; it never touches the counters.

use super::config::AnalyticsSettings;
use super::error::RefreshErrorKind;
use super::orchestrator::RefreshResult;
use crate::clock::{SharedClock, SystemClock};
use crate::error::ConfigError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Point-in-time copy of the refresh counters.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct RefreshMetrics {
    /// Outcomes recorded.
    pub total_refreshes: u64,
    /// Successful outcomes.
    pub successful_refreshes: u64,
    /// Failed outcomes, including throttle and in-progress rejections.
    pub failed_refreshes: u64,
    /// Mean of the retained successful durations.
    pub average_refresh_duration_ms: f64,
    /// When the last outcome was recorded (aggregator clock).
    pub last_refresh_at_ms: Option<u64>,
}

impl RefreshMetrics {
    /// `successful / total`, or 0.0 when nothing was recorded.
    pub fn success_rate(&self) -> f64 {
        if self.total_refreshes == 0 {
            0.0
        } else {
            self.successful_refreshes as f64 / self.total_refreshes as f64
        }
    }

    /// Human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "Ad Refresh Metrics:\n\
             ├─ Outcomes:\n\
             │  ├─ Total: {}\n\
             │  ├─ Successful: {}\n\
             │  └─ Failed: {}\n\
             └─ Performance:\n\
                ├─ Success Rate: {:.2}%\n\
                └─ Average Duration: {:.1}ms",
            self.total_refreshes,
            self.successful_refreshes,
            self.failed_refreshes,
            self.success_rate() * 100.0,
            self.average_refresh_duration_ms
        )
    }
}

impl fmt::Display for RefreshMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary())
    }
}

/// Events handed to a sink in one flush.
#[derive(Debug, Clone, PartialEq)]
pub struct EventBatch {
    /// Outcomes in recording order.
    pub events: Vec<RefreshResult>,
}

impl EventBatch {
    /// Successful events in the batch.
    pub fn successes(&self) -> usize {
        self.events.iter().filter(|e| e.is_success()).count()
    }

    /// Failed events in the batch.
    pub fn failures(&self) -> usize {
        self.events.len() - self.successes()
    }
}

/// Destination of flushed event batches.
pub trait EventSink: Send + Sync {
    /// Receives one non-empty batch.
    fn flush(&self, batch: &EventBatch);
}

/// Logs a one-line summary per batch.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn flush(&self, batch: &EventBatch) {
        info!(
            "Batch flush: {} successes, {} failures",
            batch.successes(),
            batch.failures()
        );
    }
}

/// Keeps every batch in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    batches: Mutex<Vec<EventBatch>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Batches received so far.
    pub fn batches(&self) -> Vec<EventBatch> {
        self.batches.lock().clone()
    }

    /// Events received across all batches.
    pub fn total_events(&self) -> usize {
        self.batches.lock().iter().map(|b| b.events.len()).sum()
    }
}

impl EventSink for MemorySink {
    fn flush(&self, batch: &EventBatch) {
        self.batches.lock().push(batch.clone());
    }
}

#[derive(Debug, Default)]
struct AggregatorState {
    metrics: RefreshMetrics,
    durations: VecDeque<u64>,
    duration_sum: u64,
    errors: BTreeMap<RefreshErrorKind, u64>,
    queue: Vec<RefreshResult>,
}

struct FlushTask {
    stop: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Collects refresh outcomes.
///
/// ## Example
///
/// ```rust
/// use adrefresh::{MetricsAggregator, RefreshResult};
///
/// let metrics = MetricsAggregator::default();
/// assert_eq!(metrics.success_rate(), 0.0);
///
/// metrics.record(&RefreshResult::succeeded("adsense", 120, 0));
/// assert_eq!(metrics.success_rate(), 1.0);
/// assert_eq!(metrics.metrics().average_refresh_duration_ms, 120.0);
/// ```
pub struct MetricsAggregator {
    state: Mutex<AggregatorState>,
    settings: AnalyticsSettings,
    sink: Arc<dyn EventSink>,
    clock: SharedClock,
    flush_task: Mutex<Option<FlushTask>>,
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new(AnalyticsSettings::default())
    }
}

impl MetricsAggregator {
    /// Creates an aggregator that logs batches through `tracing`.
    ///
    /// # Panics
    ///
    /// Panics if the settings are invalid (see [`AnalyticsSettings::validate`]).
    /// Use [`MetricsAggregator::try_new`] to handle the error instead.
    pub fn new(settings: AnalyticsSettings) -> Self {
        match Self::try_new(settings) {
            Ok(aggregator) => aggregator,
            Err(err) => panic!("Invalid analytics settings: {err}"),
        }
    }

    /// Creates an aggregator, validating the settings first.
    pub fn try_new(settings: AnalyticsSettings) -> Result<Self, ConfigError> {
        settings.validate()?;

        Ok(Self {
            state: Mutex::new(AggregatorState::default()),
            settings,
            sink: Arc::new(TracingSink),
            clock: Arc::new(SystemClock),
            flush_task: Mutex::new(None),
        })
    }

    /// Replaces the batch destination.
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the time source used for `last_refresh_at_ms`.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    /// Batching settings in use.
    pub fn settings(&self) -> &AnalyticsSettings {
        &self.settings
    }

    /// Records one outcome.
    pub fn record(&self, result: &RefreshResult) {
        let now = self.clock.now_ms();
        let max_samples = self.settings.max_samples.max(1);

        let batch = {
            let mut state = self.state.lock();
            state.metrics.total_refreshes += 1;
            state.metrics.last_refresh_at_ms = Some(now);

            if result.is_success() {
                state.metrics.successful_refreshes += 1;
                state.durations.push_back(result.duration_ms());
                state.duration_sum += result.duration_ms();
                while state.durations.len() > max_samples {
                    if let Some(evicted) = state.durations.pop_front() {
                        state.duration_sum -= evicted;
                    }
                }
                state.metrics.average_refresh_duration_ms =
                    state.duration_sum as f64 / state.durations.len() as f64;
            } else {
                state.metrics.failed_refreshes += 1;
                if let Some(error) = result.error() {
                    *state.errors.entry(error.kind()).or_insert(0) += 1;
                }
            }

            state.queue.push(result.clone());
            (state.queue.len() >= self.settings.batch_size).then(|| std::mem::take(&mut state.queue))
        };

        log_event(result);

        if let Some(events) = batch {
            self.sink.flush(&EventBatch { events });
        }
    }

    /// Current counters.
    pub fn metrics(&self) -> RefreshMetrics {
        self.state.lock().metrics
    }

    /// `successful / total`, or 0.0 before the first record.
    pub fn success_rate(&self) -> f64 {
        self.metrics().success_rate()
    }

    /// Failures per kind since the last reset. Every kind is present.
    pub fn error_distribution(&self) -> BTreeMap<RefreshErrorKind, u64> {
        let state = self.state.lock();
        RefreshErrorKind::ALL
            .into_iter()
            .map(|kind| (kind, state.errors.get(&kind).copied().unwrap_or(0)))
            .collect()
    }

    /// One-line summary.
    pub fn performance_summary(&self) -> String {
        let metrics = self.metrics();
        format!(
            "Ad Refresh Performance: {:.1}% success rate, {:.0}ms avg time, {} total refreshes",
            metrics.success_rate() * 100.0,
            metrics.average_refresh_duration_ms,
            metrics.total_refreshes
        )
    }

    /// Events waiting for the next flush.
    pub fn pending_events(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Zeroes counters, samples, the error distribution and the queue.
    pub fn reset(&self) {
        *self.state.lock() = AggregatorState::default();
        debug!("Refresh metrics reset");
    }

    /// Sends queued events to the sink. Returns how many were sent.
    pub fn flush(&self) -> usize {
        let events = std::mem::take(&mut self.state.lock().queue);
        if events.is_empty() {
            return 0;
        }

        let count = events.len();
        self.sink.flush(&EventBatch { events });
        count
    }

    /// Starts flushing every `flush_interval` on the current tokio runtime.
    ///
    /// Returns `false` if a flush task is already running. The task holds
    /// only a weak reference and exits once the aggregator is dropped.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn start_periodic_flush(self: &Arc<Self>) -> bool {
        let mut slot = self.flush_task.lock();
        if slot.is_some() {
            return false;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let weak: Weak<Self> = Arc::downgrade(self);
        let period = self.settings.flush_interval;

        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let Some(aggregator) = weak.upgrade() else { break };
                        aggregator.flush();
                    }
                }
            }
            debug!("Periodic metrics flush stopped");
        });

        *slot = Some(FlushTask {
            stop: stop_tx,
            handle,
        });
        true
    }

    /// Whether the periodic flush task is running.
    pub fn is_flushing_periodically(&self) -> bool {
        self.flush_task
            .lock()
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    /// Stops the periodic flush and sends whatever is still queued.
    pub fn shutdown(&self) -> usize {
        if let Some(task) = self.flush_task.lock().take() {
            let _ = task.stop.send(());
        }
        self.flush()
    }
}

impl Drop for MetricsAggregator {
    fn drop(&mut self) {
        if let Some(task) = self.flush_task.get_mut().take() {
            task.handle.abort();
        }
    }
}

impl fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsAggregator")
            .field("metrics", &self.metrics())
            .field("settings", &self.settings)
            .field("pending_events", &self.pending_events())
            .finish()
    }
}

fn log_event(result: &RefreshResult) {
    match result.error() {
        None => info!(
            "Ad refresh successful for {} ({}ms)",
            result.provider(),
            result.duration_ms()
        ),
        Some(error) => warn!(
            "Ad refresh failed for {}: {}",
            result.provider(),
            error.message()
        ),
    }
}
