//! MetricsCollector - folds bus events into per-adapter metrics
//!
//! The collector attaches a wildcard listener at construction. Verification
//! events update counters and latency; `response.received` events feed a
//! bounded window of raw latency samples per `adapter:service` key.
//! Optionally, a background task emits one `metrics.collected` event per
//! adapter on a fixed interval.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{AdapterMetrics, GlobalMetrics, MetricsSnapshot};
use crate::events::{Event, EventBus, EventType, MetricsEventData, MetricsPeriod, ServiceType, Subscription, Topic};

/// Default number of raw latency samples kept per `adapter:service`
pub const DEFAULT_MAX_RESPONSE_TIME_SAMPLES: usize = 100;

/// Construction options for [`MetricsCollector`]
#[derive(Debug, Clone)]
pub struct CollectorOptions {
    /// Emit `metrics.collected` events this often (requires a tokio runtime)
    pub emit_interval: Option<Duration>,
    /// Raw latency samples kept per `adapter:service`
    pub max_response_time_samples: usize,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            emit_interval: None,
            max_response_time_samples: DEFAULT_MAX_RESPONSE_TIME_SAMPLES,
        }
    }
}

#[derive(Debug, Default)]
struct CollectorState {
    adapters: BTreeMap<String, AdapterMetrics>,
    response_times: HashMap<String, VecDeque<u64>>,
}

fn sample_key(adapter: &str, service: ServiceType) -> String {
    format!("{}:{}", adapter, service)
}

/// Aggregates verification metrics from the event bus
pub struct MetricsCollector {
    bus: Arc<EventBus>,
    state: Mutex<CollectorState>,
    started_at: DateTime<Utc>,
    started: Instant,
    max_samples: usize,
    subscription: Mutex<Option<Subscription>>,
    emitter: Mutex<Option<JoinHandle<()>>>,
    active: Arc<AtomicBool>,
}

impl MetricsCollector {
    /// Create a collector attached to the bus
    ///
    /// When `options.emit_interval` is set and a tokio runtime is available,
    /// periodic emission starts immediately.
    pub fn new(bus: Arc<EventBus>, options: CollectorOptions) -> Arc<Self> {
        debug!(?options, "MetricsCollector::new: called");
        let collector = Arc::new_cyclic(|weak: &Weak<MetricsCollector>| {
            let weak = weak.clone();
            let subscription = bus.on(Topic::Any, move |event| {
                if let Some(collector) = weak.upgrade() {
                    collector.handle_event(event);
                }
            });
            MetricsCollector {
                bus: bus.clone(),
                state: Mutex::new(CollectorState::default()),
                started_at: Utc::now(),
                started: Instant::now(),
                max_samples: options.max_response_time_samples,
                subscription: Mutex::new(Some(subscription)),
                emitter: Mutex::new(None),
                active: Arc::new(AtomicBool::new(true)),
            }
        });

        if let Some(interval) = options.emit_interval {
            collector.start_emission(interval);
        }
        collector
    }

    fn state(&self) -> MutexGuard<'_, CollectorState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_event(&self, event: &Event) {
        let adapter = event.adapter();
        let mut state = self.state();

        if !state.adapters.contains_key(adapter) {
            debug!(%adapter, "MetricsCollector::handle_event: first sight of adapter");
        }
        let metrics = state.adapters.entry(adapter.to_string()).or_default();

        if event.event_type.is_verification()
            && let Some(data) = event.payload.as_verification()
        {
            metrics.record(data.service_type, data.status, data.duration_ms, event.timestamp);
        }

        if event.event_type == EventType::ResponseReceived
            && let Some(perf) = event.payload.as_performance()
            && let Some(service) = perf.service_type
        {
            let max_samples = self.max_samples;
            let samples = state.response_times.entry(sample_key(adapter, service)).or_default();
            samples.push_back(perf.duration_ms);
            while samples.len() > max_samples {
                samples.pop_front();
            }
        }
    }

    /// Metrics for one adapter
    pub fn adapter_metrics(&self, adapter: &str) -> Option<AdapterMetrics> {
        self.state().adapters.get(adapter).cloned()
    }

    /// Metrics for every adapter seen so far
    pub fn all_metrics(&self) -> BTreeMap<String, AdapterMetrics> {
        self.state().adapters.clone()
    }

    /// Raw latency samples (oldest first) for an adapter and service
    pub fn response_times(&self, adapter: &str, service: ServiceType) -> Vec<u64> {
        self.state()
            .response_times
            .get(&sample_key(adapter, service))
            .map(|samples| samples.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Nearest-rank percentile (`p` in 0..=100) over the sample window
    pub fn response_time_percentile(&self, adapter: &str, service: ServiceType, p: f64) -> Option<u64> {
        let mut samples = self.response_times(adapter, service);
        if samples.is_empty() {
            return None;
        }
        samples.sort_unstable();
        let p = p.clamp(0.0, 100.0);
        let rank = ((p / 100.0) * samples.len() as f64).ceil() as usize;
        Some(samples[rank.saturating_sub(1).min(samples.len() - 1)])
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Time since construction
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    /// Copy of all metrics plus the global rollup
    pub fn get_snapshot(&self) -> MetricsSnapshot {
        let adapters = self.all_metrics();
        let global = GlobalMetrics::from_adapters(&adapters, self.uptime().as_millis() as u64);
        debug!(adapters = adapters.len(), total = global.total_requests, "MetricsCollector::get_snapshot");
        MetricsSnapshot {
            timestamp: Utc::now(),
            adapters,
            global,
        }
    }

    /// Snapshot as JSON
    pub fn export_json(&self) -> serde_json::Value {
        serde_json::to_value(self.get_snapshot()).unwrap_or(serde_json::Value::Null)
    }

    /// Emit one `metrics.collected` event per known adapter; returns how many
    /// were emitted
    pub fn emit_metrics(&self) -> usize {
        if !self.active.load(Ordering::SeqCst) {
            debug!("MetricsCollector::emit_metrics: collector destroyed, skipping");
            return 0;
        }
        let snapshot = self.get_snapshot();
        let uptime_ms = snapshot.global.uptime_ms;
        let end = Utc::now();
        for (adapter, metrics) in &snapshot.adapters {
            self.bus.emit(
                EventType::MetricsCollected,
                MetricsEventData {
                    adapter: adapter.clone(),
                    metrics: metrics.overall.summary(uptime_ms),
                    period: MetricsPeriod {
                        start: self.started_at,
                        end,
                    },
                },
            );
        }
        debug!(count = snapshot.adapters.len(), "MetricsCollector::emit_metrics: emitted");
        snapshot.adapters.len()
    }

    fn start_emission(self: &Arc<Self>, interval: Duration) {
        if interval.is_zero() {
            warn!("MetricsCollector: zero emit interval, periodic emission disabled");
            return;
        }
        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                warn!("MetricsCollector: no tokio runtime, periodic emission disabled");
                return;
            }
        };

        let weak = Arc::downgrade(self);
        let active = self.active.clone();
        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !active.load(Ordering::SeqCst) {
                    break;
                }
                let Some(collector) = weak.upgrade() else {
                    break;
                };
                collector.emit_metrics();
            }
            debug!("MetricsCollector: emission task finished");
        });

        info!(interval_ms = interval.as_millis() as u64, "MetricsCollector: periodic emission started");
        *self.emitter.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Whether periodic emission is running
    pub fn is_emitting(&self) -> bool {
        self.emitter
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Clear all counters and samples; the bus subscription stays attached
    pub fn reset(&self) {
        debug!("MetricsCollector::reset: called");
        let mut state = self.state();
        state.adapters.clear();
        state.response_times.clear();
    }

    /// Stop periodic emission and detach from the bus. Idempotent.
    pub fn destroy(&self) {
        let was_active = self.active.swap(false, Ordering::SeqCst);
        debug!(was_active, "MetricsCollector::destroy: called");
        if let Some(handle) = self.emitter.lock().unwrap_or_else(PoisonError::into_inner).take() {
            handle.abort();
        }
        if let Some(subscription) = self.subscription.lock().unwrap_or_else(PoisonError::into_inner).take() {
            subscription.unsubscribe();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        !self.active.load(Ordering::SeqCst)
    }
}

impl Drop for MetricsCollector {
    fn drop(&mut self) {
        self.destroy();
    }
}
