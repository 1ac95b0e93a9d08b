//! DashboardProvider - live operational read model over the event bus

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, error, info};

use super::data::{self, DashboardData, RecentActivity};
use crate::config::DashboardConfig;
use crate::events::{Event, EventBus, ServiceType, Subscription, Topic, VerificationStatus, panic_message};
use crate::metrics::{CollectorOptions, DEFAULT_MAX_RESPONSE_TIME_SAMPLES, MetricsCollector};

/// Receives every pushed dashboard snapshot
pub type DashboardCallback = Arc<dyn Fn(&DashboardData) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Composes the bus and a metrics collector into a dashboard
///
/// Construction turns on bus recording (the timeline is built from bus
/// history) and creates an owned [`MetricsCollector`]. Every bus event
/// recomputes the snapshot and pushes it to subscribers; callbacks run
/// without any provider lock held.
pub struct DashboardProvider {
    bus: Arc<EventBus>,
    collector: Arc<MetricsCollector>,
    activities: Mutex<VecDeque<RecentActivity>>,
    history_size: usize,
    subscribers: Mutex<Vec<(u64, DashboardCallback)>>,
    next_subscriber_id: AtomicU64,
    subscription: Mutex<Option<Subscription>>,
    destroyed: AtomicBool,
}

impl DashboardProvider {
    pub fn new(bus: Arc<EventBus>, config: &DashboardConfig) -> Arc<Self> {
        debug!(?config, "DashboardProvider::new: called");
        let emit_interval = (config.metrics_interval_ms > 0).then(|| Duration::from_millis(config.metrics_interval_ms));
        // collector first so its listener has folded an event before ours reads the snapshot
        let collector = MetricsCollector::new(
            bus.clone(),
            CollectorOptions {
                emit_interval,
                max_response_time_samples: DEFAULT_MAX_RESPONSE_TIME_SAMPLES,
            },
        );
        bus.start_recording();

        let provider = Arc::new_cyclic(|weak: &Weak<DashboardProvider>| {
            let weak = weak.clone();
            let subscription = bus.on(Topic::Any, move |event| {
                if let Some(provider) = weak.upgrade() {
                    provider.handle_event(event);
                }
            });
            DashboardProvider {
                bus: bus.clone(),
                collector,
                activities: Mutex::new(VecDeque::new()),
                history_size: config.history_size,
                subscribers: Mutex::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(1),
                subscription: Mutex::new(Some(subscription)),
                destroyed: AtomicBool::new(false),
            }
        });
        info!(history_size = config.history_size, "Dashboard provider started");
        provider
    }

    fn handle_event(&self, event: &Event) {
        if let Some(activity) = RecentActivity::from_event(event) {
            let mut activities = lock(&self.activities);
            activities.push_front(activity);
            activities.truncate(self.history_size);
        }
        self.notify_subscribers();
    }

    fn notify_subscribers(&self) {
        let subscribers: Vec<(u64, DashboardCallback)> = lock(&self.subscribers).clone();
        if subscribers.is_empty() {
            return;
        }
        let data = self.get_dashboard_data();
        for (id, callback) in subscribers {
            if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| callback(&data))) {
                error!(
                    subscriber_id = id,
                    error = panic_message(&*panic),
                    "DashboardProvider: subscriber panicked"
                );
            }
        }
    }

    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.collector
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn history_size(&self) -> usize {
        self.history_size
    }

    /// Derive the full dashboard from current state
    pub fn get_dashboard_data(&self) -> DashboardData {
        let metrics = self.collector.get_snapshot();
        let history = self.bus.get_history(None);
        let recent_activity: Vec<RecentActivity> = lock(&self.activities).iter().cloned().collect();
        debug!(
            activities = recent_activity.len(),
            history = history.len(),
            "DashboardProvider::get_dashboard_data"
        );

        DashboardData {
            summary: data::summarize(&metrics),
            recent_activity,
            service_status: data::service_status(&metrics),
            adapter_health: data::adapter_health(&metrics),
            timeline: data::build_timeline(&history),
            metrics,
        }
    }

    fn activities_where<F>(&self, limit: usize, predicate: F) -> Vec<RecentActivity>
    where
        F: Fn(&RecentActivity) -> bool,
    {
        lock(&self.activities)
            .iter()
            .filter(|a| predicate(a))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Newest first
    pub fn recent_activities(&self, limit: usize) -> Vec<RecentActivity> {
        self.activities_where(limit, |_| true)
    }

    pub fn activities_by_service(&self, service: ServiceType, limit: usize) -> Vec<RecentActivity> {
        self.activities_where(limit, |a| a.service_type == service)
    }

    pub fn activities_by_adapter(&self, adapter: &str, limit: usize) -> Vec<RecentActivity> {
        self.activities_where(limit, |a| a.adapter == adapter)
    }

    pub fn activities_by_status(&self, status: VerificationStatus, limit: usize) -> Vec<RecentActivity> {
        self.activities_where(limit, |a| a.status == status)
    }

    /// Register a callback for every pushed snapshot
    pub fn subscribe<F>(self: &Arc<Self>, callback: F) -> DashboardSubscription
    where
        F: Fn(&DashboardData) + Send + Sync + 'static,
    {
        let id = self.next_subscriber_id.fetch_add(1, Ordering::SeqCst);
        debug!(subscriber_id = id, "DashboardProvider::subscribe: called");
        lock(&self.subscribers).push((id, Arc::new(callback)));
        DashboardSubscription {
            id,
            provider: Arc::downgrade(self),
        }
    }

    fn unsubscribe(&self, id: u64) {
        lock(&self.subscribers).retain(|(sub_id, _)| *sub_id != id);
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Current snapshot first, then the newest pushed snapshot
    ///
    /// Suited to server-sent-event style transports. A consumer that falls
    /// behind skips straight to the latest snapshot, so at most one is ever
    /// pending. Dropping the stream detaches it.
    pub fn stream(self: &Arc<Self>) -> DashboardStream {
        let (tx, mut rx) = watch::channel(self.get_dashboard_data());
        rx.mark_changed();
        let subscription = self.subscribe(move |data| {
            tx.send_replace(data.clone());
        });
        let inner = stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let data = rx.borrow_and_update().clone();
            Some((data, rx))
        })
        .boxed();
        DashboardStream { inner, subscription }
    }

    /// Empty the activity feed, reset metrics, and clear bus history
    pub fn clear(&self) {
        debug!("DashboardProvider::clear: called");
        lock(&self.activities).clear();
        self.collector.reset();
        self.bus.clear_history(None);
    }

    /// Drop all subscribers, detach from the bus, and destroy the collector.
    /// Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("DashboardProvider::destroy: called");
        lock(&self.subscribers).clear();
        if let Some(subscription) = lock(&self.subscription).take() {
            subscription.unsubscribe();
        }
        self.collector.destroy();
    }
}

impl Drop for DashboardProvider {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Handle returned by [`DashboardProvider::subscribe`]
#[must_use = "dropping the handle keeps the callback registered; call unsubscribe() to detach"]
pub struct DashboardSubscription {
    id: u64,
    provider: Weak<DashboardProvider>,
}

impl DashboardSubscription {
    /// Remove the callback. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(provider) = self.provider.upgrade() {
            provider.unsubscribe(self.id);
        }
    }
}

/// Stream of dashboard snapshots; see [`DashboardProvider::stream`]
pub struct DashboardStream {
    inner: BoxStream<'static, DashboardData>,
    subscription: DashboardSubscription,
}

impl Stream for DashboardStream {
    type Item = DashboardData;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.poll_next_unpin(cx)
    }
}

impl Drop for DashboardStream {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}
