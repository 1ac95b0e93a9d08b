//! Dashboard read model and the pure functions that derive it

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{Event, EventType, ServiceType, VerificationStatus};
use crate::metrics::MetricsSnapshot;

/// Width of one timeline bucket
pub const TIMELINE_BUCKET: Duration = Duration::from_secs(5 * 60);
/// Most recent buckets kept in the timeline
pub const TIMELINE_MAX_BUCKETS: usize = 50;
/// Adapters at or above this error rate are unhealthy
pub const UNHEALTHY_ERROR_RATE: f64 = 0.10;

/// One verification outcome as shown in the activity feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentActivity {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub service_type: ServiceType,
    pub adapter: String,
    pub status: VerificationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RecentActivity {
    /// Activity for a verification outcome event; `None` for anything else
    pub fn from_event(event: &Event) -> Option<Self> {
        if !event.event_type.is_verification_outcome() {
            return None;
        }
        let data = event.payload.as_verification()?;
        Some(Self {
            id: event.event_id.clone(),
            timestamp: event.timestamp,
            service_type: data.service_type,
            adapter: data.adapter.clone(),
            status: data.status,
            duration_ms: data.duration_ms,
            error: data.error.as_ref().map(|e| e.message.clone()),
        })
    }
}

/// Headline totals
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_verifications: u64,
    pub successful_verifications: u64,
    pub failed_verifications: u64,
    pub success_rate: f64,
    pub average_response_time: f64,
}

/// One row per service type, folded across adapters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatusSummary {
    pub service: ServiceType,
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub success_rate: f64,
    /// Request-weighted mean latency across adapters
    pub average_time: f64,
}

/// One row per adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterHealthStatus {
    pub adapter: String,
    pub is_healthy: bool,
    pub uptime_ms: u64,
    pub total_requests: u64,
    pub error_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<DateTime<Utc>>,
}

/// Event counts for one timeline window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineBucket {
    /// Window start
    pub timestamp: DateTime<Utc>,
    pub total: u64,
    pub counts: BTreeMap<EventType, u64>,
}

/// Complete dashboard read model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardData {
    pub summary: DashboardSummary,
    pub recent_activity: Vec<RecentActivity>,
    pub service_status: Vec<ServiceStatusSummary>,
    pub adapter_health: Vec<AdapterHealthStatus>,
    pub metrics: MetricsSnapshot,
    pub timeline: Vec<TimelineBucket>,
}

pub(crate) fn summarize(metrics: &MetricsSnapshot) -> DashboardSummary {
    let global = &metrics.global;
    DashboardSummary {
        total_verifications: global.total_requests,
        successful_verifications: global.total_successes,
        failed_verifications: global.total_failures,
        success_rate: if global.error_rate > 0.0 { 1.0 - global.error_rate } else { 1.0 },
        average_response_time: global.average_response_time,
    }
}

/// Rows sorted by total descending, ties in service declaration order
pub(crate) fn service_status(metrics: &MetricsSnapshot) -> Vec<ServiceStatusSummary> {
    let mut rows: BTreeMap<ServiceType, (ServiceStatusSummary, f64)> = BTreeMap::new();

    for adapter in metrics.adapters.values() {
        for (service, bucket) in &adapter.services {
            let (row, weighted) = rows.entry(*service).or_insert_with(|| {
                (
                    ServiceStatusSummary {
                        service: *service,
                        total: 0,
                        success: 0,
                        failed: 0,
                        success_rate: 0.0,
                        average_time: 0.0,
                    },
                    0.0,
                )
            });
            row.total += bucket.total_requests;
            row.success += bucket.successful_requests;
            row.failed += bucket.failed_requests;
            *weighted += bucket.average_response_time * bucket.total_requests as f64;
        }
    }

    let mut rows: Vec<ServiceStatusSummary> = rows
        .into_values()
        .map(|(mut row, weighted)| {
            if row.total > 0 {
                row.success_rate = row.success as f64 / row.total as f64;
                row.average_time = weighted / row.total as f64;
            }
            row
        })
        .collect();
    rows.sort_by(|a, b| b.total.cmp(&a.total));
    rows
}

pub(crate) fn adapter_health(metrics: &MetricsSnapshot) -> Vec<AdapterHealthStatus> {
    metrics
        .adapters
        .iter()
        .map(|(adapter, m)| AdapterHealthStatus {
            adapter: adapter.clone(),
            is_healthy: m.overall.error_rate < UNHEALTHY_ERROR_RATE,
            uptime_ms: metrics.global.uptime_ms,
            total_requests: m.overall.total_requests,
            error_rate: m.overall.error_rate,
            last_activity: m.overall.last_request,
        })
        .collect()
}

fn bucket_start(timestamp: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let width = TIMELINE_BUCKET.as_millis() as i64;
    let start = timestamp.timestamp_millis().div_euclid(width) * width;
    DateTime::from_timestamp_millis(start)
}

/// Count events per window; newest window first, at most
/// [`TIMELINE_MAX_BUCKETS`]
pub(crate) fn build_timeline(events: &[Event]) -> Vec<TimelineBucket> {
    let mut buckets: BTreeMap<DateTime<Utc>, TimelineBucket> = BTreeMap::new();
    for event in events {
        let Some(start) = bucket_start(event.timestamp) else {
            continue;
        };
        let bucket = buckets.entry(start).or_insert_with(|| TimelineBucket {
            timestamp: start,
            total: 0,
            counts: BTreeMap::new(),
        });
        bucket.total += 1;
        *bucket.counts.entry(event.event_type).or_insert(0) += 1;
    }
    buckets.into_values().rev().take(TIMELINE_MAX_BUCKETS).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{AdapterEventData, EventContext, VerificationEventData};
    use crate::metrics::{AdapterMetrics, GlobalMetrics};

    fn at(minutes: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_100, 0).unwrap() + chrono::Duration::minutes(minutes)
    }

    fn event_at(event_type: EventType, timestamp: DateTime<Utc>) -> Event {
        Event::enrich(
            event_type,
            AdapterEventData::new("a", "test").into(),
            EventContext {
                timestamp: Some(timestamp),
                ..Default::default()
            },
        )
    }

    fn snapshot(adapters: BTreeMap<String, AdapterMetrics>) -> MetricsSnapshot {
        let global = GlobalMetrics::from_adapters(&adapters, 1234);
        MetricsSnapshot {
            timestamp: Utc::now(),
            adapters,
            global,
        }
    }

    fn record(metrics: &mut AdapterMetrics, service: ServiceType, status: VerificationStatus, ms: u64) {
        metrics.record(service, status, Some(ms), Utc::now());
    }

    #[test]
    fn test_activity_only_for_outcomes() {
        let data = VerificationEventData::new("a", ServiceType::Nin, VerificationStatus::Failed)
            .with_duration(40)
            .with_error("E", "nope");
        let completed = Event::enrich(EventType::VerificationFailed, data.clone().into(), EventContext::default());
        let activity = RecentActivity::from_event(&completed).unwrap();
        assert_eq!(activity.id, completed.event_id);
        assert_eq!(activity.error.as_deref(), Some("nope"));
        assert_eq!(activity.duration_ms, Some(40));

        let started = Event::enrich(EventType::VerificationStarted, data.clone().into(), EventContext::default());
        assert!(RecentActivity::from_event(&started).is_none());
        let retry = Event::enrich(EventType::VerificationRetry, data.into(), EventContext::default());
        assert!(RecentActivity::from_event(&retry).is_none());

        let adapter_event = event_at(EventType::AdapterInitialized, Utc::now());
        assert!(RecentActivity::from_event(&adapter_event).is_none());
    }

    #[test]
    fn test_summary_success_rate() {
        let empty = summarize(&snapshot(BTreeMap::new()));
        assert_eq!(empty.success_rate, 1.0);
        assert_eq!(empty.total_verifications, 0);

        let mut a = AdapterMetrics::default();
        record(&mut a, ServiceType::Nin, VerificationStatus::Success, 10);
        record(&mut a, ServiceType::Nin, VerificationStatus::Failed, 10);
        record(&mut a, ServiceType::Nin, VerificationStatus::Success, 10);
        record(&mut a, ServiceType::Nin, VerificationStatus::Success, 10);
        let summary = summarize(&snapshot(BTreeMap::from([("a".to_string(), a)])));
        assert_eq!(summary.total_verifications, 4);
        assert_eq!(summary.failed_verifications, 1);
        assert_eq!(summary.success_rate, 0.75);
    }

    #[test]
    fn test_service_status_folds_across_adapters() {
        let mut a = AdapterMetrics::default();
        record(&mut a, ServiceType::Nin, VerificationStatus::Success, 100);
        let mut b = AdapterMetrics::default();
        record(&mut b, ServiceType::Nin, VerificationStatus::Failed, 400);
        record(&mut b, ServiceType::Nin, VerificationStatus::Success, 400);
        record(&mut b, ServiceType::Bvn, VerificationStatus::Success, 50);

        let rows = service_status(&snapshot(BTreeMap::from([("a".to_string(), a), ("b".to_string(), b)])));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].service, ServiceType::Nin);
        assert_eq!(rows[0].total, 3);
        assert_eq!(rows[0].success, 2);
        assert_eq!(rows[0].failed, 1);
        assert_eq!(rows[0].average_time, 300.0);
        assert!((rows[0].success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(rows[1].service, ServiceType::Bvn);
        assert_eq!(rows[1].success_rate, 1.0);
    }

    #[test]
    fn test_adapter_health_threshold() {
        let mut healthy = AdapterMetrics::default();
        for _ in 0..19 {
            record(&mut healthy, ServiceType::Nin, VerificationStatus::Success, 1);
        }
        record(&mut healthy, ServiceType::Nin, VerificationStatus::Failed, 1);

        let mut sick = AdapterMetrics::default();
        for _ in 0..9 {
            record(&mut sick, ServiceType::Nin, VerificationStatus::Success, 1);
        }
        record(&mut sick, ServiceType::Nin, VerificationStatus::Failed, 1);

        let rows = adapter_health(&snapshot(BTreeMap::from([
            ("healthy".to_string(), healthy),
            ("sick".to_string(), sick),
        ])));
        assert!(rows[0].is_healthy);
        assert!(!rows[1].is_healthy);
        assert_eq!(rows[1].error_rate, 0.1);
        assert_eq!(rows[0].uptime_ms, 1234);
        assert!(rows[0].last_activity.is_some());
    }

    #[test]
    fn test_timeline_buckets_by_five_minutes() {
        let events = vec![
            event_at(EventType::VerificationCompleted, at(0)),
            event_at(EventType::VerificationCompleted, at(1)),
            event_at(EventType::VerificationFailed, at(2)),
            event_at(EventType::VerificationCompleted, at(11)),
        ];
        let timeline = build_timeline(&events);
        assert_eq!(timeline.len(), 2);
        assert!(timeline[0].timestamp > timeline[1].timestamp);
        assert_eq!(timeline[0].total, 1);
        assert_eq!(timeline[1].total, 3);
        assert_eq!(timeline[1].counts[&EventType::VerificationCompleted], 2);
        assert_eq!(timeline[1].counts[&EventType::VerificationFailed], 1);
        assert_eq!(timeline[1].timestamp.timestamp() % 300, 0);
    }

    #[test]
    fn test_timeline_keeps_most_recent_buckets() {
        let events: Vec<Event> = (0..60)
            .map(|i| event_at(EventType::RequestSent, at(i * 5)))
            .collect();
        let timeline = build_timeline(&events);
        assert_eq!(timeline.len(), TIMELINE_MAX_BUCKETS);
        assert_eq!(timeline[0].timestamp, bucket_start(at(59 * 5)).unwrap());
    }

    #[test]
    fn test_dashboard_data_serializes() {
        let data = DashboardData {
            summary: summarize(&snapshot(BTreeMap::new())),
            recent_activity: vec![],
            service_status: vec![],
            adapter_health: vec![],
            metrics: snapshot(BTreeMap::new()),
            timeline: build_timeline(&[event_at(EventType::TimeoutOccurred, at(0))]),
        };
        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["summary"]["success_rate"], serde_json::json!(1.0));
        assert_eq!(json["timeline"][0]["counts"]["timeout.occurred"], serde_json::json!(1));
    }
}
