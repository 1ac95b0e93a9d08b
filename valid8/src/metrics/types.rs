//! Metric buckets and snapshot types

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{MetricsSummary, ServiceType, VerificationStatus};

/// Counters and latency for one adapter × service bucket (or an adapter's
/// overall rollup)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub pending_requests: u64,
    /// Running mean over the bucket's requests, in milliseconds
    pub average_response_time: f64,
    pub min_response_time: f64,
    pub max_response_time: f64,
    /// Number of requests that reported a duration
    pub timed_requests: u64,
    /// Always `failed_requests / total_requests`, 0 when empty
    pub error_rate: f64,
    pub last_request: Option<DateTime<Utc>>,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
}

impl ServiceMetrics {
    /// Count one verification outcome
    ///
    /// `rate_limited` only counts toward the total; failure-class statuses
    /// (failed, timeout, invalid_data) count as failures; pending and
    /// processing count as pending.
    pub fn record(&mut self, status: VerificationStatus, duration_ms: Option<u64>, at: DateTime<Utc>) {
        self.total_requests += 1;

        if status == VerificationStatus::Success {
            self.successful_requests += 1;
            self.last_success = Some(at);
        } else if status.is_failure() {
            self.failed_requests += 1;
            self.last_failure = Some(at);
        } else if status.is_pending() {
            self.pending_requests += 1;
        }

        self.error_rate = self.compute_error_rate();

        if let Some(duration) = duration_ms {
            self.fold_duration(duration as f64);
        }

        self.last_request = Some(at);
    }

    fn compute_error_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            self.failed_requests as f64 / self.total_requests as f64
        }
    }

    /// Fold a duration into the running mean with `n` = post-increment total
    ///
    /// `avg + (d - avg) / n` is the same mean as `(avg*(n-1) + d) / n`
    /// without the large intermediate product.
    fn fold_duration(&mut self, duration: f64) {
        let n = self.total_requests.max(1) as f64;
        self.average_response_time += (duration - self.average_response_time) / n;

        if self.timed_requests == 0 {
            self.min_response_time = duration;
            self.max_response_time = duration;
        } else {
            self.min_response_time = self.min_response_time.min(duration);
            self.max_response_time = self.max_response_time.max(duration);
        }
        self.timed_requests += 1;
    }

    /// Condensed figures for a `metrics.collected` event
    pub fn summary(&self, uptime_ms: u64) -> MetricsSummary {
        MetricsSummary {
            total_requests: self.total_requests,
            successful_requests: self.successful_requests,
            failed_requests: self.failed_requests,
            average_response_time: self.average_response_time,
            error_rate: self.error_rate,
            uptime_ms,
        }
    }
}

/// Per-service buckets for one adapter plus its overall rollup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdapterMetrics {
    pub overall: ServiceMetrics,
    pub services: BTreeMap<ServiceType, ServiceMetrics>,
}

impl AdapterMetrics {
    /// Record into both the service bucket and the overall rollup
    pub fn record(
        &mut self,
        service: ServiceType,
        status: VerificationStatus,
        duration_ms: Option<u64>,
        at: DateTime<Utc>,
    ) {
        self.services
            .entry(service)
            .or_default()
            .record(status, duration_ms, at);
        self.overall.record(status, duration_ms, at);
    }

    pub fn service(&self, service: ServiceType) -> Option<&ServiceMetrics> {
        self.services.get(&service)
    }
}

/// Process-wide rollup over every adapter's overall bucket
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_requests: u64,
    pub total_successes: u64,
    pub total_failures: u64,
    /// Request-weighted mean of the adapters' averages
    pub average_response_time: f64,
    pub error_rate: f64,
    pub uptime_ms: u64,
}

impl GlobalMetrics {
    /// Sum overall buckets only; per-service buckets would double count
    pub fn from_adapters(adapters: &BTreeMap<String, AdapterMetrics>, uptime_ms: u64) -> Self {
        let mut global = GlobalMetrics {
            uptime_ms,
            ..Default::default()
        };
        let mut weighted_time = 0.0;
        let mut weight = 0u64;

        for metrics in adapters.values() {
            let overall = &metrics.overall;
            global.total_requests += overall.total_requests;
            global.total_successes += overall.successful_requests;
            global.total_failures += overall.failed_requests;
            if overall.total_requests > 0 {
                weighted_time += overall.average_response_time * overall.total_requests as f64;
                weight += overall.total_requests;
            }
        }

        if weight > 0 {
            global.average_response_time = weighted_time / weight as f64;
        }
        if global.total_requests > 0 {
            global.error_rate = global.total_failures as f64 / global.total_requests as f64;
        }
        global
    }
}

/// Point-in-time copy of all metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub adapters: BTreeMap<String, AdapterMetrics>,
    pub global: GlobalMetrics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn test_empty_bucket_has_zero_error_rate() {
        let metrics = ServiceMetrics::default();
        assert_eq!(metrics.error_rate, 0.0);
        assert_eq!(metrics.compute_error_rate(), 0.0);
    }

    #[test]
    fn test_single_failure_gives_full_error_rate() {
        let mut metrics = ServiceMetrics::default();
        metrics.record(VerificationStatus::Failed, None, now());
        assert_eq!(metrics.error_rate, 1.0);
        assert!(metrics.last_failure.is_some());
        assert!(metrics.last_success.is_none());
    }

    #[test]
    fn test_running_average() {
        let mut metrics = ServiceMetrics::default();
        metrics.record(VerificationStatus::Success, Some(100), now());
        metrics.record(VerificationStatus::Success, Some(300), now());
        assert_eq!(metrics.average_response_time, 200.0);
        metrics.record(VerificationStatus::Success, Some(200), now());
        assert_eq!(metrics.average_response_time, 200.0);
        assert_eq!(metrics.min_response_time, 100.0);
        assert_eq!(metrics.max_response_time, 300.0);
        assert_eq!(metrics.timed_requests, 3);
    }

    #[test]
    fn test_zero_duration_is_a_real_minimum() {
        let mut metrics = ServiceMetrics::default();
        metrics.record(VerificationStatus::Success, Some(0), now());
        metrics.record(VerificationStatus::Success, Some(40), now());
        assert_eq!(metrics.min_response_time, 0.0);
        assert_eq!(metrics.max_response_time, 40.0);
    }

    #[test]
    fn test_status_classes_update_counters() {
        let mut metrics = ServiceMetrics::default();
        metrics.record(VerificationStatus::Success, None, now());
        metrics.record(VerificationStatus::Timeout, None, now());
        metrics.record(VerificationStatus::InvalidData, None, now());
        metrics.record(VerificationStatus::Processing, None, now());
        metrics.record(VerificationStatus::RateLimited, None, now());

        assert_eq!(metrics.total_requests, 5);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 2);
        assert_eq!(metrics.pending_requests, 1);
        assert!((metrics.error_rate - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_adapter_record_updates_service_and_overall() {
        let mut adapter = AdapterMetrics::default();
        adapter.record(ServiceType::Nin, VerificationStatus::Success, Some(150), now());
        adapter.record(ServiceType::Bvn, VerificationStatus::Failed, Some(50), now());

        assert_eq!(adapter.overall.total_requests, 2);
        assert_eq!(adapter.overall.average_response_time, 100.0);
        assert_eq!(adapter.service(ServiceType::Nin).unwrap().total_requests, 1);
        assert_eq!(adapter.service(ServiceType::Bvn).unwrap().error_rate, 1.0);
        assert!(adapter.service(ServiceType::Cac).is_none());
    }

    #[test]
    fn test_global_rollup_is_weighted() {
        let mut adapters = BTreeMap::new();
        let mut a = AdapterMetrics::default();
        a.record(ServiceType::Nin, VerificationStatus::Success, Some(100), now());
        a.record(ServiceType::Nin, VerificationStatus::Success, Some(100), now());
        a.record(ServiceType::Nin, VerificationStatus::Success, Some(100), now());
        let mut b = AdapterMetrics::default();
        b.record(ServiceType::Bvn, VerificationStatus::Failed, Some(500), now());
        adapters.insert("a".to_string(), a);
        adapters.insert("b".to_string(), b);

        let global = GlobalMetrics::from_adapters(&adapters, 1234);
        assert_eq!(global.total_requests, 4);
        assert_eq!(global.total_successes, 3);
        assert_eq!(global.total_failures, 1);
        assert_eq!(global.average_response_time, 200.0);
        assert_eq!(global.error_rate, 0.25);
        assert_eq!(global.uptime_ms, 1234);
    }

    #[test]
    fn test_global_rollup_of_nothing() {
        let global = GlobalMetrics::from_adapters(&BTreeMap::new(), 0);
        assert_eq!(global, GlobalMetrics::default());
    }

    proptest! {
        #[test]
        fn prop_running_average_matches_arithmetic_mean(durations in prop::collection::vec(0u64..10_000, 1..200)) {
            let mut metrics = ServiceMetrics::default();
            for d in &durations {
                metrics.record(VerificationStatus::Success, Some(*d), Utc::now());
            }
            let mean = durations.iter().sum::<u64>() as f64 / durations.len() as f64;
            prop_assert!((metrics.average_response_time - mean).abs() < 1e-6);
            prop_assert_eq!(metrics.min_response_time, *durations.iter().min().unwrap() as f64);
            prop_assert_eq!(metrics.max_response_time, *durations.iter().max().unwrap() as f64);
        }
    }
}
