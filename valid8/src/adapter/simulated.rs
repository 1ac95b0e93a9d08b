//! SimulatedAdapter - deterministic, network-free provider
//!
//! Used by the `simulate` command and by tests. Latency, failure rate,
//! readiness, and capabilities are all configurable; failures are spread
//! evenly over the call sequence so a given rate always yields the same
//! outcomes in the same order.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::{CapabilitySet, DEFAULT_OPERATION, VerificationAdapter, VerificationError, VerificationRequest, VerificationResponse};
use crate::config::AdapterSettings;
use crate::events::ServiceType;

/// Simulated verification provider
#[derive(Debug)]
pub struct SimulatedAdapter {
    name: String,
    ready: AtomicBool,
    capabilities: CapabilitySet,
    latency: Duration,
    failure_rate: f64,
    calls: AtomicU64,
}

impl SimulatedAdapter {
    /// Ready adapter serving every service with no latency and no failures
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ready: AtomicBool::new(true),
            capabilities: CapabilitySet::all(),
            latency: Duration::ZERO,
            failure_rate: 0.0,
            calls: AtomicU64::new(0),
        }
    }

    /// Build from adapter settings
    ///
    /// Recognised `extra` keys: `latency-ms`, `failure-rate` (0.0..=1.0),
    /// `capabilities` (list of service names), `ready`.
    pub fn from_settings(name: impl Into<String>, settings: &AdapterSettings) -> Result<Self, VerificationError> {
        let name = name.into();
        debug!(%name, "SimulatedAdapter::from_settings: called");
        let mut adapter = Self::new(name.clone());

        if let Some(value) = settings.extra.get("latency-ms") {
            let ms = value.as_u64().ok_or_else(|| {
                VerificationError::configuration(format!("'{}': latency-ms must be a non-negative integer", name), vec![])
            })?;
            adapter.latency = Duration::from_millis(ms);
        }

        if let Some(value) = settings.extra.get("failure-rate") {
            let rate = value.as_f64().ok_or_else(|| {
                VerificationError::configuration(format!("'{}': failure-rate must be a number", name), vec![])
            })?;
            adapter = adapter.with_failure_rate(rate)?;
        }

        if let Some(value) = settings.extra.get("capabilities") {
            let services: Vec<String> = serde_json::from_value(value.clone()).map_err(|e| {
                VerificationError::configuration(format!("'{}': capabilities must be a list: {}", name, e), vec![])
            })?;
            let mut capabilities = CapabilitySet::empty();
            for service in services {
                let service: ServiceType = service
                    .parse()
                    .map_err(|e: String| VerificationError::configuration(format!("'{}': {}", name, e), vec![]))?;
                capabilities.insert(service);
            }
            adapter.capabilities = capabilities;
        }

        if let Some(ready) = settings.extra.get("ready").and_then(|v| v.as_bool()) {
            adapter.set_ready(ready);
        }

        Ok(adapter)
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Result<Self, VerificationError> {
        if !(0.0..=1.0).contains(&rate) {
            return Err(VerificationError::configuration(
                format!("'{}': failure-rate must be between 0 and 1, got {}", self.name, rate),
                vec![],
            ));
        }
        self.failure_rate = rate;
        Ok(self)
    }

    pub fn not_ready(self) -> Self {
        self.set_ready(false);
        self
    }

    pub fn set_ready(&self, ready: bool) {
        debug!(name = %self.name, ready, "SimulatedAdapter::set_ready: called");
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Call `n` (0-based) fails when it crosses an integer boundary of `n * rate`
    fn should_fail(&self, n: u64) -> bool {
        let before = (n as f64 * self.failure_rate).floor();
        let after = ((n + 1) as f64 * self.failure_rate).floor();
        after > before
    }
}

#[async_trait]
impl VerificationAdapter for SimulatedAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn capabilities(&self) -> CapabilitySet {
        self.capabilities
    }

    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResponse, VerificationError> {
        debug!(name = %self.name, operation = %request.qualified_operation(), "SimulatedAdapter::verify: called");
        if !self.capabilities.contains(request.service) || request.operation != DEFAULT_OPERATION {
            return Err(VerificationError::not_implemented(request.qualified_operation()));
        }
        if !self.is_ready() {
            return Err(VerificationError::NotReady {
                name: self.name.clone(),
            });
        }

        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let reference = format!("{}-{:06}", self.name, n + 1);
        if self.should_fail(n) {
            debug!(%reference, "SimulatedAdapter::verify: simulated failure");
            return Ok(VerificationResponse::failure(&self.name, "Record not found")
                .with_meta(json!({ "reference": reference, "simulated": true })));
        }

        Ok(VerificationResponse::success(
            &self.name,
            json!({
                "service": request.service,
                "reference": reference,
                "fields": request.fields,
            }),
        )
        .with_message("Verification successful")
        .with_meta(json!({ "simulated": true })))
    }
}
