//! VerificationClient - resolves an adapter, calls it, and reports to the bus
//!
//! Each request produces `request.sent`, then `response.received` (or
//! `timeout.occurred`), then exactly one of `verification.completed` /
//! `verification.failed`. All events of one request share a correlation id.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::adapter::{VerificationAdapter, VerificationError, VerificationRequest, VerificationResponse};
use crate::events::{
    EventBus, EventContext, EventPayload, EventType, PerformanceEventData, VerificationEventData, VerificationStatus,
};
use crate::manager::VerificationManager;

/// Error code recorded when the adapter answers with `success: false`
pub const PROVIDER_REJECTED_CODE: &str = "VERIFICATION_FAILED";
/// Error code recorded when the adapter exceeds the client timeout
pub const TIMEOUT_CODE: &str = "TIMEOUT";

/// Runs verifications through the registry and emits lifecycle events
pub struct VerificationClient {
    manager: Arc<VerificationManager>,
    bus: Arc<EventBus>,
    timeout: Option<Duration>,
}

impl VerificationClient {
    pub fn new(manager: Arc<VerificationManager>, bus: Arc<EventBus>) -> Self {
        Self {
            manager,
            bus,
            timeout: None,
        }
    }

    /// Fail adapter calls that take longer than `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn manager(&self) -> &Arc<VerificationManager> {
        &self.manager
    }

    /// Verify with the best available adapter
    ///
    /// Resolution and capability errors are returned before any event is
    /// emitted. A provider answer with `success: false` is returned as `Ok`
    /// and reported as `verification.failed`.
    pub async fn verify(
        &self,
        request: VerificationRequest,
        preferred: Option<&str>,
    ) -> Result<VerificationResponse, VerificationError> {
        debug!(operation = %request.qualified_operation(), preferred = ?preferred, "VerificationClient::verify: called");

        // events are keyed by registration name so metrics line up with the registry
        let (name, adapter) = self.manager.resolve_adapter(preferred)?.ok_or_else(|| {
            VerificationError::configuration("No ready adapter available", self.manager.available_adapters())
        })?;
        if !adapter.supports(request.service) {
            return Err(VerificationError::not_implemented(format!(
                "{} on adapter '{}'",
                request.qualified_operation(),
                name
            )));
        }

        let service = request.service;
        let correlation_id = uuid::Uuid::now_v7().to_string();
        let context = || EventContext::default().with_correlation_id(correlation_id.clone());

        let mut sent = PerformanceEventData::new(&name, Some(service), 0);
        sent.request_size = Some(request.size());
        self.emit(EventType::RequestSent, sent, context());

        let started = Instant::now();
        let outcome = self.call(adapter.as_ref(), request).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(response) => {
                let mut received = PerformanceEventData::new(&name, Some(service), duration_ms);
                received.response_size = Some(response.size());
                self.emit(EventType::ResponseReceived, received, context());

                if response.success {
                    info!(adapter = %name, %service, duration_ms, "Verification completed");
                    let mut data = VerificationEventData::new(&name, service, VerificationStatus::Success)
                        .with_duration(duration_ms);
                    data.response_data = response.data.clone();
                    self.emit(EventType::VerificationCompleted, data, context());
                } else {
                    let message = response
                        .error
                        .clone()
                        .or_else(|| response.message.clone())
                        .unwrap_or_else(|| "Verification unsuccessful".to_string());
                    warn!(adapter = %name, %service, %message, "Verification rejected by provider");
                    let data = VerificationEventData::new(&name, service, VerificationStatus::Failed)
                        .with_duration(duration_ms)
                        .with_error(PROVIDER_REJECTED_CODE, message);
                    self.emit(EventType::VerificationFailed, data, context());
                }
                Ok(response)
            }
            Err(CallError::Timeout(limit)) => {
                warn!(adapter = %name, %service, limit_ms = limit.as_millis() as u64, "Verification timed out");
                self.emit(
                    EventType::TimeoutOccurred,
                    PerformanceEventData::new(&name, Some(service), duration_ms),
                    context(),
                );
                let message = format!("timed out after {}ms", limit.as_millis());
                let data = VerificationEventData::new(&name, service, VerificationStatus::Timeout)
                    .with_duration(duration_ms)
                    .with_error(TIMEOUT_CODE, message.clone());
                self.emit(EventType::VerificationFailed, data, context());
                Err(VerificationError::failed(name, message))
            }
            Err(CallError::Adapter(e)) => {
                warn!(adapter = %name, %service, error = %e, "Verification errored");
                let data = VerificationEventData::new(&name, service, VerificationStatus::Failed)
                    .with_duration(duration_ms)
                    .with_error(e.code(), e.to_string());
                self.emit(EventType::VerificationFailed, data, context());
                Err(e)
            }
        }
    }

    async fn call(
        &self,
        adapter: &dyn VerificationAdapter,
        request: VerificationRequest,
    ) -> Result<VerificationResponse, CallError> {
        match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, adapter.verify(request)).await {
                Ok(result) => result.map_err(CallError::Adapter),
                Err(_) => Err(CallError::Timeout(limit)),
            },
            None => adapter.verify(request).await.map_err(CallError::Adapter),
        }
    }

    fn emit(&self, event_type: EventType, payload: impl Into<EventPayload>, context: EventContext) {
        self.bus.emit_with_context(event_type, payload, context);
    }
}

enum CallError {
    Timeout(Duration),
    Adapter(VerificationError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::mock::MockAdapter;
    use crate::adapter::{CapabilitySet, SimulatedAdapter};
    use crate::events::ServiceType;

    fn setup(adapter: Arc<dyn VerificationAdapter>) -> (VerificationClient, Arc<EventBus>) {
        let bus = Arc::new(EventBus::new(100));
        bus.start_recording();
        let manager = Arc::new(VerificationManager::new());
        manager.register_adapter(adapter.name(), adapter.clone());
        manager.set_default_adapter(adapter.name()).unwrap();
        (VerificationClient::new(manager, bus.clone()), bus)
    }

    fn types(bus: &EventBus) -> Vec<EventType> {
        let mut events = bus.get_history(None);
        events.reverse();
        events.into_iter().map(|e| e.event_type).collect()
    }

    #[tokio::test]
    async fn test_success_emits_lifecycle() {
        let (client, bus) = setup(Arc::new(MockAdapter::new("mock")));
        let response = client.verify(VerificationRequest::new(ServiceType::Nin), None).await.unwrap();
        assert!(response.success);

        assert_eq!(
            types(&bus),
            vec![
                EventType::RequestSent,
                EventType::ResponseReceived,
                EventType::VerificationCompleted
            ]
        );

        let events = bus.get_history(None);
        let correlation = events[0].correlation_id.clone();
        assert!(correlation.is_some());
        assert!(events.iter().all(|e| e.correlation_id == correlation));
    }

    #[tokio::test]
    async fn test_provider_rejection_is_ok_but_reported_failed() {
        let (client, bus) = setup(Arc::new(MockAdapter::new("mock")));
        let response = client
            .verify(VerificationRequest::new(ServiceType::Bvn).with_field("outcome", "fail"), None)
            .await
            .unwrap();
        assert!(!response.success);

        let failed = bus.get_history(Some(EventType::VerificationFailed));
        assert_eq!(failed.len(), 1);
        let data = failed[0].payload.as_verification().unwrap();
        assert_eq!(data.status, VerificationStatus::Failed);
        assert_eq!(data.error.as_ref().unwrap().code, PROVIDER_REJECTED_CODE);
        assert!(bus.get_history(Some(EventType::VerificationCompleted)).is_empty());
    }

    #[tokio::test]
    async fn test_adapter_error_propagates_with_code() {
        let (client, bus) = setup(Arc::new(MockAdapter::new("mock")));
        let err = client
            .verify(VerificationRequest::new(ServiceType::Bvn).with_field("outcome", "error"), None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VERIFICATION_FAILED");

        assert_eq!(
            types(&bus),
            vec![EventType::RequestSent, EventType::VerificationFailed]
        );
    }

    #[tokio::test]
    async fn test_unsupported_service_emits_nothing() {
        let adapter = MockAdapter::new("mock").with_capabilities(CapabilitySet::empty().with(ServiceType::Nin));
        let (client, bus) = setup(Arc::new(adapter));
        let err = client.verify(VerificationRequest::new(ServiceType::Cac), None).await.unwrap_err();
        assert_eq!(err.code(), "METHOD_NOT_IMPLEMENTED");
        assert!(bus.get_history(None).is_empty());
    }

    #[tokio::test]
    async fn test_no_ready_adapter_is_configuration_error() {
        let bus = Arc::new(EventBus::new(100));
        let manager = Arc::new(VerificationManager::new());
        manager.set_fallback_enabled(true);
        manager.register_adapter("down", Arc::new(MockAdapter::not_ready("down")));
        let client = VerificationClient::new(manager, bus);

        let err = client.verify(VerificationRequest::new(ServiceType::Nin), None).await.unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_timeout_reports_timeout_status() {
        let slow = SimulatedAdapter::new("slow").with_latency(Duration::from_secs(30));
        let (client, bus) = setup(Arc::new(slow));
        let client = client.with_timeout(Duration::from_millis(20));

        let err = client.verify(VerificationRequest::new(ServiceType::Nin), None).await.unwrap_err();
        assert_eq!(err.code(), "VERIFICATION_FAILED");

        assert_eq!(
            types(&bus),
            vec![EventType::RequestSent, EventType::TimeoutOccurred, EventType::VerificationFailed]
        );
        let failed = bus.get_history(Some(EventType::VerificationFailed));
        let data = failed[0].payload.as_verification().unwrap();
        assert_eq!(data.status, VerificationStatus::Timeout);
        assert_eq!(data.error.as_ref().unwrap().code, TIMEOUT_CODE);
    }

    #[tokio::test]
    async fn test_preferred_adapter_is_used() {
        let bus = Arc::new(EventBus::new(100));
        let manager = Arc::new(VerificationManager::new());
        let a = Arc::new(MockAdapter::new("a"));
        let b = Arc::new(MockAdapter::new("b"));
        manager.register_adapter("a", a.clone());
        manager.register_adapter("b", b.clone());
        let client = VerificationClient::new(manager, bus);

        let response = client.verify(VerificationRequest::new(ServiceType::Nin), Some("b")).await.unwrap();
        assert_eq!(response.provider, "b");
        assert_eq!(b.call_count(), 1);
        assert_eq!(a.call_count(), 0);
    }

    #[tokio::test]
    async fn test_events_use_registration_name() {
        let bus = Arc::new(EventBus::new(100));
        bus.start_recording();
        let manager = Arc::new(VerificationManager::new());
        manager.register_adapter("Primary", Arc::new(MockAdapter::new("vendor-x")));
        manager.set_default_adapter("Primary").unwrap();
        let client = VerificationClient::new(manager.clone(), bus.clone());

        let response = client.verify(VerificationRequest::new(ServiceType::Nin), None).await.unwrap();
        assert_eq!(response.provider, "vendor-x");

        let completed = bus.get_history(Some(EventType::VerificationCompleted));
        let data = completed[0].payload.as_verification().unwrap();
        assert_eq!(data.adapter, "primary");
        assert!(manager.has_adapter(&data.adapter));
        let sent = bus.get_history(Some(EventType::RequestSent));
        assert_eq!(sent[0].payload.as_performance().unwrap().adapter, "primary");
    }
}
