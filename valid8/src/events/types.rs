//! Event types for verification activity streaming
//!
//! These events represent all observable activity around verification:
//! - Verification lifecycle (started, completed, failed, retry)
//! - Per-service verification markers (NIN, BVN, CAC, ...)
//! - Adapter lifecycle (initialized, error, switched, fallback)
//! - Performance (request sent, response received, rate limit, timeout)
//! - Monitoring (health checks, periodic metrics)

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Closed vocabulary of event types carried by the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventType {
    // === Verification Lifecycle ===
    #[serde(rename = "verification.started")]
    VerificationStarted,
    #[serde(rename = "verification.completed")]
    VerificationCompleted,
    #[serde(rename = "verification.failed")]
    VerificationFailed,
    #[serde(rename = "verification.retry")]
    VerificationRetry,

    // === Service Specific ===
    #[serde(rename = "nin.verification")]
    NinVerification,
    #[serde(rename = "bvn.verification")]
    BvnVerification,
    #[serde(rename = "voters_card.verification")]
    VotersCardVerification,
    #[serde(rename = "passport.verification")]
    PassportVerification,
    #[serde(rename = "tin.verification")]
    TinVerification,
    #[serde(rename = "vehicle.verification")]
    VehicleVerification,
    #[serde(rename = "cac.verification")]
    CacVerification,
    #[serde(rename = "phone.verification")]
    PhoneVerification,
    #[serde(rename = "bank_account.verification")]
    BankAccountVerification,
    #[serde(rename = "credit_bureau.verification")]
    CreditBureauVerification,

    // === Adapter Lifecycle ===
    #[serde(rename = "adapter.initialized")]
    AdapterInitialized,
    #[serde(rename = "adapter.error")]
    AdapterError,
    #[serde(rename = "adapter.switched")]
    AdapterSwitched,
    #[serde(rename = "adapter.fallback")]
    AdapterFallback,

    // === Performance ===
    #[serde(rename = "request.sent")]
    RequestSent,
    #[serde(rename = "response.received")]
    ResponseReceived,
    #[serde(rename = "rate_limit.hit")]
    RateLimitHit,
    #[serde(rename = "timeout.occurred")]
    TimeoutOccurred,

    // === Monitoring ===
    #[serde(rename = "health.check")]
    HealthCheck,
    #[serde(rename = "metrics.collected")]
    MetricsCollected,
}

impl EventType {
    /// Every event type, in declaration order
    pub const ALL: [EventType; 24] = [
        EventType::VerificationStarted,
        EventType::VerificationCompleted,
        EventType::VerificationFailed,
        EventType::VerificationRetry,
        EventType::NinVerification,
        EventType::BvnVerification,
        EventType::VotersCardVerification,
        EventType::PassportVerification,
        EventType::TinVerification,
        EventType::VehicleVerification,
        EventType::CacVerification,
        EventType::PhoneVerification,
        EventType::BankAccountVerification,
        EventType::CreditBureauVerification,
        EventType::AdapterInitialized,
        EventType::AdapterError,
        EventType::AdapterSwitched,
        EventType::AdapterFallback,
        EventType::RequestSent,
        EventType::ResponseReceived,
        EventType::RateLimitHit,
        EventType::TimeoutOccurred,
        EventType::HealthCheck,
        EventType::MetricsCollected,
    ];

    /// Dotted wire name, e.g. `verification.completed`
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::VerificationStarted => "verification.started",
            EventType::VerificationCompleted => "verification.completed",
            EventType::VerificationFailed => "verification.failed",
            EventType::VerificationRetry => "verification.retry",
            EventType::NinVerification => "nin.verification",
            EventType::BvnVerification => "bvn.verification",
            EventType::VotersCardVerification => "voters_card.verification",
            EventType::PassportVerification => "passport.verification",
            EventType::TinVerification => "tin.verification",
            EventType::VehicleVerification => "vehicle.verification",
            EventType::CacVerification => "cac.verification",
            EventType::PhoneVerification => "phone.verification",
            EventType::BankAccountVerification => "bank_account.verification",
            EventType::CreditBureauVerification => "credit_bureau.verification",
            EventType::AdapterInitialized => "adapter.initialized",
            EventType::AdapterError => "adapter.error",
            EventType::AdapterSwitched => "adapter.switched",
            EventType::AdapterFallback => "adapter.fallback",
            EventType::RequestSent => "request.sent",
            EventType::ResponseReceived => "response.received",
            EventType::RateLimitHit => "rate_limit.hit",
            EventType::TimeoutOccurred => "timeout.occurred",
            EventType::HealthCheck => "health.check",
            EventType::MetricsCollected => "metrics.collected",
        }
    }

    /// True for every type whose name denotes a verification domain event
    pub fn is_verification(&self) -> bool {
        self.as_str().contains("verification")
    }

    /// Verification events that represent an outcome rather than a
    /// `started`/`retry` marker
    pub fn is_verification_outcome(&self) -> bool {
        self.is_verification() && !matches!(self, EventType::VerificationStarted | EventType::VerificationRetry)
    }

    /// The per-service event type for a service
    pub fn for_service(service: ServiceType) -> Self {
        match service {
            ServiceType::Nin => EventType::NinVerification,
            ServiceType::Bvn => EventType::BvnVerification,
            ServiceType::VotersCard => EventType::VotersCardVerification,
            ServiceType::Passport => EventType::PassportVerification,
            ServiceType::Tin => EventType::TinVerification,
            ServiceType::Vehicle => EventType::VehicleVerification,
            ServiceType::Cac => EventType::CacVerification,
            ServiceType::Phone => EventType::PhoneVerification,
            ServiceType::BankAccount => EventType::BankAccountVerification,
            ServiceType::CreditBureau => EventType::CreditBureauVerification,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::ALL
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| format!("unknown event type '{}'", s))
    }
}

/// Verification service families
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceType {
    Nin,
    Bvn,
    VotersCard,
    Passport,
    Tin,
    Vehicle,
    Cac,
    Phone,
    BankAccount,
    CreditBureau,
}

impl ServiceType {
    pub const ALL: [ServiceType; 10] = [
        ServiceType::Nin,
        ServiceType::Bvn,
        ServiceType::VotersCard,
        ServiceType::Passport,
        ServiceType::Tin,
        ServiceType::Vehicle,
        ServiceType::Cac,
        ServiceType::Phone,
        ServiceType::BankAccount,
        ServiceType::CreditBureau,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceType::Nin => "nin",
            ServiceType::Bvn => "bvn",
            ServiceType::VotersCard => "voters_card",
            ServiceType::Passport => "passport",
            ServiceType::Tin => "tin",
            ServiceType::Vehicle => "vehicle",
            ServiceType::Cac => "cac",
            ServiceType::Phone => "phone",
            ServiceType::BankAccount => "bank_account",
            ServiceType::CreditBureau => "credit_bureau",
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ServiceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        ServiceType::ALL
            .iter()
            .find(|t| t.as_str() == normalized)
            .copied()
            .ok_or_else(|| format!("unknown service type '{}'", s))
    }
}

/// Outcome status reported on verification events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    Processing,
    Success,
    Failed,
    Timeout,
    RateLimited,
    InvalidData,
}

impl VerificationStatus {
    /// Statuses counted as failures by the metrics aggregator
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            VerificationStatus::Failed | VerificationStatus::Timeout | VerificationStatus::InvalidData
        )
    }

    /// Statuses counted as still in flight
    pub fn is_pending(&self) -> bool {
        matches!(self, VerificationStatus::Pending | VerificationStatus::Processing)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::Processing => "processing",
            VerificationStatus::Success => "success",
            VerificationStatus::Failed => "failed",
            VerificationStatus::Timeout => "timeout",
            VerificationStatus::RateLimited => "rate_limited",
            VerificationStatus::InvalidData => "invalid_data",
        }
    }
}

impl fmt::Display for VerificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error details attached to a failed verification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventError {
    pub code: String,
    pub message: String,
}

/// Payload for verification lifecycle and per-service events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationEventData {
    pub adapter: String,
    pub service_type: ServiceType,
    pub status: VerificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<EventError>,
}

impl VerificationEventData {
    pub fn new(adapter: impl Into<String>, service_type: ServiceType, status: VerificationStatus) -> Self {
        Self {
            adapter: adapter.into(),
            service_type,
            status,
            duration_ms: None,
            request_data: None,
            response_data: None,
            error: None,
        }
    }

    pub fn with_duration(mut self, duration_ms: u64) -> Self {
        self.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error = Some(EventError {
            code: code.into(),
            message: message.into(),
        });
        self
    }
}

/// Payload for adapter lifecycle events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterEventData {
    pub adapter: String,
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_adapter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AdapterEventData {
    pub fn new(adapter: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            adapter: adapter.into(),
            action: action.into(),
            previous_adapter: None,
            reason: None,
        }
    }

    pub fn with_previous(mut self, previous: impl Into<String>) -> Self {
        self.previous_adapter = Some(previous.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Payload for request/response timing events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEventData {
    pub adapter: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceType>,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl PerformanceEventData {
    pub fn new(adapter: impl Into<String>, service_type: Option<ServiceType>, duration_ms: u64) -> Self {
        Self {
            adapter: adapter.into(),
            service_type,
            duration_ms,
            request_size: None,
            response_size: None,
            status_code: None,
            endpoint: None,
        }
    }
}

/// Overall figures carried by a `metrics.collected` event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_response_time: f64,
    pub error_rate: f64,
    pub uptime_ms: u64,
}

/// Time window covered by a metrics emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsPeriod {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Payload for periodic metrics emission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEventData {
    pub adapter: String,
    pub metrics: MetricsSummary,
    pub period: MetricsPeriod,
}

/// Result of one health check probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheck {
    pub name: String,
    pub status: CheckStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Payload for adapter health check events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckEventData {
    pub adapter: String,
    pub is_healthy: bool,
    pub checks: Vec<HealthCheck>,
}

/// Event payload keyed by category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum EventPayload {
    Verification(VerificationEventData),
    Adapter(AdapterEventData),
    Performance(PerformanceEventData),
    Metrics(MetricsEventData),
    HealthCheck(HealthCheckEventData),
}

impl EventPayload {
    /// Name of the adapter the payload refers to
    pub fn adapter(&self) -> &str {
        match self {
            EventPayload::Verification(data) => &data.adapter,
            EventPayload::Adapter(data) => &data.adapter,
            EventPayload::Performance(data) => &data.adapter,
            EventPayload::Metrics(data) => &data.adapter,
            EventPayload::HealthCheck(data) => &data.adapter,
        }
    }

    pub fn as_verification(&self) -> Option<&VerificationEventData> {
        match self {
            EventPayload::Verification(data) => Some(data),
            _ => None,
        }
    }

    pub fn as_performance(&self) -> Option<&PerformanceEventData> {
        match self {
            EventPayload::Performance(data) => Some(data),
            _ => None,
        }
    }

    /// Service type, when the payload carries one
    pub fn service_type(&self) -> Option<ServiceType> {
        match self {
            EventPayload::Verification(data) => Some(data.service_type),
            EventPayload::Performance(data) => data.service_type,
            _ => None,
        }
    }

    /// Duration in milliseconds, when the payload carries one
    pub fn duration_ms(&self) -> Option<u64> {
        match self {
            EventPayload::Verification(data) => data.duration_ms,
            EventPayload::Performance(data) => Some(data.duration_ms),
            _ => None,
        }
    }
}

impl From<VerificationEventData> for EventPayload {
    fn from(data: VerificationEventData) -> Self {
        EventPayload::Verification(data)
    }
}

impl From<AdapterEventData> for EventPayload {
    fn from(data: AdapterEventData) -> Self {
        EventPayload::Adapter(data)
    }
}

impl From<PerformanceEventData> for EventPayload {
    fn from(data: PerformanceEventData) -> Self {
        EventPayload::Performance(data)
    }
}

impl From<MetricsEventData> for EventPayload {
    fn from(data: MetricsEventData) -> Self {
        EventPayload::Metrics(data)
    }
}

impl From<HealthCheckEventData> for EventPayload {
    fn from(data: HealthCheckEventData) -> Self {
        EventPayload::HealthCheck(data)
    }
}

/// Caller-supplied base fields for an emission
///
/// Anything left as `None` is filled in by the bus; `event_id` and
/// `timestamp` are always present on the emitted [`Event`].
#[derive(Debug, Clone, Default)]
pub struct EventContext {
    pub event_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub environment: Option<String>,
    pub user_id: Option<String>,
    pub session_id: Option<String>,
    pub correlation_id: Option<String>,
    pub metadata: BTreeMap<String, Value>,
}

impl EventContext {
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// An enriched event as delivered to listeners and kept in history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub event_type: EventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    pub payload: EventPayload,
}

impl Event {
    /// Build an event from a payload and caller context, generating the
    /// id and timestamp when the context leaves them out
    pub fn enrich(event_type: EventType, payload: EventPayload, context: EventContext) -> Self {
        Self {
            event_id: context.event_id.unwrap_or_else(generate_event_id),
            timestamp: context.timestamp.unwrap_or_else(Utc::now),
            event_type,
            environment: context.environment,
            user_id: context.user_id,
            session_id: context.session_id,
            correlation_id: context.correlation_id,
            metadata: context.metadata,
            payload,
        }
    }

    pub fn adapter(&self) -> &str {
        self.payload.adapter()
    }
}

/// Generate a process-unique event id (`evt_<uuid-v7>`)
pub fn generate_event_id() -> String {
    format!("evt_{}", uuid::Uuid::now_v7().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_wire_names_round_trip() {
        for event_type in EventType::ALL {
            let json = serde_json::to_string(&event_type).unwrap();
            assert_eq!(json, format!("\"{}\"", event_type.as_str()));
            assert_eq!(event_type.as_str().parse::<EventType>().unwrap(), event_type);
        }
    }

    #[test]
    fn test_verification_classification() {
        assert!(EventType::VerificationCompleted.is_verification_outcome());
        assert!(EventType::NinVerification.is_verification_outcome());
        assert!(EventType::VerificationStarted.is_verification());
        assert!(!EventType::VerificationStarted.is_verification_outcome());
        assert!(!EventType::VerificationRetry.is_verification_outcome());
        assert!(!EventType::ResponseReceived.is_verification());
        assert!(!EventType::MetricsCollected.is_verification());
    }

    #[test]
    fn test_for_service_maps_to_service_event() {
        assert_eq!(EventType::for_service(ServiceType::Cac), EventType::CacVerification);
        assert_eq!(
            EventType::for_service(ServiceType::BankAccount).as_str(),
            "bank_account.verification"
        );
    }

    #[test]
    fn test_service_type_parse_accepts_dashes() {
        assert_eq!("voters-card".parse::<ServiceType>().unwrap(), ServiceType::VotersCard);
        assert_eq!("NIN".parse::<ServiceType>().unwrap(), ServiceType::Nin);
        assert!("ssn".parse::<ServiceType>().is_err());
    }

    #[test]
    fn test_status_classes() {
        assert!(VerificationStatus::Timeout.is_failure());
        assert!(VerificationStatus::InvalidData.is_failure());
        assert!(VerificationStatus::Processing.is_pending());
        assert!(!VerificationStatus::RateLimited.is_failure());
        assert!(!VerificationStatus::RateLimited.is_pending());
    }

    #[test]
    fn test_enrich_generates_id_and_timestamp() {
        let payload: EventPayload = VerificationEventData::new("x", ServiceType::Nin, VerificationStatus::Success).into();
        let a = Event::enrich(EventType::VerificationCompleted, payload.clone(), EventContext::default());
        let b = Event::enrich(EventType::VerificationCompleted, payload, EventContext::default());
        assert!(a.event_id.starts_with("evt_"));
        assert_ne!(a.event_id, b.event_id);
        assert!(a.timestamp <= b.timestamp);
    }

    #[test]
    fn test_enrich_keeps_caller_supplied_base_fields() {
        let ts = Utc::now() - chrono::Duration::minutes(3);
        let context = EventContext {
            event_id: Some("evt_custom".to_string()),
            timestamp: Some(ts),
            ..Default::default()
        }
        .with_correlation_id("req-1");
        let payload: EventPayload = AdapterEventData::new("x", "initialized").into();
        let event = Event::enrich(EventType::AdapterInitialized, payload, context);
        assert_eq!(event.event_id, "evt_custom");
        assert_eq!(event.timestamp, ts);
        assert_eq!(event.correlation_id.as_deref(), Some("req-1"));
    }

    #[test]
    fn test_payload_serializes_with_category_tag() {
        let payload: EventPayload = VerificationEventData::new("prembly", ServiceType::Bvn, VerificationStatus::Failed)
            .with_error("VERIFICATION_FAILED", "record not found")
            .into();
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["category"], "verification");
        assert_eq!(json["service_type"], "bvn");
        assert_eq!(json["status"], "failed");
        assert_eq!(json["error"]["message"], "record not found");
        assert!(json.get("duration_ms").is_none());
    }

    #[test]
    fn test_payload_accessors() {
        let perf: EventPayload = PerformanceEventData::new("a", Some(ServiceType::Phone), 42).into();
        assert_eq!(perf.adapter(), "a");
        assert_eq!(perf.service_type(), Some(ServiceType::Phone));
        assert_eq!(perf.duration_ms(), Some(42));
        assert!(perf.as_verification().is_none());
        assert!(perf.as_performance().is_some());
    }
}
