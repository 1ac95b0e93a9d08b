//! Event Logger - writes bus events as structured tracing records
//!
//! The EventLogger attaches a wildcard listener and turns every event into
//! one log line at a level derived from the event type:
//! failures and errors at ERROR, fallbacks and retries at WARN,
//! started/sent markers at DEBUG, everything else at INFO.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tracing::{Level, debug, error, info, warn};

use super::bus::{EventBus, Subscription, Topic};
use super::types::{Event, EventPayload, EventType};

/// Custom one-line formatter for a specific event type
pub type EventFormatter = Arc<dyn Fn(&Event) -> String + Send + Sync>;

/// Level an event is logged at
pub fn event_level(event_type: EventType) -> Level {
    let name = event_type.as_str();
    if name.contains("failed") || name.contains("error") {
        Level::ERROR
    } else if name.contains("fallback") || name.contains("retry") {
        Level::WARN
    } else if name.contains("started") || name.contains("sent") {
        Level::DEBUG
    } else {
        Level::INFO
    }
}

/// Whether an event at `level` passes a `minimum` threshold
///
/// `tracing` orders levels by verbosity (ERROR < WARN < INFO < DEBUG), so an
/// event passes when it is no more verbose than the threshold.
pub fn should_log(level: Level, minimum: Level) -> bool {
    level <= minimum
}

/// Default one-line rendering: `[type] | ID: .. | Adapter: .. | ...`
pub fn format_event(event: &Event) -> String {
    let mut parts = vec![format!("[{}]", event.event_type), format!("ID: {}", event.event_id)];
    parts.push(format!("Adapter: {}", event.adapter()));
    if let Some(service) = event.payload.service_type() {
        parts.push(format!("Service: {}", service));
    }
    if let Some(duration) = event.payload.duration_ms() {
        parts.push(format!("Duration: {}ms", duration));
    }
    if let EventPayload::Verification(data) = &event.payload {
        parts.push(format!("Status: {}", data.status));
        if let Some(err) = &data.error {
            parts.push(format!("Error: {} ({})", err.message, err.code));
        }
    }
    parts.join(" | ")
}

/// Structured logger for bus events
pub struct EventLogger {
    subscription: Mutex<Option<Subscription>>,
    minimum: Level,
}

impl EventLogger {
    /// Attach a logger to the bus that drops records more verbose than `minimum`
    pub fn new(bus: &EventBus, minimum: Level) -> Self {
        Self::with_formatters(bus, minimum, HashMap::new())
    }

    /// Attach a logger that renders some event types with custom formatters
    pub fn with_formatters(bus: &EventBus, minimum: Level, formatters: HashMap<EventType, EventFormatter>) -> Self {
        debug!(?minimum, custom = formatters.len(), "EventLogger::new: attaching to bus");
        let subscription = bus.on(Topic::Any, move |event| {
            let level = event_level(event.event_type);
            if !should_log(level, minimum) {
                return;
            }
            let message = match formatters.get(&event.event_type) {
                Some(formatter) => formatter(event),
                None => format_event(event),
            };
            log_at(level, event, &message);
        });
        Self {
            subscription: Mutex::new(Some(subscription)),
            minimum,
        }
    }

    pub fn minimum_level(&self) -> Level {
        self.minimum
    }

    /// Detach from the bus. Idempotent.
    pub fn destroy(&self) {
        debug!("EventLogger::destroy: called");
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(subscription) = subscription {
            subscription.unsubscribe();
        }
    }
}

fn log_at(level: Level, event: &Event, message: &str) {
    let event_type = event.event_type.as_str();
    let event_id = event.event_id.as_str();
    let adapter = event.adapter();
    match level {
        Level::ERROR => error!(event_type, event_id, adapter, "{}", message),
        Level::WARN => warn!(event_type, event_id, adapter, "{}", message),
        Level::INFO => info!(event_type, event_id, adapter, "{}", message),
        _ => debug!(event_type, event_id, adapter, "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::types::{
        AdapterEventData, EventContext, PerformanceEventData, ServiceType, VerificationEventData, VerificationStatus,
    };

    #[test]
    fn test_event_levels() {
        assert_eq!(event_level(EventType::VerificationFailed), Level::ERROR);
        assert_eq!(event_level(EventType::AdapterError), Level::ERROR);
        assert_eq!(event_level(EventType::AdapterFallback), Level::WARN);
        assert_eq!(event_level(EventType::VerificationRetry), Level::WARN);
        assert_eq!(event_level(EventType::VerificationStarted), Level::DEBUG);
        assert_eq!(event_level(EventType::RequestSent), Level::DEBUG);
        assert_eq!(event_level(EventType::VerificationCompleted), Level::INFO);
        assert_eq!(event_level(EventType::MetricsCollected), Level::INFO);
    }

    #[test]
    fn test_should_log_threshold() {
        assert!(should_log(Level::ERROR, Level::INFO));
        assert!(should_log(Level::INFO, Level::INFO));
        assert!(!should_log(Level::DEBUG, Level::INFO));
        assert!(should_log(Level::DEBUG, Level::DEBUG));
        assert!(!should_log(Level::INFO, Level::WARN));
    }

    #[test]
    fn test_format_verification_event() {
        let payload = VerificationEventData::new("prembly", ServiceType::Nin, VerificationStatus::Failed)
            .with_duration(120)
            .with_error("VERIFICATION_FAILED", "no record");
        let event = Event::enrich(
            EventType::VerificationFailed,
            payload.into(),
            EventContext {
                event_id: Some("evt_1".to_string()),
                ..Default::default()
            },
        );
        assert_eq!(
            format_event(&event),
            "[verification.failed] | ID: evt_1 | Adapter: prembly | Service: nin | Duration: 120ms | Status: failed | Error: no record (VERIFICATION_FAILED)"
        );
    }

    #[test]
    fn test_format_performance_event_without_service() {
        let event = Event::enrich(
            EventType::ResponseReceived,
            PerformanceEventData::new("a", None, 7).into(),
            EventContext::default(),
        );
        let line = format_event(&event);
        assert!(line.starts_with("[response.received]"));
        assert!(line.contains("Duration: 7ms"));
        assert!(!line.contains("Service:"));
    }

    #[test]
    fn test_custom_formatter_and_destroy() {
        let bus = EventBus::new(10);
        let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let c = calls.clone();
        let mut formatters: HashMap<EventType, EventFormatter> = HashMap::new();
        formatters.insert(
            EventType::AdapterSwitched,
            Arc::new(move |event: &Event| {
                c.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                format!("switched to {}", event.adapter())
            }),
        );
        let logger = EventLogger::with_formatters(&bus, Level::INFO, formatters);
        assert_eq!(bus.listener_count(Topic::Any), 1);

        bus.emit(EventType::AdapterSwitched, AdapterEventData::new("b", "switched"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);

        logger.destroy();
        logger.destroy();
        assert_eq!(bus.listener_count(Topic::Any), 0);
    }
}
