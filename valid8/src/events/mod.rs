//! Event Bus for verification observability
//!
//! Every verification, adapter lifecycle change, and timing measurement is
//! described by an [`Event`]. Callers emit events onto an explicitly
//! constructed [`EventBus`]; the metrics collector, dashboard provider, and
//! event logger attach wildcard listeners.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        EVENT BUS                             │
//! │   emit → enrich (id, timestamp) → history ring → listeners   │
//! └─────────────────────────────────────────────────────────────┘
//!         ↑                    ↑                        ↑
//!  VerificationClient   VerificationManager     MetricsCollector
//!  - request.sent       - adapter.initialized   - metrics.collected
//!  - response.received  - adapter.fallback
//!  - verification.*     - adapter.switched
//!
//!         ↓                    ↓                        ↓
//! ┌────────────────┐   ┌────────────────┐   ┌────────────────────┐
//! │ MetricsCollector│   │ EventLogger    │   │ DashboardProvider  │
//! │ counters/latency│   │ tracing output │   │ activity/timeline  │
//! └────────────────┘   └────────────────┘   └────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use valid8::events::{EventBus, EventType, Topic, VerificationEventData, ServiceType, VerificationStatus};
//!
//! let bus = EventBus::with_default_history();
//! let sub = bus.on(Topic::Any, |event| println!("{}", event.event_type));
//! bus.emit(
//!     EventType::VerificationCompleted,
//!     VerificationEventData::new("prembly", ServiceType::Nin, VerificationStatus::Success).with_duration(150),
//! );
//! sub.unsubscribe();
//! ```

mod bus;
mod logger;
mod types;

pub(crate) use bus::panic_message;
pub use bus::{DEFAULT_MAX_HISTORY_SIZE, EventBus, EventStatistics, Listener, Subscription, Topic, create_event_bus};
pub use logger::{EventFormatter, EventLogger, event_level, format_event, should_log};
pub use types::{
    AdapterEventData, CheckStatus, Event, EventContext, EventError, EventPayload, EventType, HealthCheck,
    HealthCheckEventData, MetricsEventData, MetricsPeriod, MetricsSummary, PerformanceEventData, ServiceType,
    VerificationEventData, VerificationStatus, generate_event_id,
};
