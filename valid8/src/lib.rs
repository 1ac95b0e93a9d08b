//! valid8 - KYC/KYB verification routing
//!
//! Routes verification requests (NIN, BVN, CAC, passport, ...) to pluggable
//! provider adapters and derives operational views from the resulting
//! event stream.
//!
//! # Modules
//!
//! - [`events`] - Typed event bus with bounded per-type history
//! - [`metrics`] - Per-adapter, per-service metrics aggregation
//! - [`adapter`] - Adapter trait, request/response envelope, simulated adapter
//! - [`manager`] - Adapter registry with priority-based fallback
//! - [`client`] - Resolve, call, and report one verification
//! - [`dashboard`] - Activity feed, health, timeline, and live push
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod adapter;
pub mod cli;
pub mod client;
pub mod config;
pub mod dashboard;
pub mod events;
pub mod manager;
pub mod metrics;

// Re-export commonly used types
pub use adapter::{
    Capability, CapabilitySet, SimulatedAdapter, VerificationAdapter, VerificationError, VerificationRequest,
    VerificationResponse,
};
pub use client::VerificationClient;
pub use config::{AdapterConfig, AdapterSettings, Config, DashboardConfig, EventBusConfig, ManagerConfig};
pub use dashboard::{DashboardData, DashboardProvider, DashboardStream, DashboardSubscription, RecentActivity};
pub use events::{
    Event, EventBus, EventLogger, EventType, ServiceType, Subscription, Topic, VerificationEventData,
    VerificationStatus,
};
pub use manager::{AdapterFactory, VerificationManager};
pub use metrics::{MetricsCollector, MetricsSnapshot};
