//! Operational dashboard
//!
//! [`DashboardProvider`] listens to the bus and keeps a bounded recent
//! activity feed. [`DashboardProvider::get_dashboard_data`] derives the rest
//! on demand: headline totals, per-service rows, per-adapter health, the
//! latest metrics snapshot, and a 5-minute event timeline.

use std::time::Duration;

mod data;
mod provider;

pub use data::{
    AdapterHealthStatus, DashboardData, DashboardSummary, RecentActivity, ServiceStatusSummary, TIMELINE_BUCKET,
    TIMELINE_MAX_BUCKETS, TimelineBucket, UNHEALTHY_ERROR_RATE,
};
pub use provider::{DashboardCallback, DashboardProvider, DashboardStream, DashboardSubscription};

/// Recent activity entries kept by default
pub const DEFAULT_HISTORY_SIZE: usize = 100;
/// Default period of `metrics.collected` emission
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(60);
/// Default page size for activity queries
pub const DEFAULT_ACTIVITY_LIMIT: usize = 20;
