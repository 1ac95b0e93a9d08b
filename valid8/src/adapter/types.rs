//! Request, response, and capability types shared by all adapters

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::events::ServiceType;

/// A verification service an adapter can serve
pub type Capability = ServiceType;

/// Default operation name for a service's required method
pub const DEFAULT_OPERATION: &str = "verify";

/// Set of services an adapter supports, fixed when the adapter is registered
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u16);

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        ServiceType::ALL.iter().copied().collect()
    }

    fn bit(service: ServiceType) -> u16 {
        1 << (service as u16)
    }

    pub fn with(mut self, service: ServiceType) -> Self {
        self.insert(service);
        self
    }

    pub fn insert(&mut self, service: ServiceType) {
        self.0 |= Self::bit(service);
    }

    pub fn remove(&mut self, service: ServiceType) {
        self.0 &= !Self::bit(service);
    }

    pub fn contains(&self, service: ServiceType) -> bool {
        self.0 & Self::bit(service) != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Services in declaration order
    pub fn iter(&self) -> impl Iterator<Item = ServiceType> + '_ {
        ServiceType::ALL.iter().copied().filter(|s| self.contains(*s))
    }
}

impl FromIterator<ServiceType> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = ServiceType>>(iter: I) -> Self {
        let mut set = Self::empty();
        for service in iter {
            set.insert(service);
        }
        set
    }
}

impl fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|s| s.as_str()).collect();
        write!(f, "{}", names.join(","))
    }
}

impl Serialize for CapabilitySet {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for CapabilitySet {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let services = Vec::<ServiceType>::deserialize(deserializer)?;
        Ok(services.into_iter().collect())
    }
}

/// One verification call
///
/// `operation` selects among a service's methods (`verify` is the required
/// one; e.g. `verify_with_face` is optional). Vendor-specific inputs travel
/// in `fields`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub service: ServiceType,
    pub operation: String,
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
}

impl VerificationRequest {
    pub fn new(service: ServiceType) -> Self {
        Self {
            service,
            operation: DEFAULT_OPERATION.to_string(),
            fields: BTreeMap::new(),
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// `service.operation`, used in logs and NotImplemented errors
    pub fn qualified_operation(&self) -> String {
        format!("{}.{}", self.service, self.operation)
    }

    /// Approximate payload size in bytes
    pub fn size(&self) -> u64 {
        serde_json::to_vec(&self.fields).map(|v| v.len() as u64).unwrap_or(0)
    }
}

/// Uniform response envelope returned by every adapter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    /// Raw vendor response
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
}

impl VerificationResponse {
    pub fn success(provider: impl Into<String>, data: Value) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            error: None,
            provider: provider.into(),
            timestamp: Utc::now(),
            meta: None,
        }
    }

    pub fn failure(provider: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            message: None,
            error: Some(error.into()),
            provider: provider.into(),
            timestamp: Utc::now(),
            meta: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }

    /// Approximate payload size in bytes
    pub fn size(&self) -> u64 {
        self.data
            .as_ref()
            .and_then(|d| serde_json::to_vec(d).ok())
            .map(|v| v.len() as u64)
            .unwrap_or(0)
    }
}
