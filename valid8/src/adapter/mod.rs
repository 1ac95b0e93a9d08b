//! Verification adapters
//!
//! An adapter is a pluggable provider implementation. The registry only
//! depends on [`VerificationAdapter::is_ready`] and the capability set; the
//! client additionally calls [`VerificationAdapter::verify`].

use async_trait::async_trait;

mod error;
mod simulated;
mod types;

pub use error::VerificationError;
pub use simulated::SimulatedAdapter;
pub use types::{Capability, CapabilitySet, DEFAULT_OPERATION, VerificationRequest, VerificationResponse};

use crate::events::ServiceType;

/// A provider that can answer verification requests
///
/// Capabilities are queried once when the adapter is registered, so an
/// implementation must report a fixed set.
#[async_trait]
pub trait VerificationAdapter: Send + Sync {
    /// Provider name reported in responses
    fn name(&self) -> &str;

    /// Whether the adapter is configured and able to take requests
    fn is_ready(&self) -> bool;

    /// Services this adapter serves
    fn capabilities(&self) -> CapabilitySet;

    fn supports(&self, service: ServiceType) -> bool {
        self.capabilities().contains(service)
    }

    /// Run one verification
    ///
    /// Adapters that decline an operation return
    /// [`VerificationError::NotImplemented`].
    async fn verify(&self, request: VerificationRequest) -> Result<VerificationResponse, VerificationError> {
        Err(VerificationError::not_implemented(request.qualified_operation()))
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tracing::debug;

    /// Mock adapter for unit tests; readiness can be flipped at runtime
    pub struct MockAdapter {
        name: String,
        ready: AtomicBool,
        capabilities: CapabilitySet,
        call_count: AtomicUsize,
    }

    impl MockAdapter {
        pub fn new(name: &str) -> Self {
            debug!(%name, "MockAdapter::new: called");
            Self {
                name: name.to_string(),
                ready: AtomicBool::new(true),
                capabilities: CapabilitySet::all(),
                call_count: AtomicUsize::new(0),
            }
        }

        pub fn not_ready(name: &str) -> Self {
            let adapter = Self::new(name);
            adapter.set_ready(false);
            adapter
        }

        pub fn with_capabilities(mut self, capabilities: CapabilitySet) -> Self {
            self.capabilities = capabilities;
            self
        }

        pub fn set_ready(&self, ready: bool) {
            self.ready.store(ready, Ordering::SeqCst);
        }

        pub fn call_count(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl VerificationAdapter for MockAdapter {
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
            debug!(name = %self.name, "MockAdapter::verify: called");
            self.call_count.fetch_add(1, Ordering::SeqCst);
            match request.fields.get("outcome").and_then(|v| v.as_str()) {
                Some("fail") => Ok(VerificationResponse::failure(&self.name, "mock failure")),
                Some("error") => Err(VerificationError::failed(&self.name, "mock error")),
                _ => Ok(VerificationResponse::success(&self.name, serde_json::json!({ "mock": true }))),
            }
        }
    }

    /// Adapter that relies on the trait's default `verify`
    pub struct DecliningAdapter;

    #[async_trait]
    impl VerificationAdapter for DecliningAdapter {
        fn name(&self) -> &str {
            "declining"
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn capabilities(&self) -> CapabilitySet {
            CapabilitySet::all()
        }
    }
}
