//! Errors raised by adapters and adapter resolution

use thiserror::Error;

fn join_names(names: &[String]) -> String {
    if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    }
}

/// Errors from adapter lookup, readiness, and verification calls
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("Adapter '{name}' not found. Available adapters: {}", join_names(.available))]
    AdapterNotFound { name: String, available: Vec<String> },

    #[error("Adapter '{name}' is not ready")]
    NotReady { name: String },

    #[error("{message}. Available adapters: {}", join_names(.available))]
    Configuration { message: String, available: Vec<String> },

    #[error("Verification failed via '{provider}': {message}")]
    VerificationFailed { provider: String, message: String },

    #[error("Not implemented: {operation}")]
    NotImplemented { operation: String },
}

impl VerificationError {
    pub fn configuration(message: impl Into<String>, available: Vec<String>) -> Self {
        Self::Configuration {
            message: message.into(),
            available,
        }
    }

    pub fn not_implemented(operation: impl Into<String>) -> Self {
        Self::NotImplemented {
            operation: operation.into(),
        }
    }

    pub fn failed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::VerificationFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Self::AdapterNotFound { .. } => "ADAPTER_NOT_FOUND",
            Self::NotReady { .. } => "NOT_READY",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::VerificationFailed { .. } => "VERIFICATION_FAILED",
            Self::NotImplemented { .. } => "METHOD_NOT_IMPLEMENTED",
        }
    }

    /// Readiness failures are a kind of misconfiguration
    pub fn is_configuration_error(&self) -> bool {
        matches!(self, Self::NotReady { .. } | Self::Configuration { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_list_available_adapters() {
        let err = VerificationError::AdapterNotFound {
            name: "missing".to_string(),
            available: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(err.to_string(), "Adapter 'missing' not found. Available adapters: a, b");

        let err = VerificationError::configuration("No default adapter configured", vec![]);
        assert_eq!(err.to_string(), "No default adapter configured. Available adapters: none");
    }

    #[test]
    fn test_codes_and_classification() {
        let not_ready = VerificationError::NotReady { name: "x".to_string() };
        assert_eq!(not_ready.code(), "NOT_READY");
        assert!(not_ready.is_configuration_error());

        let not_found = VerificationError::AdapterNotFound {
            name: "x".to_string(),
            available: vec![],
        };
        assert!(!not_found.is_configuration_error());

        assert_eq!(VerificationError::not_implemented("nin.verify_with_face").code(), "METHOD_NOT_IMPLEMENTED");
        assert_eq!(VerificationError::failed("p", "boom").code(), "VERIFICATION_FAILED");
    }
}
