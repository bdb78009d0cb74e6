//! Error taxonomy shared by every adapter operation.
//!
//! Every failure carries enough context for an operator to diagnose it: the
//! HTTP status (when a provider answered) and the raw provider body.

use http::StatusCode;
use serde_json::Value;

use crate::model::ProviderId;

/// Errors raised by adapter, registry and configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum SwitchError {
    /// Local, pre-network validation failure (bad amount, currency or missing field).
    #[error("validation failed: {message}")]
    Validation {
        /// Human-readable description.
        message: String,
        /// The offending field, if known (e.g. `"customer.email"`).
        field: Option<String>,
    },

    /// The authentication exchange itself failed.
    #[error("authentication failed: {message}")]
    Authentication {
        /// Human-readable description.
        message: String,
        /// Status returned by the authentication endpoint, if any.
        status: Option<StatusCode>,
        /// Raw body returned by the authentication endpoint, if any.
        raw: Option<Value>,
    },

    /// Network failure or timeout on any exchange.
    #[error("HTTP error: {context}: {source}")]
    Transport {
        /// Human-readable context (e.g. `"POST /payments/v1/sessions"`).
        context: &'static str,
        /// The underlying reqwest error.
        #[source]
        source: reqwest::Error,
    },

    /// A business endpoint answered outside the 2xx range.
    #[error("{message} (HTTP {status})")]
    Payment {
        /// Human-readable description.
        message: String,
        /// The HTTP status code.
        status: StatusCode,
        /// The decoded response body.
        raw: Value,
    },

    /// Signature mismatch (or missing signature) on an inbound notification.
    #[error("webhook verification failed: {message}")]
    WebhookVerification {
        /// Human-readable description.
        message: String,
    },

    /// No constructor is registered for the requested provider key.
    #[error("no adapter registered for provider '{0}'")]
    ProviderNotFound(ProviderId),

    /// Invalid or incomplete configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The provider has no endpoint for the requested operation.
    #[error("{operation} is not supported by provider '{provider}'")]
    UnsupportedOperation {
        /// The provider that rejected the operation.
        provider: ProviderId,
        /// The contract operation name.
        operation: &'static str,
    },

    /// A 2xx response could not be decoded into the canonical model.
    #[error("failed to decode provider response: {context}: {message}")]
    Decode {
        /// Human-readable context.
        context: &'static str,
        /// What was missing or malformed.
        message: String,
        /// The raw body that failed to decode.
        raw: Value,
    },
}

impl SwitchError {
    /// Creates a validation error without a field reference.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a payment error from a non-2xx response.
    #[must_use]
    pub fn payment(message: impl Into<String>, status: StatusCode, raw: Value) -> Self {
        Self::Payment {
            message: message.into(),
            status,
            raw,
        }
    }

    /// Creates an authentication error.
    #[must_use]
    pub fn authentication(
        message: impl Into<String>,
        status: Option<StatusCode>,
        raw: Option<Value>,
    ) -> Self {
        Self::Authentication {
            message: message.into(),
            status,
            raw,
        }
    }

    /// Creates a webhook verification error.
    #[must_use]
    pub fn webhook(message: impl Into<String>) -> Self {
        Self::WebhookVerification {
            message: message.into(),
        }
    }

    /// Creates an unsupported-operation error.
    #[must_use]
    pub const fn unsupported(provider: ProviderId, operation: &'static str) -> Self {
        Self::UnsupportedOperation {
            provider,
            operation,
        }
    }

    /// Creates a decode error for a response body.
    #[must_use]
    pub fn decode(context: &'static str, message: impl Into<String>, raw: Value) -> Self {
        Self::Decode {
            context,
            message: message.into(),
            raw,
        }
    }

    /// Returns the HTTP status associated with this error, if any.
    #[must_use]
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Self::Payment { status, .. } => Some(*status),
            Self::Authentication { status, .. } => *status,
            Self::Transport { source, .. } => source.status(),
            _ => None,
        }
    }

    /// Returns the raw provider body attached to this error, if any.
    #[must_use]
    pub const fn raw_response(&self) -> Option<&Value> {
        match self {
            Self::Payment { raw, .. } | Self::Decode { raw, .. } => Some(raw),
            Self::Authentication { raw, .. } => raw.as_ref(),
            _ => None,
        }
    }

    /// Returns `true` if this is a transport error caused by a timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { source, .. } if source.is_timeout())
    }

    /// Returns `true` for local validation failures.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_payment_error_exposes_status_and_body() {
        let err = SwitchError::payment(
            "payment initiation failed",
            StatusCode::BAD_REQUEST,
            json!({"error": "Invalid request"}),
        );
        assert_eq!(err.status_code(), Some(StatusCode::BAD_REQUEST));
        assert_eq!(err.raw_response(), Some(&json!({"error": "Invalid request"})));
        assert_eq!(err.to_string(), "payment initiation failed (HTTP 400 Bad Request)");
    }

    #[test]
    fn test_validation_error_has_no_status() {
        let err = SwitchError::invalid_field("customer.email", "email is required");
        assert!(err.is_validation());
        assert!(err.status_code().is_none());
        assert!(err.raw_response().is_none());
    }

    #[test]
    fn test_unsupported_message_names_provider() {
        let err = SwitchError::unsupported(ProviderId::new("paystack"), "cancel_transaction");
        assert_eq!(
            err.to_string(),
            "cancel_transaction is not supported by provider 'paystack'"
        );
    }
}
