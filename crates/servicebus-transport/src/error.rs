//! Error types for transport and broker operations.

use chrono::Duration;
use std::fmt;
use thiserror::Error;

/// Errors surfaced by the transport adapter to the host framework
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Transport operation '{operation}' failed: {source}")]
    OperationFailed {
        operation: TransportOperation,
        #[source]
        source: QueueError,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Transport used before prepare() supplied its dependencies")]
    NotPrepared,

    #[error("Persistence not configured")]
    PersistenceNotConfigured,
}

impl TransportError {
    /// Wrap a broker failure with the operation that produced it
    pub fn operation(operation: TransportOperation, source: QueueError) -> Self {
        Self::OperationFailed { operation, source }
    }

    /// Remediation hint for errors the caller can fix
    pub fn help(&self) -> Option<&'static str> {
        match self {
            Self::PersistenceNotConfigured => Some(
                "Ensure that Bus.configure().withPersistence() has been called prior to initialization",
            ),
            Self::NotPrepared => {
                Some("Call prepare() with the core dependencies before using the transport")
            }
            Self::Configuration(ConfigurationError::MissingEndpoint) => {
                Some("Set queue_name, or topic_name together with subscription_name")
            }
            _ => None,
        }
    }

    /// Check if error is transient and the host may retry the operation
    pub fn is_transient(&self) -> bool {
        match self {
            Self::OperationFailed { source, .. } => source.is_transient(),
            Self::Configuration(_) => false,
            Self::Serialization(_) => false,
            Self::NotPrepared => false,
            Self::PersistenceNotConfigured => false,
        }
    }
}

/// Broker operations the adapter performs on behalf of the host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportOperation {
    Bind,
    Send,
    Receive,
    Complete,
    Abandon,
    DeadLetter,
}

impl fmt::Display for TransportOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bind => write!(f, "bind"),
            Self::Send => write!(f, "send"),
            Self::Receive => write!(f, "receive"),
            Self::Complete => write!(f, "complete"),
            Self::Abandon => write!(f, "abandon"),
            Self::DeadLetter => write!(f, "dead-letter"),
        }
    }
}

/// Errors reported by a broker client implementation
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Messaging entity not found: {entity}")]
    EntityNotFound { entity: String },

    #[error("Message lock lost or already settled: {lock_token}")]
    MessageLockLost { lock_token: String },

    #[error("Operation '{operation}' is not supported in {mode} receive mode")]
    UnsupportedReceiveMode { operation: String, mode: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Entity '{entity}' is full ({max_size} messages)")]
    QuotaExceeded { entity: String, max_size: usize },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },

    #[error("Validation error: {0}")]
    ValidationError(#[from] ValidationError),
}

impl QueueError {
    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::EntityNotFound { .. } => false,
            Self::MessageLockLost { .. } => false,
            Self::UnsupportedReceiveMode { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::MessageTooLarge { .. } => false,
            Self::QuotaExceeded { .. } => true,
            Self::ProviderError { .. } => true,
            Self::ValidationError(_) => false,
        }
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout { .. } => Some(Duration::seconds(1)),
            Self::ConnectionFailed { .. } => Some(Duration::seconds(5)),
            Self::QuotaExceeded { .. } => Some(Duration::seconds(10)),
            _ => None,
        }
    }
}

/// Errors during message body serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Message of type '{message_type}' could not be converted to a payload: {message}")]
    InvalidPayload {
        message_type: String,
        message: String,
    },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Queue or Topic Name (together with Subscription name) should be set.")]
    MissingEndpoint,

    #[error("Invalid configuration for {key}: {source}")]
    InvalidName {
        key: String,
        #[source]
        source: ValidationError,
    },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
