//! Wire-level message types exchanged with the broker, including the core
//! identifiers used to address entities and settle locked messages.

use crate::error::ValidationError;
use bytes::Bytes;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Maximum length of a queue or topic name
pub const MAX_ENTITY_NAME_LENGTH: usize = 260;

/// Maximum length of a subscription name
pub const MAX_SUBSCRIPTION_NAME_LENGTH: usize = 50;

/// Validated name of a queue, topic or subscription
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityName(String);

impl EntityName {
    /// Create new queue or topic name with validation
    pub fn new(name: String) -> Result<Self, ValidationError> {
        Self::validate(name, "entity_name", MAX_ENTITY_NAME_LENGTH)
    }

    /// Create new subscription name with validation
    pub fn subscription(name: String) -> Result<Self, ValidationError> {
        Self::validate(name, "subscription_name", MAX_SUBSCRIPTION_NAME_LENGTH)
    }

    fn validate(name: String, field: &str, max_len: usize) -> Result<Self, ValidationError> {
        if name.is_empty() || name.len() > max_len {
            return Err(ValidationError::OutOfRange {
                field: field.to_string(),
                message: format!("must be 1-{} characters", max_len),
            });
        }

        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
        {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                message: "only ASCII alphanumeric, hyphens, underscores, periods and slashes allowed"
                    .to_string(),
            });
        }

        let starts_ok = name.starts_with(|c: char| c.is_ascii_alphanumeric());
        let ends_ok = name.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !starts_ok || !ends_ok {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                message: "must start and end with a letter or digit".to_string(),
            });
        }

        Ok(Self(name))
    }

    /// Get entity name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EntityName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Unique identifier for messages within the broker
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Generate new random message ID
    pub fn new() -> Self {
        let id = uuid::Uuid::new_v4();
        Self(id.simple().to_string())
    }

    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token identifying the broker-side lock held on a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockToken(String);

impl LockToken {
    /// Generate new random lock token
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    /// Get lock token as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for LockToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Timestamp wrapper for consistent time handling
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Create timestamp for current time
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Create timestamp from DateTime
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Get underlying DateTime
    pub fn as_datetime(&self) -> DateTime<Utc> {
        self.0
    }

    /// Timestamp offset from this one, saturating at the representable range
    pub fn plus(&self, duration: Duration) -> Self {
        let bound = if duration < Duration::zero() {
            DateTime::<Utc>::MIN_UTC
        } else {
            DateTime::<Utc>::MAX_UTC
        };
        Self(self.0.checked_add_signed(duration).unwrap_or(bound))
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S UTC"))
    }
}

impl FromStr for Timestamp {
    type Err = chrono::ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let dt = s.parse::<DateTime<Utc>>()?;
        Ok(Self::from_datetime(dt))
    }
}

// ============================================================================
// Application Properties
// ============================================================================

/// A single value in the broker's flat property bag
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Double(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    /// Explicit marker for a value that is absent; the bag cannot omit a key
    /// and still say "present but undefined"
    Null,
}

impl PropertyValue {
    /// Check if value is the null marker
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// Flat, string-keyed property bag carried on every wire message
pub type ApplicationProperties = HashMap<String, PropertyValue>;

// ============================================================================
// Message Types
// ============================================================================

/// A message to be sent to a queue or topic
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceBusMessage {
    pub body: Bytes,
    pub content_type: Option<String>,
    pub correlation_id: Option<String>,
    pub subject: Option<String>,
    /// Assigned by the broker when left empty
    pub message_id: Option<MessageId>,
    pub application_properties: ApplicationProperties,
}

impl ServiceBusMessage {
    /// Create new message with body
    pub fn new(body: Bytes) -> Self {
        Self {
            body,
            content_type: None,
            correlation_id: None,
            subject: None,
            message_id: None,
            application_properties: ApplicationProperties::new(),
        }
    }

    /// Set the body content type
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Add correlation ID for tracking
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Set the subject (label) of the message
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Set an explicit message ID
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Add an application property
    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.application_properties.insert(key.into(), value.into());
        self
    }
}

/// A message delivered by the broker, holding a lock in peek-lock mode
#[derive(Debug, Clone)]
pub struct ServiceBusReceivedMessage {
    pub message_id: MessageId,
    pub body: Bytes,
    pub content_type: Option<String>,
    pub correlation_id: Option<String>,
    pub subject: Option<String>,
    /// Messages produced by foreign senders may carry no bag at all
    pub application_properties: Option<ApplicationProperties>,
    /// Absent for messages received in receive-and-delete mode
    pub lock_token: Option<LockToken>,
    pub locked_until: Option<Timestamp>,
    pub delivery_count: u32,
    pub enqueued_at: Timestamp,
    pub dead_letter_reason: Option<String>,
    pub dead_letter_description: Option<String>,
}

impl ServiceBusReceivedMessage {
    /// Check if the lock held on this message has expired
    pub fn is_lock_expired(&self) -> bool {
        match &self.locked_until {
            Some(locked_until) => Timestamp::now() >= *locked_until,
            None => false,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
