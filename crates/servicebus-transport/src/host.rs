//! Host message-bus framework contract.
//!
//! These are the types a host bus hands to, and receives from, a transport:
//! domain messages, the two-tier [`MessageAttributes`] record, the
//! [`TransportMessage`] wrapper around a received message, and the
//! [`Transport`] trait itself.

use crate::error::{SerializationError, TransportError};
use crate::message::MessageId;
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::hash_map;
use std::collections::HashMap;
use std::sync::Arc;

// ============================================================================
// Domain Messages
// ============================================================================

/// A domain message the bus can send or publish
pub trait Message: Serialize + Send + Sync {
    /// Fully qualified message type name, carried as the wire subject
    fn name(&self) -> &str;
}

/// A message sent to a single logical handler
pub trait Command: Message {}

/// A message published to every interested subscriber
pub trait Event: Message {}

// ============================================================================
// Message Attributes
// ============================================================================

/// Primitive value of a single attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for AttributeValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// One tier of message attributes.
///
/// A key may be present without a value ("absent"); absence is preserved
/// through the wire encoding rather than collapsed into a missing key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeMap(HashMap<String, Option<AttributeValue>>);

impl AttributeMap {
    /// Create empty attribute map
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, key: impl Into<String>, value: impl Into<AttributeValue>) -> Self {
        self.insert(key, value);
        self
    }

    /// Insert a value
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), Some(value.into()));
    }

    /// Insert a key whose value is absent
    pub fn insert_absent(&mut self, key: impl Into<String>) {
        self.0.insert(key.into(), None);
    }

    /// Insert a possibly-absent value
    pub fn set(&mut self, key: impl Into<String>, value: Option<AttributeValue>) {
        self.0.insert(key.into(), value);
    }

    /// Value for a key; `None` for both missing and absent keys
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key).and_then(Option::as_ref)
    }

    /// Check if key is present, with or without a value
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Check if key is present with an absent value
    pub fn is_absent(&self, key: &str) -> bool {
        matches!(self.0.get(key), Some(None))
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<Option<AttributeValue>> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over keys and possibly-absent values
    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&AttributeValue>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_ref()))
    }
}

impl FromIterator<(String, Option<AttributeValue>)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (String, Option<AttributeValue>)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for AttributeMap {
    type Item = (String, Option<AttributeValue>);
    type IntoIter = hash_map::IntoIter<String, Option<AttributeValue>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Attributes travelling alongside a message
///
/// `attributes` apply to the message they are attached to;
/// `sticky_attributes` are meant to be copied onto every message sent while
/// handling it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAttributes {
    pub correlation_id: Option<String>,
    pub attributes: AttributeMap,
    pub sticky_attributes: AttributeMap,
}

impl MessageAttributes {
    /// Create empty attributes
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the correlation ID
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Add a transient attribute
    pub fn with_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.attributes.insert(key, value);
        self
    }

    /// Add a sticky attribute
    pub fn with_sticky_attribute(
        mut self,
        key: impl Into<String>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.sticky_attributes.insert(key, value);
        self
    }
}

// ============================================================================
// Received Messages
// ============================================================================

/// A message read from the transport, wrapping the broker's raw message
///
/// Settling the message (`delete_message`, `return_message`, `fail`) consumes
/// it, so a raw message and its lock cannot be used after settlement.
#[derive(Debug, Clone)]
pub struct TransportMessage<R> {
    pub id: MessageId,
    pub raw: R,
    pub domain_message: serde_json::Value,
    pub attributes: MessageAttributes,
}

impl<R> TransportMessage<R> {
    /// Deserialize the domain message into a concrete type
    pub fn domain_message_as<T: DeserializeOwned>(&self) -> Result<T, SerializationError> {
        Ok(serde_json::from_value(self.domain_message.clone())?)
    }
}

// ============================================================================
// Core Dependencies
// ============================================================================

/// Converts message payloads to and from wire bodies
pub trait MessageSerializer: Send + Sync {
    /// Serialize a payload into a body
    fn serialize(&self, payload: &serde_json::Value) -> Result<Bytes, SerializationError>;

    /// Deserialize a body into a payload
    fn deserialize(&self, body: &[u8]) -> Result<serde_json::Value, SerializationError>;

    /// MIME type of bodies produced by `serialize`
    fn content_type(&self) -> &str;
}

/// JSON body serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMessageSerializer;

impl MessageSerializer for JsonMessageSerializer {
    fn serialize(&self, payload: &serde_json::Value) -> Result<Bytes, SerializationError> {
        Ok(Bytes::from(serde_json::to_vec(payload)?))
    }

    fn deserialize(&self, body: &[u8]) -> Result<serde_json::Value, SerializationError> {
        Ok(serde_json::from_slice(body)?)
    }

    fn content_type(&self) -> &str {
        "application/json"
    }
}

/// Storage for long-running workflow state
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Prepare the store for use
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Release any resources held by the store
    async fn dispose(&self) -> Result<(), TransportError>;
}

/// Dependencies supplied by the host bus through [`Transport::prepare`]
#[derive(Clone)]
pub struct CoreDependencies {
    serializer: Arc<dyn MessageSerializer>,
    persistence: Option<Arc<dyn Persistence>>,
}

impl Default for CoreDependencies {
    fn default() -> Self {
        Self {
            serializer: Arc::new(JsonMessageSerializer),
            persistence: None,
        }
    }
}

impl std::fmt::Debug for CoreDependencies {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreDependencies")
            .field("content_type", &self.serializer.content_type())
            .field("persistence_configured", &self.persistence.is_some())
            .finish()
    }
}

impl CoreDependencies {
    /// Dependencies with the JSON serializer and no persistence
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the message serializer
    pub fn with_serializer(mut self, serializer: Arc<dyn MessageSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Configure workflow persistence
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Message serializer
    pub fn serializer(&self) -> &dyn MessageSerializer {
        self.serializer.as_ref()
    }

    /// Workflow persistence, failing fast when none was configured
    pub fn persistence(&self) -> Result<Arc<dyn Persistence>, TransportError> {
        self.persistence
            .clone()
            .ok_or(TransportError::PersistenceNotConfigured)
    }
}

// ============================================================================
// Transport Contract
// ============================================================================

/// Contract between the host bus and a message transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Broker message type carried in [`TransportMessage::raw`]
    type Raw: Send + Sync;

    /// Receive the host's dependencies; called once before `initialize`
    fn prepare(&mut self, dependencies: CoreDependencies);

    /// Start the transport
    async fn initialize(&self) -> Result<(), TransportError>;

    /// Send a command
    async fn send<C>(
        &self,
        command: &C,
        attributes: Option<&MessageAttributes>,
    ) -> Result<(), TransportError>
    where
        C: Command;

    /// Publish an event
    async fn publish<E>(
        &self,
        event: &E,
        attributes: Option<&MessageAttributes>,
    ) -> Result<(), TransportError>
    where
        E: Event;

    /// Read the next message, or `None` if none arrived in time
    async fn read_next_message(
        &self,
    ) -> Result<Option<TransportMessage<Self::Raw>>, TransportError>;

    /// Remove a processed message permanently
    async fn delete_message(
        &self,
        message: TransportMessage<Self::Raw>,
    ) -> Result<(), TransportError>;

    /// Return a message to the queue for redelivery
    async fn return_message(
        &self,
        message: TransportMessage<Self::Raw>,
    ) -> Result<(), TransportError>;

    /// Move a message that cannot be processed to the dead-letter queue
    async fn fail(&self, message: TransportMessage<Self::Raw>) -> Result<(), TransportError>;
}

#[cfg(test)]
#[path = "host_tests.rs"]
mod tests;
