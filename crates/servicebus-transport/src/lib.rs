//! # Service Bus Transport
//!
//! Transport adapter that binds a host message-bus framework to Azure
//! Service Bus style queues, topics and subscriptions.
//!
//! This library provides:
//! - Endpoint resolution from configuration (queue, or topic + subscription)
//! - Peek-lock receive of exactly one message at a time, with complete,
//!   abandon and dead-letter settlement
//! - Two-tier message attributes carried in the broker's flat property bag
//! - An in-memory broker for tests and local development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for transport and broker operations
//! - [`message`] - Wire messages and broker identifiers
//! - [`config`] - Transport configuration and layered loading
//! - [`client`] - Broker client traits
//! - [`endpoint`] - Endpoint resolution and binding
//! - [`lifecycle`] - Receive and settlement of locked messages
//! - [`attributes`] - Attribute codec for the property bag
//! - [`outbound`] - Outbound message composition
//! - [`host`] - Host framework contract
//! - [`transport`] - The Service Bus transport
//! - [`providers`] - Broker client implementations

pub mod attributes;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod host;
pub mod lifecycle;
pub mod message;
pub mod outbound;
pub mod providers;
pub mod transport;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root for convenience
pub use attributes::AttributeTier;
pub use client::{DeadLetterOptions, MessageReceiver, MessageSender, ReceiveMode, ServiceBusClient};
pub use config::{InMemoryConfig, ServiceBusTransportConfiguration, DEFAULT_WAIT_TIME_MS};
pub use endpoint::{BoundEndpoint, Endpoint};
pub use error::{
    ConfigurationError, QueueError, SerializationError, TransportError, TransportOperation,
    ValidationError,
};
pub use host::{
    AttributeMap, AttributeValue, Command, CoreDependencies, Event, JsonMessageSerializer, Message,
    MessageAttributes, MessageSerializer, Persistence, Transport, TransportMessage,
};
pub use lifecycle::{LockState, MessageLifecycle};
pub use message::{
    ApplicationProperties, EntityName, LockToken, MessageId, PropertyValue, ServiceBusMessage,
    ServiceBusReceivedMessage, Timestamp,
};
pub use providers::InMemoryServiceBus;
pub use transport::ServiceBusTransport;

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
