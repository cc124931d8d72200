//! Broker client seams.
//!
//! The transport talks to the broker only through these traits. A client
//! hands out one [`MessageSender`] per queue or topic and one
//! [`MessageReceiver`] per queue or subscription; the in-memory broker in
//! [`crate::providers`] is the bundled implementation.

use crate::endpoint::Endpoint;
use crate::error::QueueError;
use crate::message::{EntityName, ServiceBusMessage, ServiceBusReceivedMessage};
use async_trait::async_trait;
use chrono::Duration;
use std::fmt;

#[cfg(test)]
use mockall::automock;

/// How the broker treats messages handed to a receiver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiveMode {
    /// Message is locked for the receiver and must be settled explicitly
    PeekLock,
    /// Message is removed from the entity as soon as it is delivered
    ReceiveAndDelete,
}

impl fmt::Display for ReceiveMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeekLock => write!(f, "peekLock"),
            Self::ReceiveAndDelete => write!(f, "receiveAndDelete"),
        }
    }
}

/// Optional details recorded on a dead-lettered message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeadLetterOptions {
    pub reason: Option<String>,
    pub description: Option<String>,
}

impl DeadLetterOptions {
    /// Dead-letter with a reason
    pub fn with_reason(reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            description: None,
        }
    }

    /// Add a longer description
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// Connected broker client able to open senders and receivers
#[cfg_attr(test, automock)]
pub trait ServiceBusClient: Send + Sync {
    /// Open a sender for a queue or topic
    fn create_sender(&self, entity: &EntityName) -> Result<Box<dyn MessageSender>, QueueError>;

    /// Open a receiver for a queue or a topic subscription
    fn create_receiver(
        &self,
        source: &Endpoint,
        mode: ReceiveMode,
    ) -> Result<Box<dyn MessageReceiver>, QueueError>;
}

/// Sends messages to one queue or topic
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Send single message
    async fn send_message(&self, message: ServiceBusMessage) -> Result<(), QueueError>;

    /// Queue or topic this sender is bound to
    fn entity(&self) -> &EntityName;
}

/// Receives and settles messages from one queue or subscription
#[cfg_attr(test, automock)]
#[async_trait]
pub trait MessageReceiver: Send + Sync {
    /// Receive up to `max_messages`, waiting at most `max_wait` for the first
    async fn receive_messages(
        &self,
        max_messages: u32,
        max_wait: Duration,
    ) -> Result<Vec<ServiceBusReceivedMessage>, QueueError>;

    /// Delete a locked message permanently
    async fn complete_message(&self, message: &ServiceBusReceivedMessage) -> Result<(), QueueError>;

    /// Release the lock so the message can be redelivered
    async fn abandon_message(&self, message: &ServiceBusReceivedMessage) -> Result<(), QueueError>;

    /// Move a locked message to the dead-letter sub-queue
    async fn dead_letter_message(
        &self,
        message: &ServiceBusReceivedMessage,
        options: Option<DeadLetterOptions>,
    ) -> Result<(), QueueError>;

    /// Receive mode the receiver was opened with
    fn receive_mode(&self) -> ReceiveMode;
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
