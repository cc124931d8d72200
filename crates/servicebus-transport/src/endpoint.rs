//! Endpoint resolution.
//!
//! The transport is bound once, at construction, either to a queue or to a
//! subscription under a topic. A configuration naming neither shape fully is
//! rejected; there is no partially bound transport.

use crate::client::{MessageReceiver, MessageSender, ReceiveMode, ServiceBusClient};
use crate::config::ServiceBusTransportConfiguration;
use crate::error::{ConfigurationError, QueueError};
use crate::message::EntityName;
use std::fmt;

/// Where the transport sends to and receives from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Send to and receive from the same queue
    Queue(EntityName),
    /// Send to the topic, receive from one of its subscriptions
    Subscription {
        topic: EntityName,
        subscription: EntityName,
    },
}

impl Endpoint {
    /// Resolve the endpoint named by a configuration.
    ///
    /// A queue name takes precedence; otherwise both topic and subscription
    /// names are required. Empty names count as unset.
    pub fn resolve(
        configuration: &ServiceBusTransportConfiguration,
    ) -> Result<Self, ConfigurationError> {
        let queue_name = non_empty(&configuration.queue_name);
        let topic_name = non_empty(&configuration.topic_name);
        let subscription_name = non_empty(&configuration.subscription_name);

        if let Some(queue_name) = queue_name {
            let queue = EntityName::new(queue_name.to_string()).map_err(|source| {
                ConfigurationError::InvalidName {
                    key: "queue_name".to_string(),
                    source,
                }
            })?;
            return Ok(Self::Queue(queue));
        }

        match (topic_name, subscription_name) {
            (Some(topic_name), Some(subscription_name)) => {
                let topic = EntityName::new(topic_name.to_string()).map_err(|source| {
                    ConfigurationError::InvalidName {
                        key: "topic_name".to_string(),
                        source,
                    }
                })?;
                let subscription = EntityName::subscription(subscription_name.to_string())
                    .map_err(|source| ConfigurationError::InvalidName {
                        key: "subscription_name".to_string(),
                        source,
                    })?;
                Ok(Self::Subscription {
                    topic,
                    subscription,
                })
            }
            _ => Err(ConfigurationError::MissingEndpoint),
        }
    }

    /// Queue or topic that outbound messages go to
    pub fn sender_entity(&self) -> &EntityName {
        match self {
            Self::Queue(queue) => queue,
            Self::Subscription { topic, .. } => topic,
        }
    }

    /// Broker path of the entity messages are received from
    pub fn receive_path(&self) -> String {
        match self {
            Self::Queue(queue) => queue.to_string(),
            Self::Subscription {
                topic,
                subscription,
            } => format!("{}/subscriptions/{}", topic, subscription),
        }
    }

    /// Open the sender and peek-lock receiver for this endpoint
    pub fn bind(&self, client: &dyn ServiceBusClient) -> Result<BoundEndpoint, QueueError> {
        let receiver = client.create_receiver(self, ReceiveMode::PeekLock)?;
        let sender = client.create_sender(self.sender_entity())?;

        tracing::debug!(
            sender = %self.sender_entity(),
            receiver = %self.receive_path(),
            "Bound transport endpoint"
        );

        Ok(BoundEndpoint { sender, receiver })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.receive_path())
    }
}

/// Sender and receiver opened for an [`Endpoint`]
pub struct BoundEndpoint {
    pub sender: Box<dyn MessageSender>,
    pub receiver: Box<dyn MessageReceiver>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

#[cfg(test)]
#[path = "endpoint_tests.rs"]
mod tests;
