//! In-memory Service Bus broker for testing and development.
//!
//! This module provides a broker that behaves like a Service Bus namespace:
//! - Queues are created on first use
//! - Topics are declared explicitly or by opening a subscription receiver,
//!   and fan out to every subscription registered on them
//! - Peek-lock receives hold a lock until settled or until it expires
//! - Abandoned messages past the maximum delivery count are dead-lettered
//!
//! A send to a topic with no subscriptions is accepted and dropped, as the
//! real broker does.

use crate::client::{
    DeadLetterOptions, MessageReceiver, MessageSender, ReceiveMode, ServiceBusClient,
};
use crate::config::InMemoryConfig;
use crate::endpoint::Endpoint;
use crate::error::QueueError;
use crate::message::{
    EntityName, LockToken, MessageId, ServiceBusMessage, ServiceBusReceivedMessage, Timestamp,
};
use async_trait::async_trait;
use chrono::Duration;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock, RwLockWriteGuard};
use tokio::sync::Notify;

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Dead-letter reason recorded when the delivery count is exhausted
pub const MAX_DELIVERY_COUNT_EXCEEDED: &str = "MaxDeliveryCountExceeded";

/// Upper bound on a single sleep while waiting for messages, so that expired
/// locks are picked up during long waits
const POLL_INTERVAL_MS: i64 = 100;

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// Thread-safe storage for all entities in the namespace
struct BrokerStorage {
    /// Queues and subscriptions, keyed by receive path
    entities: HashMap<String, InMemoryEntity>,
    /// Subscription paths registered on each topic
    topics: HashMap<String, HashSet<String>>,
    config: InMemoryConfig,
}

impl BrokerStorage {
    fn new(config: InMemoryConfig) -> Self {
        Self {
            entities: HashMap::new(),
            topics: HashMap::new(),
            config,
        }
    }

    fn get_or_create_entity(&mut self, path: &str) -> &mut InMemoryEntity {
        self.entities
            .entry(path.to_string())
            .or_insert_with(InMemoryEntity::new)
    }

    fn register_subscription(&mut self, topic: &str, path: &str) {
        self.topics
            .entry(topic.to_string())
            .or_default()
            .insert(path.to_string());
        self.get_or_create_entity(path);
    }

    /// Paths a send to `entity` lands in
    fn destinations(&self, entity: &str) -> Vec<String> {
        match self.topics.get(entity) {
            Some(subscriptions) => subscriptions.iter().cloned().collect(),
            None => vec![entity.to_string()],
        }
    }
}

/// Active, locked and dead-lettered messages of one queue or subscription
struct InMemoryEntity {
    messages: VecDeque<StoredMessage>,
    in_flight: HashMap<LockToken, InFlightMessage>,
    dead_letter: Vec<StoredMessage>,
}

impl InMemoryEntity {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            in_flight: HashMap::new(),
            dead_letter: Vec::new(),
        }
    }

    fn active_count(&self) -> usize {
        self.messages.len() + self.in_flight.len()
    }

    /// Put messages whose lock expired back in front of the queue
    fn reclaim_expired_locks(&mut self, max_delivery_count: u32) {
        let expired: Vec<LockToken> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| in_flight.is_expired())
            .map(|(token, _)| token.clone())
            .collect();

        for token in expired {
            if let Some(in_flight) = self.in_flight.remove(&token) {
                self.release(in_flight.message, max_delivery_count);
            }
        }
    }

    /// Make a message available again, or dead-letter it once its deliveries
    /// are used up
    fn release(&mut self, message: StoredMessage, max_delivery_count: u32) {
        if message.delivery_count >= max_delivery_count {
            self.dead_letter.push(message.dead_lettered(
                Some(MAX_DELIVERY_COUNT_EXCEEDED.to_string()),
                Some(format!(
                    "Message could not be consumed after {} delivery attempts",
                    max_delivery_count
                )),
            ));
        } else {
            self.messages.push_front(message);
        }
    }

    fn take_locked(
        &mut self,
        token: &LockToken,
        max_delivery_count: u32,
    ) -> Option<StoredMessage> {
        match self.in_flight.remove(token) {
            Some(in_flight) if !in_flight.is_expired() => Some(in_flight.message),
            Some(in_flight) => {
                // Lock already lapsed; the message is back in play
                self.release(in_flight.message, max_delivery_count);
                None
            }
            None => None,
        }
    }
}

/// A message stored in an entity with broker metadata
#[derive(Clone)]
struct StoredMessage {
    message: ServiceBusMessage,
    message_id: MessageId,
    enqueued_at: Timestamp,
    delivery_count: u32,
    dead_letter_reason: Option<String>,
    dead_letter_description: Option<String>,
}

impl StoredMessage {
    fn from_message(message: ServiceBusMessage) -> Self {
        let message_id = message.message_id.clone().unwrap_or_default();
        Self {
            message,
            message_id,
            enqueued_at: Timestamp::now(),
            delivery_count: 0,
            dead_letter_reason: None,
            dead_letter_description: None,
        }
    }

    fn dead_lettered(mut self, reason: Option<String>, description: Option<String>) -> Self {
        self.dead_letter_reason = reason;
        self.dead_letter_description = description;
        self
    }

    fn to_received(
        &self,
        lock_token: Option<LockToken>,
        locked_until: Option<Timestamp>,
    ) -> ServiceBusReceivedMessage {
        ServiceBusReceivedMessage {
            message_id: self.message_id.clone(),
            body: self.message.body.clone(),
            content_type: self.message.content_type.clone(),
            correlation_id: self.message.correlation_id.clone(),
            subject: self.message.subject.clone(),
            application_properties: Some(self.message.application_properties.clone()),
            lock_token,
            locked_until,
            delivery_count: self.delivery_count,
            enqueued_at: self.enqueued_at.clone(),
            dead_letter_reason: self.dead_letter_reason.clone(),
            dead_letter_description: self.dead_letter_description.clone(),
        }
    }
}

/// A message currently locked by a receiver
struct InFlightMessage {
    message: StoredMessage,
    locked_until: Timestamp,
}

impl InFlightMessage {
    fn is_expired(&self) -> bool {
        Timestamp::now() >= self.locked_until
    }
}

type SharedStorage = Arc<RwLock<BrokerStorage>>;

fn write_storage(
    storage: &SharedStorage,
) -> Result<RwLockWriteGuard<'_, BrokerStorage>, QueueError> {
    storage.write().map_err(|_| QueueError::ProviderError {
        provider: "InMemory".to_string(),
        code: "StoragePoisoned".to_string(),
        message: "broker storage lock poisoned".to_string(),
    })
}

// ============================================================================
// InMemoryServiceBus
// ============================================================================

/// In-memory Service Bus namespace
pub struct InMemoryServiceBus {
    storage: SharedStorage,
    notify: Arc<Notify>,
}

impl InMemoryServiceBus {
    /// Create new in-memory broker with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(BrokerStorage::new(config))),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Declare a topic; until then sends to the name land in a queue
    pub fn create_topic(&self, topic: &EntityName) {
        if let Ok(mut storage) = self.storage.write() {
            storage.topics.entry(topic.to_string()).or_default();
        }
    }

    /// Declare a subscription on a topic ahead of any receiver
    pub fn create_subscription(&self, topic: &EntityName, subscription: &EntityName) {
        let path = Endpoint::Subscription {
            topic: topic.clone(),
            subscription: subscription.clone(),
        }
        .receive_path();
        if let Ok(mut storage) = self.storage.write() {
            storage.register_subscription(topic.as_str(), &path);
        }
    }

    /// Number of messages in a queue or subscription that are not settled
    pub fn active_message_count(&self, path: &str) -> usize {
        self.storage
            .read()
            .ok()
            .and_then(|storage| storage.entities.get(path).map(InMemoryEntity::active_count))
            .unwrap_or(0)
    }

    /// Messages in the dead-letter sub-queue of a queue or subscription
    pub fn dead_letter_messages(&self, path: &str) -> Vec<ServiceBusReceivedMessage> {
        self.storage
            .read()
            .ok()
            .and_then(|storage| {
                storage.entities.get(path).map(|entity| {
                    entity
                        .dead_letter
                        .iter()
                        .map(|message| message.to_received(None, None))
                        .collect()
                })
            })
            .unwrap_or_default()
    }
}

impl Default for InMemoryServiceBus {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

impl ServiceBusClient for InMemoryServiceBus {
    fn create_sender(&self, entity: &EntityName) -> Result<Box<dyn MessageSender>, QueueError> {
        Ok(Box::new(InMemorySender {
            storage: Arc::clone(&self.storage),
            notify: Arc::clone(&self.notify),
            entity: entity.clone(),
        }))
    }

    fn create_receiver(
        &self,
        source: &Endpoint,
        mode: ReceiveMode,
    ) -> Result<Box<dyn MessageReceiver>, QueueError> {
        let path = source.receive_path();
        {
            let mut storage = write_storage(&self.storage)?;
            match source {
                Endpoint::Queue(_) => {
                    storage.get_or_create_entity(&path);
                }
                Endpoint::Subscription { topic, .. } => {
                    storage.register_subscription(topic.as_str(), &path);
                }
            }
        }

        Ok(Box::new(InMemoryReceiver {
            storage: Arc::clone(&self.storage),
            notify: Arc::clone(&self.notify),
            path,
            mode,
        }))
    }
}

// ============================================================================
// InMemorySender
// ============================================================================

/// Sender bound to one in-memory queue or topic
pub struct InMemorySender {
    storage: SharedStorage,
    notify: Arc<Notify>,
    entity: EntityName,
}

#[async_trait]
impl MessageSender for InMemorySender {
    async fn send_message(&self, message: ServiceBusMessage) -> Result<(), QueueError> {
        {
            let mut storage = write_storage(&self.storage)?;

            let max_size = storage.config.max_message_size;
            if message.body.len() > max_size {
                return Err(QueueError::MessageTooLarge {
                    size: message.body.len(),
                    max_size,
                });
            }

            let destinations = storage.destinations(self.entity.as_str());
            let max_entity_size = storage.config.max_entity_size;
            for path in &destinations {
                if storage
                    .entities
                    .get(path)
                    .is_some_and(|entity| entity.active_count() >= max_entity_size)
                {
                    return Err(QueueError::QuotaExceeded {
                        entity: path.clone(),
                        max_size: max_entity_size,
                    });
                }
            }

            let stored = StoredMessage::from_message(message);
            tracing::trace!(
                entity = %self.entity,
                message_id = %stored.message_id,
                destinations = destinations.len(),
                "In-memory send"
            );
            for path in destinations {
                storage
                    .get_or_create_entity(&path)
                    .messages
                    .push_back(stored.clone());
            }
        }

        self.notify.notify_waiters();
        Ok(())
    }

    fn entity(&self) -> &EntityName {
        &self.entity
    }
}

// ============================================================================
// InMemoryReceiver
// ============================================================================

/// Receiver bound to one in-memory queue or subscription
pub struct InMemoryReceiver {
    storage: SharedStorage,
    notify: Arc<Notify>,
    path: String,
    mode: ReceiveMode,
}

impl InMemoryReceiver {
    /// Take up to `max_messages` available messages without waiting
    fn try_receive(&self, max_messages: u32) -> Result<Vec<ServiceBusReceivedMessage>, QueueError> {
        let mut storage = write_storage(&self.storage)?;
        let max_delivery_count = storage.config.max_delivery_count;
        let lock_duration = storage.config.lock_duration;
        let entity = storage.get_or_create_entity(&self.path);
        entity.reclaim_expired_locks(max_delivery_count);

        let mut received = Vec::new();
        while received.len() < max_messages as usize {
            let Some(mut message) = entity.messages.pop_front() else {
                break;
            };
            message.delivery_count += 1;

            match self.mode {
                ReceiveMode::PeekLock => {
                    let token = LockToken::new();
                    let locked_until = Timestamp::now().plus(lock_duration);
                    received.push(
                        message.to_received(Some(token.clone()), Some(locked_until.clone())),
                    );
                    entity.in_flight.insert(
                        token,
                        InFlightMessage {
                            message,
                            locked_until,
                        },
                    );
                }
                ReceiveMode::ReceiveAndDelete => {
                    received.push(message.to_received(None, None));
                }
            }
        }

        Ok(received)
    }

    /// Remove the locked message behind a received message from in-flight
    fn take_locked(
        &self,
        operation: &str,
        message: &ServiceBusReceivedMessage,
    ) -> Result<(RwLockWriteGuard<'_, BrokerStorage>, StoredMessage), QueueError> {
        if self.mode != ReceiveMode::PeekLock {
            return Err(QueueError::UnsupportedReceiveMode {
                operation: operation.to_string(),
                mode: self.mode.to_string(),
            });
        }

        let lock_lost = || QueueError::MessageLockLost {
            lock_token: message
                .lock_token
                .as_ref()
                .map(|t| t.to_string())
                .unwrap_or_else(|| message.message_id.to_string()),
        };

        let token = message.lock_token.as_ref().ok_or_else(lock_lost)?;
        let mut storage = write_storage(&self.storage)?;
        let max_delivery_count = storage.config.max_delivery_count;
        let stored = storage
            .entities
            .get_mut(&self.path)
            .and_then(|entity| entity.take_locked(token, max_delivery_count))
            .ok_or_else(lock_lost)?;
        Ok((storage, stored))
    }
}

#[async_trait]
impl MessageReceiver for InMemoryReceiver {
    async fn receive_messages(
        &self,
        max_messages: u32,
        max_wait: Duration,
    ) -> Result<Vec<ServiceBusReceivedMessage>, QueueError> {
        let deadline = Timestamp::now().plus(max_wait);

        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let received = self.try_receive(max_messages)?;
            if !received.is_empty() {
                return Ok(received);
            }

            let remaining = deadline.as_datetime() - Timestamp::now().as_datetime();
            if remaining <= Duration::zero() {
                return Ok(received);
            }

            let slice = remaining
                .min(Duration::milliseconds(POLL_INTERVAL_MS))
                .to_std()
                .unwrap_or_default();
            let _ = tokio::time::timeout(slice, notified).await;
        }
    }

    async fn complete_message(&self, message: &ServiceBusReceivedMessage) -> Result<(), QueueError> {
        let (_storage, stored) = self.take_locked("complete", message)?;
        tracing::trace!(entity = %self.path, message_id = %stored.message_id, "In-memory complete");
        Ok(())
    }

    async fn abandon_message(&self, message: &ServiceBusReceivedMessage) -> Result<(), QueueError> {
        {
            let (mut storage, stored) = self.take_locked("abandon", message)?;
            let max_delivery_count = storage.config.max_delivery_count;
            storage
                .get_or_create_entity(&self.path)
                .release(stored, max_delivery_count);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    async fn dead_letter_message(
        &self,
        message: &ServiceBusReceivedMessage,
        options: Option<DeadLetterOptions>,
    ) -> Result<(), QueueError> {
        let (mut storage, stored) = self.take_locked("dead-letter", message)?;
        let options = options.unwrap_or_default();
        storage
            .get_or_create_entity(&self.path)
            .dead_letter
            .push(stored.dead_lettered(options.reason, options.description));
        Ok(())
    }

    fn receive_mode(&self) -> ReceiveMode {
        self.mode
    }
}
