//! Message lifecycle controller.
//!
//! Receives strictly one message at a time and drives it from `Locked` to
//! exactly one terminal state:
//!
//! ```text
//! receive_one ──▶ Locked ──complete────▶ Completed
//!                    │ ────abandon─────▶ Abandoned
//!                    └─────dead_letter─▶ DeadLettered
//! ```
//!
//! The broker is asked for a single message per receive. Should it ever hand
//! back more, every one of them is abandoned, the anomaly is logged and the
//! receive reports no message. Settling a lock twice is not guarded here;
//! the broker rejects it.

use crate::client::{DeadLetterOptions, MessageReceiver};
use crate::error::{TransportError, TransportOperation};
use crate::message::ServiceBusReceivedMessage;
use chrono::Duration;
use futures::future::join_all;
use std::fmt;
use tracing::{debug, error, trace, warn};

/// Number of messages requested from the broker per receive
pub const RECEIVE_BATCH_SIZE: u32 = 1;

/// State of a message lock as seen by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Locked,
    Completed,
    Abandoned,
    DeadLettered,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::Completed => write!(f, "completed"),
            Self::Abandoned => write!(f, "abandoned"),
            Self::DeadLettered => write!(f, "dead-lettered"),
        }
    }
}

/// Drives received messages through their lock lifecycle
pub struct MessageLifecycle {
    receiver: Box<dyn MessageReceiver>,
    wait_time: Duration,
}

impl MessageLifecycle {
    /// Create controller over a peek-lock receiver
    pub fn new(receiver: Box<dyn MessageReceiver>, wait_time: Duration) -> Self {
        Self {
            receiver,
            wait_time,
        }
    }

    /// How long `receive_one` waits for a message
    pub fn wait_time(&self) -> Duration {
        self.wait_time
    }

    /// Receive at most one message, waiting up to the configured wait time.
    ///
    /// The wait cannot be interrupted. `None` means no message arrived, or
    /// the broker returned more than one and they were all given back.
    pub async fn receive_one(&self) -> Result<Option<ServiceBusReceivedMessage>, TransportError> {
        let mut messages = self
            .receiver
            .receive_messages(RECEIVE_BATCH_SIZE, self.wait_time)
            .await
            .map_err(|e| TransportError::operation(TransportOperation::Receive, e))?;

        if messages.len() > RECEIVE_BATCH_SIZE as usize {
            error!(
                expected = RECEIVE_BATCH_SIZE,
                received = messages.len(),
                "Received more than the expected number of messages"
            );
            self.abandon_all(&messages).await;
            return Ok(None);
        }

        let message = messages.pop();
        match &message {
            Some(message) => debug!(
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                state = %LockState::Locked,
                "Received message"
            ),
            None => trace!(wait_ms = self.wait_time.num_milliseconds(), "No message received"),
        }
        Ok(message)
    }

    /// Abandon every message concurrently; failures are logged, not returned
    async fn abandon_all(&self, messages: &[ServiceBusReceivedMessage]) {
        let results = join_all(
            messages
                .iter()
                .map(|message| self.receiver.abandon_message(message)),
        )
        .await;

        for (message, result) in messages.iter().zip(results) {
            if let Err(e) = result {
                warn!(
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to return unexpected message to the queue"
                );
            }
        }
    }

    /// Delete the message permanently
    pub async fn complete(
        &self,
        message: &ServiceBusReceivedMessage,
    ) -> Result<LockState, TransportError> {
        self.receiver
            .complete_message(message)
            .await
            .map_err(|e| TransportError::operation(TransportOperation::Complete, e))?;
        Ok(self.settled(message, LockState::Completed))
    }

    /// Release the lock so the message is redelivered
    pub async fn abandon(
        &self,
        message: &ServiceBusReceivedMessage,
    ) -> Result<LockState, TransportError> {
        self.receiver
            .abandon_message(message)
            .await
            .map_err(|e| TransportError::operation(TransportOperation::Abandon, e))?;
        Ok(self.settled(message, LockState::Abandoned))
    }

    /// Move the message to the dead-letter sub-queue
    pub async fn dead_letter(
        &self,
        message: &ServiceBusReceivedMessage,
        options: Option<DeadLetterOptions>,
    ) -> Result<LockState, TransportError> {
        self.receiver
            .dead_letter_message(message, options)
            .await
            .map_err(|e| TransportError::operation(TransportOperation::DeadLetter, e))?;
        Ok(self.settled(message, LockState::DeadLettered))
    }

    fn settled(&self, message: &ServiceBusReceivedMessage, state: LockState) -> LockState {
        debug!(message_id = %message.message_id, state = %state, "Settled message");
        state
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
