//! Transport and broker configuration.
//!
//! [`ServiceBusTransportConfiguration`] is the only configuration the adapter
//! consumes. It can be built directly or loaded from layered sources with
//! [`ServiceBusTransportConfiguration::load`]:
//!
//! 1. `config/servicebus-transport.yaml` (optional)
//! 2. an explicit YAML file supplied by the caller (required when given)
//! 3. environment variables prefixed `SBT__`, e.g. `SBT__QUEUE_NAME=orders`

use crate::endpoint::Endpoint;
use crate::error::ConfigurationError;
use chrono::Duration;
use serde::{Deserialize, Serialize};

/// Default receive wait, in milliseconds
pub const DEFAULT_WAIT_TIME_MS: u64 = 60_000;

fn default_wait_time_ms() -> u64 {
    DEFAULT_WAIT_TIME_MS
}

/// Configuration for a single transport instance
///
/// Either `queue_name`, or `topic_name` together with `subscription_name`,
/// must be set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBusTransportConfiguration {
    /// The name of the queue to send to and receive from
    #[serde(default)]
    pub queue_name: Option<String>,

    /// Topic to publish to; requires `subscription_name`
    #[serde(default)]
    pub topic_name: Option<String>,

    /// Subscription (under `topic_name`) to receive from
    #[serde(default)]
    pub subscription_name: Option<String>,

    /// Maximum time in milliseconds to wait for a message to arrive.
    ///
    /// A receive cannot be interrupted while waiting, so this also bounds how
    /// long shutdown may take. Older configuration files call this
    /// `wait_time_seconds`; the value has always been milliseconds.
    #[serde(default = "default_wait_time_ms", alias = "wait_time_seconds")]
    pub wait_time_ms: u64,
}

impl Default for ServiceBusTransportConfiguration {
    fn default() -> Self {
        Self {
            queue_name: None,
            topic_name: None,
            subscription_name: None,
            wait_time_ms: DEFAULT_WAIT_TIME_MS,
        }
    }
}

impl ServiceBusTransportConfiguration {
    /// Configuration bound to a queue
    pub fn for_queue(queue_name: impl Into<String>) -> Self {
        Self {
            queue_name: Some(queue_name.into()),
            ..Default::default()
        }
    }

    /// Configuration bound to a subscription under a topic
    pub fn for_subscription(
        topic_name: impl Into<String>,
        subscription_name: impl Into<String>,
    ) -> Self {
        Self {
            topic_name: Some(topic_name.into()),
            subscription_name: Some(subscription_name.into()),
            ..Default::default()
        }
    }

    /// Set the receive wait in milliseconds
    pub fn with_wait_time_ms(mut self, wait_time_ms: u64) -> Self {
        self.wait_time_ms = wait_time_ms;
        self
    }

    /// Receive wait as a duration
    pub fn wait_time(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.wait_time_ms).unwrap_or(i64::MAX))
    }

    /// Check that exactly one endpoint shape resolves
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        Endpoint::resolve(self).map(|_| ())
    }

    /// Load configuration from the default file, an optional explicit file and
    /// `SBT__*` environment variables, later sources overriding earlier ones.
    pub fn load(explicit_file: Option<&str>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder().add_source(
            config::File::with_name("config/servicebus-transport")
                .required(false)
                .format(config::FileFormat::Yaml),
        );

        if let Some(path) = explicit_file.filter(|p| !p.is_empty()) {
            builder = builder.add_source(
                config::File::with_name(path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
            tracing::debug!(path = %path, "Loading transport configuration from explicit path");
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("SBT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let configuration: Self =
            settings
                .try_deserialize()
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;

        configuration.validate()?;
        Ok(configuration)
    }
}

/// In-memory broker configuration
#[derive(Debug, Clone)]
pub struct InMemoryConfig {
    /// Maximum number of active messages per queue or subscription
    pub max_entity_size: usize,
    /// Deliveries after which an abandoned message is dead-lettered
    pub max_delivery_count: u32,
    /// How long a peek-lock is held before the message becomes visible again
    pub lock_duration: Duration,
    /// Maximum body size in bytes
    pub max_message_size: usize,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_entity_size: 10_000,
            max_delivery_count: 10,
            lock_duration: Duration::seconds(60),
            max_message_size: 256 * 1024,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
