//! Common test utilities for servicebus-transport integration tests
//!
//! This module provides:
//! - Tracing setup honouring `RUST_LOG`
//! - Domain message types used across tests
//! - Helpers for building prepared transports over the in-memory broker

use serde::{Deserialize, Serialize};
use servicebus_transport::{
    Command, CoreDependencies, Event, InMemoryServiceBus, Message, ServiceBusTransport,
    ServiceBusTransportConfiguration, Transport,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Receive wait used by tests that expect an empty poll
#[allow(dead_code)]
pub const SHORT_WAIT_MS: u64 = 100;

/// Install a log subscriber once per test binary
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "servicebus_transport=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

// ============================================================================
// Domain Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceOrder {
    pub order_id: u32,
    pub sku: String,
}

impl Message for PlaceOrder {
    fn name(&self) -> &str {
        "sales.PlaceOrder"
    }
}

impl Command for PlaceOrder {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: u32,
}

impl Message for OrderPlaced {
    fn name(&self) -> &str {
        "sales.OrderPlaced"
    }
}

impl Event for OrderPlaced {}

#[allow(dead_code)]
pub fn place_order(order_id: u32) -> PlaceOrder {
    PlaceOrder {
        order_id,
        sku: format!("SKU-{}", order_id),
    }
}

// ============================================================================
// Transport Builders
// ============================================================================

/// Transport created from `config` and prepared with default dependencies
pub fn prepared_transport(
    broker: &InMemoryServiceBus,
    config: ServiceBusTransportConfiguration,
) -> ServiceBusTransport {
    init_tracing();
    let mut transport =
        ServiceBusTransport::new(broker, config).expect("transport should bind to the broker");
    transport.prepare(CoreDependencies::default());
    transport
}

/// Prepared transport bound to a queue
#[allow(dead_code)]
pub fn queue_transport(broker: &InMemoryServiceBus, queue: &str, wait_ms: u64) -> ServiceBusTransport {
    prepared_transport(
        broker,
        ServiceBusTransportConfiguration::for_queue(queue).with_wait_time_ms(wait_ms),
    )
}

/// Prepared transport bound to a subscription under a topic
#[allow(dead_code)]
pub fn subscription_transport(
    broker: &InMemoryServiceBus,
    topic: &str,
    subscription: &str,
    wait_ms: u64,
) -> ServiceBusTransport {
    prepared_transport(
        broker,
        ServiceBusTransportConfiguration::for_subscription(topic, subscription)
            .with_wait_time_ms(wait_ms),
    )
}
