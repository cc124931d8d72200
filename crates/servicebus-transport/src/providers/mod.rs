//! Broker client implementations.
//!
//! This module contains concrete implementations of the `ServiceBusClient`,
//! `MessageSender` and `MessageReceiver` traits.

pub mod memory;

pub use memory::{InMemoryReceiver, InMemorySender, InMemoryServiceBus};
