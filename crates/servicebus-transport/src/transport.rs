//! Service Bus implementation of the host [`Transport`] contract.
//!
//! A [`ServiceBusTransport`] owns exactly one sender and one peek-lock
//! receiver, bound once at construction from its configuration. Sends and
//! publishes go through the outbound composer; reads go through the message
//! lifecycle controller and the attribute codec.

use crate::attributes;
use crate::client::{MessageSender, ServiceBusClient};
use crate::config::ServiceBusTransportConfiguration;
use crate::endpoint::Endpoint;
use crate::error::{TransportError, TransportOperation};
use crate::host::{
    Command, CoreDependencies, Event, Message, MessageAttributes, Transport, TransportMessage,
};
use crate::lifecycle::MessageLifecycle;
use crate::message::ServiceBusReceivedMessage;
use crate::outbound;
use async_trait::async_trait;
use tracing::{debug, info};

/// Transport bound to one queue, or one topic and subscription
pub struct ServiceBusTransport {
    configuration: ServiceBusTransportConfiguration,
    endpoint: Endpoint,
    sender: Box<dyn MessageSender>,
    lifecycle: MessageLifecycle,
    dependencies: Option<CoreDependencies>,
}

impl ServiceBusTransport {
    /// Resolve the endpoint and open its sender and receiver.
    ///
    /// Fails with [`TransportError::Configuration`] when neither a queue nor
    /// a topic with a subscription is configured.
    pub fn new(
        client: &dyn ServiceBusClient,
        configuration: ServiceBusTransportConfiguration,
    ) -> Result<Self, TransportError> {
        let endpoint = Endpoint::resolve(&configuration)?;
        let bound = endpoint
            .bind(client)
            .map_err(|e| TransportError::operation(TransportOperation::Bind, e))?;

        let lifecycle = MessageLifecycle::new(bound.receiver, configuration.wait_time());

        info!(
            endpoint = %endpoint,
            wait_ms = configuration.wait_time_ms,
            "Created Service Bus transport"
        );

        Ok(Self {
            configuration,
            endpoint,
            sender: bound.sender,
            lifecycle,
            dependencies: None,
        })
    }

    /// Endpoint the transport is bound to
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Configuration the transport was created with
    pub fn configuration(&self) -> &ServiceBusTransportConfiguration {
        &self.configuration
    }

    fn dependencies(&self) -> Result<&CoreDependencies, TransportError> {
        self.dependencies.as_ref().ok_or(TransportError::NotPrepared)
    }

    async fn dispatch<M>(
        &self,
        message: &M,
        attributes: Option<&MessageAttributes>,
    ) -> Result<(), TransportError>
    where
        M: Message,
    {
        let dependencies = self.dependencies()?;
        let outbound = outbound::compose(message, attributes, dependencies.serializer())?;

        self.sender
            .send_message(outbound)
            .await
            .map_err(|e| TransportError::operation(TransportOperation::Send, e))?;

        debug!(
            entity = %self.sender.entity(),
            message_name = message.name(),
            "Sent message"
        );
        Ok(())
    }

    /// Wrap a received broker message for the host
    fn inbound(
        &self,
        dependencies: &CoreDependencies,
        raw: ServiceBusReceivedMessage,
    ) -> TransportMessage<ServiceBusReceivedMessage> {
        // Bodies that are not valid for the serializer are handed over as text
        let domain_message = dependencies
            .serializer()
            .deserialize(&raw.body)
            .unwrap_or_else(|_| {
                serde_json::Value::String(String::from_utf8_lossy(&raw.body).into_owned())
            });
        let attributes =
            attributes::decode(raw.application_properties.as_ref(), raw.correlation_id.clone());

        TransportMessage {
            id: raw.message_id.clone(),
            raw,
            domain_message,
            attributes,
        }
    }
}

#[async_trait]
impl Transport for ServiceBusTransport {
    type Raw = ServiceBusReceivedMessage;

    fn prepare(&mut self, dependencies: CoreDependencies) {
        debug!(dependencies = ?dependencies, "Prepared Service Bus transport");
        self.dependencies = Some(dependencies);
    }

    async fn initialize(&self) -> Result<(), TransportError> {
        self.dependencies()?;
        info!(endpoint = %self.endpoint, "Initialized Service Bus transport");
        Ok(())
    }

    async fn send<C>(
        &self,
        command: &C,
        attributes: Option<&MessageAttributes>,
    ) -> Result<(), TransportError>
    where
        C: Command,
    {
        self.dispatch(command, attributes).await
    }

    async fn publish<E>(
        &self,
        event: &E,
        attributes: Option<&MessageAttributes>,
    ) -> Result<(), TransportError>
    where
        E: Event,
    {
        self.dispatch(event, attributes).await
    }

    async fn read_next_message(
        &self,
    ) -> Result<Option<TransportMessage<Self::Raw>>, TransportError> {
        let dependencies = self.dependencies()?;
        let received = self.lifecycle.receive_one().await?;
        Ok(received.map(|raw| self.inbound(dependencies, raw)))
    }

    async fn delete_message(
        &self,
        message: TransportMessage<Self::Raw>,
    ) -> Result<(), TransportError> {
        self.lifecycle.complete(&message.raw).await?;
        Ok(())
    }

    async fn return_message(
        &self,
        message: TransportMessage<Self::Raw>,
    ) -> Result<(), TransportError> {
        self.lifecycle.abandon(&message.raw).await?;
        Ok(())
    }

    async fn fail(&self, message: TransportMessage<Self::Raw>) -> Result<(), TransportError> {
        self.lifecycle.dead_letter(&message.raw, None).await?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "transport_tests.rs"]
mod tests;
