//! Outbound message composition.
//!
//! Bodies are pre-serialized: the domain message is turned into a JSON value
//! and handed to the host's [`MessageSerializer`], and the resulting bytes are
//! sent with the serializer's content type. The receive path reverses this in
//! [`crate::transport`].

use crate::attributes;
use crate::error::SerializationError;
use crate::host::{Message, MessageAttributes, MessageSerializer};
use crate::message::ServiceBusMessage;

/// Build the wire message for a domain message and its attributes.
///
/// Missing attributes are treated as two empty tiers.
pub fn compose<M>(
    message: &M,
    message_attributes: Option<&MessageAttributes>,
    serializer: &dyn MessageSerializer,
) -> Result<ServiceBusMessage, SerializationError>
where
    M: Message,
{
    let payload =
        serde_json::to_value(message).map_err(|e| SerializationError::InvalidPayload {
            message_type: message.name().to_string(),
            message: e.to_string(),
        })?;
    let body = serializer.serialize(&payload)?;

    let default_attributes = MessageAttributes::default();
    let message_attributes = message_attributes.unwrap_or(&default_attributes);

    Ok(ServiceBusMessage {
        body,
        content_type: Some(serializer.content_type().to_string()),
        correlation_id: message_attributes.correlation_id.clone(),
        subject: Some(message.name().to_string()),
        message_id: None,
        application_properties: attributes::encode(message_attributes),
    })
}

#[cfg(test)]
#[path = "outbound_tests.rs"]
mod tests;
