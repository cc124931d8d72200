//! Tests for the Service Bus transport adapter.

use super::*;
use crate::client::{MessageReceiver, MockMessageReceiver, MockMessageSender, MockServiceBusClient};
use crate::config::ServiceBusTransportConfiguration;
use crate::error::{ConfigurationError, QueueError};
use crate::host::{AttributeValue, JsonMessageSerializer};
use crate::message::{EntityName, PropertyValue};
use crate::providers::InMemoryServiceBus;
use crate::test_support::received_message;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct PlaceOrder {
    order_id: u32,
}

impl Message for PlaceOrder {
    fn name(&self) -> &str {
        "orders/place-order"
    }
}

impl Command for PlaceOrder {}

#[derive(Debug, PartialEq, Serialize, Deserialize)]
struct OrderPlaced {
    order_id: u32,
}

impl Message for OrderPlaced {
    fn name(&self) -> &str {
        "orders/order-placed"
    }
}

impl Event for OrderPlaced {}

fn mock_client(sender: MockMessageSender, receiver: MockMessageReceiver) -> MockServiceBusClient {
    let mut client = MockServiceBusClient::new();
    client
        .expect_create_receiver()
        .return_once(move |_, _| Ok(Box::new(receiver) as Box<dyn MessageReceiver>));
    client
        .expect_create_sender()
        .return_once(move |_| Ok(Box::new(sender) as Box<dyn MessageSender>));
    client
}

fn prepared(client: &dyn ServiceBusClient, config: ServiceBusTransportConfiguration) -> ServiceBusTransport {
    let mut transport = ServiceBusTransport::new(client, config).unwrap();
    transport.prepare(CoreDependencies::default());
    transport
}

fn fast_queue(name: &str) -> ServiceBusTransportConfiguration {
    ServiceBusTransportConfiguration::for_queue(name).with_wait_time_ms(50)
}

// ============================================================================
// Construction
// ============================================================================

mod construction {
    use super::*;

    #[test]
    fn test_missing_endpoint_fails_construction() {
        let client = MockServiceBusClient::new();

        let result = ServiceBusTransport::new(&client, ServiceBusTransportConfiguration::default());

        match result {
            Err(error @ TransportError::Configuration(ConfigurationError::MissingEndpoint)) => {
                assert_eq!(
                    error.to_string(),
                    "Configuration error: Queue or Topic Name (together with Subscription name) should be set."
                );
            }
            Err(other) => panic!("expected missing endpoint, got {:?}", other),
            Ok(_) => panic!("expected construction to fail"),
        }
    }

    #[test]
    fn test_client_failure_fails_construction() {
        let mut client = MockServiceBusClient::new();
        client.expect_create_receiver().return_once(|_, _| {
            Err(QueueError::ConnectionFailed {
                message: "unreachable".to_string(),
            })
        });

        let result = ServiceBusTransport::new(&client, fast_queue("orders"));

        assert!(matches!(
            result,
            Err(TransportError::OperationFailed {
                operation: TransportOperation::Bind,
                ..
            })
        ));
    }

    #[test]
    fn test_accessors_expose_binding() {
        let broker = InMemoryServiceBus::default();

        let transport = ServiceBusTransport::new(
            &broker,
            ServiceBusTransportConfiguration::for_subscription("events", "audit"),
        )
        .unwrap();

        assert_eq!(transport.endpoint().receive_path(), "events/subscriptions/audit");
        assert_eq!(transport.endpoint().sender_entity().as_str(), "events");
        assert_eq!(transport.configuration().wait_time_ms, 60_000);
    }

    #[tokio::test]
    async fn test_initialize_requires_prepare() {
        let broker = InMemoryServiceBus::default();
        let mut transport = ServiceBusTransport::new(&broker, fast_queue("orders")).unwrap();

        let before = transport.initialize().await;
        transport.prepare(CoreDependencies::default());
        let after = transport.initialize().await;

        assert!(matches!(before, Err(TransportError::NotPrepared)));
        assert!(after.is_ok());
    }
}

// ============================================================================
// Sending
// ============================================================================

mod sending {
    use super::*;

    #[tokio::test]
    async fn test_send_composes_wire_message() {
        // Arrange
        let mut sender = MockMessageSender::new();
        sender
            .expect_send_message()
            .withf(|message| {
                message.subject.as_deref() == Some("orders/place-order")
                    && message.correlation_id.as_deref() == Some("X")
                    && message.application_properties.get("attributes-foo")
                        == Some(&PropertyValue::String("a".to_string()))
                    && message.application_properties.get("stickyAttributes-bar")
                        == Some(&PropertyValue::Int(5))
                    && message.application_properties.len() == 2
            })
            .times(1)
            .returning(|_| Ok(()));
        sender
            .expect_entity()
            .return_const(EntityName::new("orders".to_string()).unwrap());
        let client = mock_client(sender, MockMessageReceiver::new());
        let transport = prepared(&client, fast_queue("orders"));

        let attributes = MessageAttributes::new()
            .with_correlation_id("X")
            .with_attribute("foo", "a")
            .with_sticky_attribute("bar", 5);

        // Act
        let result = transport
            .send(&PlaceOrder { order_id: 1 }, Some(&attributes))
            .await;

        // Assert
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_send_before_prepare_is_rejected() {
        let mut sender = MockMessageSender::new();
        sender.expect_send_message().never();
        let client = mock_client(sender, MockMessageReceiver::new());
        let transport = ServiceBusTransport::new(&client, fast_queue("orders")).unwrap();

        let result = transport.send(&PlaceOrder { order_id: 1 }, None).await;

        assert!(matches!(result, Err(TransportError::NotPrepared)));
    }

    #[tokio::test]
    async fn test_send_failure_is_propagated() {
        let mut sender = MockMessageSender::new();
        sender.expect_send_message().returning(|_| {
            Err(QueueError::QuotaExceeded {
                entity: "orders".to_string(),
                max_size: 1,
            })
        });
        let client = mock_client(sender, MockMessageReceiver::new());
        let transport = prepared(&client, fast_queue("orders"));

        let result = transport.send(&PlaceOrder { order_id: 1 }, None).await;

        match result {
            Err(error) => {
                assert!(error.is_transient());
                assert!(matches!(
                    error,
                    TransportError::OperationFailed {
                        operation: TransportOperation::Send,
                        ..
                    }
                ));
            }
            Ok(()) => panic!("expected send failure"),
        }
    }

    #[tokio::test]
    async fn test_publish_goes_to_topic_subscriptions() {
        // Arrange
        let broker = InMemoryServiceBus::default();
        let transport = prepared(
            &broker,
            ServiceBusTransportConfiguration::for_subscription("events", "audit"),
        );

        // Act
        transport
            .publish(&OrderPlaced { order_id: 9 }, None)
            .await
            .unwrap();

        // Assert
        assert_eq!(broker.active_message_count("events/subscriptions/audit"), 1);
    }
}

// ============================================================================
// Receiving
// ============================================================================

mod receiving {
    use super::*;

    #[tokio::test]
    async fn test_read_decodes_body_and_attributes() {
        // Arrange
        let broker = InMemoryServiceBus::default();
        let transport = prepared(&broker, fast_queue("orders"));
        let attributes = MessageAttributes::new()
            .with_correlation_id("X")
            .with_attribute("foo", "a")
            .with_sticky_attribute("bar", 5);
        transport
            .send(&PlaceOrder { order_id: 42 }, Some(&attributes))
            .await
            .unwrap();

        // Act
        let message = transport.read_next_message().await.unwrap().unwrap();

        // Assert
        assert_eq!(message.id, message.raw.message_id);
        assert_eq!(
            message.domain_message_as::<PlaceOrder>().unwrap(),
            PlaceOrder { order_id: 42 }
        );
        assert_eq!(message.attributes.correlation_id.as_deref(), Some("X"));
        assert_eq!(
            message.attributes.attributes.get("foo"),
            Some(&AttributeValue::String("a".to_string()))
        );
        assert_eq!(
            message.attributes.sticky_attributes.get("bar"),
            Some(&AttributeValue::Integer(5))
        );
        assert_eq!(message.attributes, attributes);
    }

    #[tokio::test]
    async fn test_read_on_empty_queue_returns_none() {
        let broker = InMemoryServiceBus::default();
        let transport = prepared(&broker, fast_queue("orders"));

        let message = transport.read_next_message().await.unwrap();

        assert!(message.is_none());
    }

    #[tokio::test]
    async fn test_maximum_wait_time_still_reads_message() {
        let broker = InMemoryServiceBus::default();
        let config = ServiceBusTransportConfiguration::for_queue("orders").with_wait_time_ms(u64::MAX);
        let transport = prepared(&broker, config);
        transport.send(&PlaceOrder { order_id: 7 }, None).await.unwrap();

        let message = transport.read_next_message().await.unwrap().unwrap();

        assert_eq!(
            message.domain_message_as::<PlaceOrder>().unwrap(),
            PlaceOrder { order_id: 7 }
        );
    }

    #[tokio::test]
    async fn test_read_before_prepare_does_not_receive() {
        let mut receiver = MockMessageReceiver::new();
        receiver.expect_receive_messages().never();
        let client = mock_client(MockMessageSender::new(), receiver);
        let transport = ServiceBusTransport::new(&client, fast_queue("orders")).unwrap();

        let result = transport.read_next_message().await;

        assert!(matches!(result, Err(TransportError::NotPrepared)));
    }

    #[tokio::test]
    async fn test_non_json_body_is_handed_over_as_text() {
        let mut receiver = MockMessageReceiver::new();
        receiver
            .expect_receive_messages()
            .returning(|_, _| Ok(vec![received_message("m1", b"plain text")]));
        let client = mock_client(MockMessageSender::new(), receiver);
        let mut transport = ServiceBusTransport::new(&client, fast_queue("orders")).unwrap();
        transport.prepare(CoreDependencies::new().with_serializer(std::sync::Arc::new(JsonMessageSerializer)));

        let message = transport.read_next_message().await.unwrap().unwrap();

        assert_eq!(message.domain_message, serde_json::json!("plain text"));
        assert!(message.attributes.attributes.is_empty());
        assert!(message.attributes.correlation_id.is_none());
    }

    #[tokio::test]
    async fn test_message_without_property_bag_has_empty_attributes() {
        let mut receiver = MockMessageReceiver::new();
        receiver.expect_receive_messages().returning(|_, _| {
            let mut message = received_message("m1", b"{\"order_id\":1}");
            message.application_properties = None;
            message.correlation_id = Some("C".to_string());
            Ok(vec![message])
        });
        let client = mock_client(MockMessageSender::new(), receiver);
        let transport = prepared(&client, fast_queue("orders"));

        let message = transport.read_next_message().await.unwrap().unwrap();

        assert!(message.attributes.attributes.is_empty());
        assert!(message.attributes.sticky_attributes.is_empty());
        assert_eq!(message.attributes.correlation_id.as_deref(), Some("C"));
    }
}

// ============================================================================
// Settlement
// ============================================================================

mod settlement {
    use super::*;

    fn receiver_with_one_message() -> MockMessageReceiver {
        let mut receiver = MockMessageReceiver::new();
        receiver
            .expect_receive_messages()
            .times(1)
            .returning(|_, _| Ok(vec![received_message("m1", b"{}")]));
        receiver
    }

    #[tokio::test]
    async fn test_delete_completes_message() {
        let mut receiver = receiver_with_one_message();
        receiver.expect_complete_message().times(1).returning(|_| Ok(()));
        let client = mock_client(MockMessageSender::new(), receiver);
        let transport = prepared(&client, fast_queue("orders"));
        let message = transport.read_next_message().await.unwrap().unwrap();

        let result = transport.delete_message(message).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_return_abandons_message() {
        let mut receiver = receiver_with_one_message();
        receiver.expect_abandon_message().times(1).returning(|_| Ok(()));
        let client = mock_client(MockMessageSender::new(), receiver);
        let transport = prepared(&client, fast_queue("orders"));
        let message = transport.read_next_message().await.unwrap().unwrap();

        let result = transport.return_message(message).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_fail_dead_letters_without_options() {
        let mut receiver = receiver_with_one_message();
        receiver
            .expect_dead_letter_message()
            .withf(|_, options| options.is_none())
            .times(1)
            .returning(|_, _| Ok(()));
        let client = mock_client(MockMessageSender::new(), receiver);
        let transport = prepared(&client, fast_queue("orders"));
        let message = transport.read_next_message().await.unwrap().unwrap();

        let result = transport.fail(message).await;

        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_settlement_failure_names_operation() {
        let mut receiver = receiver_with_one_message();
        receiver.expect_complete_message().returning(|message| {
            Err(QueueError::MessageLockLost {
                lock_token: message.message_id.to_string(),
            })
        });
        let client = mock_client(MockMessageSender::new(), receiver);
        let transport = prepared(&client, fast_queue("orders"));
        let message = transport.read_next_message().await.unwrap().unwrap();

        let result = transport.delete_message(message).await;

        assert!(matches!(
            result,
            Err(TransportError::OperationFailed {
                operation: TransportOperation::Complete,
                source: QueueError::MessageLockLost { .. },
            })
        ));
    }
}
