//! Shared fixtures for unit tests.

use crate::message::{
    ApplicationProperties, LockToken, ServiceBusReceivedMessage, Timestamp,
};
use bytes::Bytes;
use chrono::Duration;
use std::io;
use std::sync::{Arc, Mutex};

/// Locked message with the given id and body
pub fn received_message(id: &str, body: &'static [u8]) -> ServiceBusReceivedMessage {
    ServiceBusReceivedMessage {
        message_id: id.parse().unwrap_or_default(),
        body: Bytes::from_static(body),
        content_type: Some("application/json".to_string()),
        correlation_id: None,
        subject: None,
        application_properties: Some(ApplicationProperties::new()),
        lock_token: Some(LockToken::new()),
        locked_until: Some(Timestamp::now().plus(Duration::seconds(60))),
        delivery_count: 1,
        enqueued_at: Timestamp::now(),
        dead_letter_reason: None,
        dead_letter_description: None,
    }
}

/// In-memory sink for formatted log output
#[derive(Clone, Default)]
pub struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        let bytes = self.0.lock().map(|b| b.clone()).unwrap_or_default();
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Ok(mut bytes) = self.0.lock() {
            bytes.extend_from_slice(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route log output on the current thread into a buffer until the guard drops
pub fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::TRACE)
        .finish();
    let guard = tracing::subscriber::set_default(subscriber);
    (buffer, guard)
}
