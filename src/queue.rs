use crate::errors::ProcessorError;
use async_trait::async_trait;
use std::str::{self, Utf8Error};

/// A message received from the queue
///
/// The receipt handle is only valid until the visibility timeout of this
/// delivery elapses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub message_id: Option<String>,
    pub receipt_handle: String,
    pub body: Vec<u8>,
    /// How many times the queue has handed this message out, this delivery included
    pub receive_count: Option<u32>,
}

impl Message {
    pub fn new(receipt_handle: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        Message {
            message_id: None,
            receipt_handle: receipt_handle.into(),
            body: body.into(),
            receive_count: None,
        }
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    pub fn with_receive_count(mut self, receive_count: u32) -> Self {
        self.receive_count = Some(receive_count);
        self
    }

    pub fn body_str(&self) -> Result<&str, Utf8Error> {
        str::from_utf8(&self.body)
    }

    /// Identifier used in log lines
    pub fn log_id(&self) -> &str {
        self.message_id.as_deref().unwrap_or("<No ID Found>")
    }
}

/// The operations the consumer loop needs from a queue
///
/// Calls are made one at a time; an implementation only has to tolerate
/// sequential reuse.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Long-polls for up to `max_messages`, waiting at most `wait_seconds`
    /// for the first one to arrive. An empty vec means nothing arrived.
    async fn receive(
        &self,
        max_messages: u32,
        wait_seconds: u32,
    ) -> Result<Vec<Message>, ProcessorError>;

    /// Acknowledges the messages with the given receipt handles
    async fn delete_batch(&self, receipt_handles: &[String]) -> Result<(), ProcessorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_str_rejects_invalid_utf8() {
        let message = Message::new("handle", vec![0xff, 0xfe]);
        assert!(message.body_str().is_err());
    }

    #[test]
    fn log_id_falls_back() {
        let message = Message::new("handle", "{}");
        assert_eq!("<No ID Found>", message.log_id());
        let message = message.with_message_id("abc");
        assert_eq!("abc", message.log_id());
    }
}
