use rusoto_core::request::TlsError;
use rusoto_core::RusotoError;
use rusoto_sqs::{DeleteMessageBatchError, ReceiveMessageError};
use serde_json::Error as SerdeJsonError;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinError;

/// Errors raised by the queue plumbing and the consumer loop
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Error parsing JSON: {0}")]
    JsonParseError(#[from] SerdeJsonError),
    #[error("Error receiving SQS messages: {0}")]
    SqsReceiveMessageError(#[from] RusotoError<ReceiveMessageError>),
    #[error("Error deleting SQS messages: {0}")]
    SqsDeleteMessageBatchError(#[from] RusotoError<DeleteMessageBatchError>),
    #[error("{} message(s) could not be deleted: {}", .0.len(), .0.join("; "))]
    PartialDeleteFailure(Vec<String>),
    #[error("Queue request did not complete within {0:?}")]
    Timeout(Duration),
    #[error("Could not create the http client: {0}")]
    HttpClientError(#[from] TlsError),
    #[error("A configuration error occurred: {0}")]
    ConfigError(String),
    #[error("The processor task failed: {0}")]
    TaskError(#[from] JoinError),
}

/// Failure reported by a [`Worker`](crate::work::Worker) for a single message
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkError {
    /// Processing may succeed on a later delivery
    #[error("recoverable: {0}")]
    RecoverableError(String),
    /// The message can never be processed, e.g. its payload is malformed
    #[error("unrecoverable: {0}")]
    UnRecoverableError(String),
}
