use crate::errors::WorkError;
use crate::queue::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// `Ok(())` marks the message as successfully processed
pub type ProcessingResult = Result<(), WorkError>;

/// Trait to implement to create your own Worker implementation
#[async_trait]
pub trait Worker: Send + Sync {
    /// Processes a single message
    ///
    /// A WorkError can be returned on failure of the message.
    /// If the message can never be processed a WorkError::UnRecoverableError should be returned
    /// If a later delivery might succeed a WorkError::RecoverableError should be returned
    ///
    /// Whether a failed message is deleted is decided by the configured
    /// [`DeletePolicy`](crate::config::DeletePolicy).
    async fn process(&self, message: &Message) -> ProcessingResult;
}

/// The payload shape understood by [`LoggingWorker`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkLoad {
    #[serde(rename = "myField")]
    pub my_field: String,
}

impl FromStr for WorkLoad {
    type Err = WorkError;

    fn from_str(s: &str) -> Result<Self, <Self as FromStr>::Err> {
        serde_json::from_str(s)
            .map_err(|e| WorkError::UnRecoverableError(format!("Invalid WorkLoad: {}", e)))
    }
}

impl WorkLoad {
    pub fn from_message(message: &Message) -> Result<Self, WorkError> {
        let body = message.body_str().map_err(|e| {
            WorkError::UnRecoverableError(format!("Message body is not UTF-8: {}", e))
        })?;
        WorkLoad::from_str(body)
    }
}

/// Decodes every message as a [`WorkLoad`] and logs it
#[derive(Debug, Clone, Default)]
pub struct LoggingWorker;

#[async_trait]
impl Worker for LoggingWorker {
    async fn process(&self, message: &Message) -> ProcessingResult {
        let workload = WorkLoad::from_message(message)?;
        info!(
            "Received workload from message {}: {:?}",
            message.log_id(),
            &workload
        );
        Ok(())
    }
}
