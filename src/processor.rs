use crate::config::{Config, DeletePolicy};
use crate::errors::{ProcessorError, WorkError};
use crate::queue::{Message, QueueClient};
use crate::work::{ProcessingResult, Worker};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

type ShareableQueueClient = dyn QueueClient;
type ShareableWorker = dyn Worker;

/// This is the main class for processing messages from a queue
///
/// To instantiate an instance of Processor you will need:
/// * A configuration object.
/// * A QueueClient to receive and delete messages with.
/// * A Worker instance that supports both Send and Sync
///
/// Each iteration receives one batch, hands every message to the worker in
/// order, deletes the messages the [`DeletePolicy`] selects with a single
/// `delete_batch` call and then pauses for the idle delay.
pub struct Processor {
    queue: String,
    client: Arc<ShareableQueueClient>,
    worker: Arc<ShareableWorker>,
    max_messages: u32,
    wait_seconds: u32,
    idle_delay: Option<Duration>,
    error_backoff: Duration,
    delete_policy: DeletePolicy,
    shutdown_grace: Duration,
}

enum BatchOutcome {
    Completed,
    ReceiveFailed,
}

/// A running [`Processor`] task
pub struct ProcessorHandle {
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl Processor {
    /// Instantiates a new instance of the processor
    pub fn new(
        config: &Config,
        client: Arc<ShareableQueueClient>,
        worker: Box<ShareableWorker>,
    ) -> Self {
        info!("Initializing sqs-queue-worker: {:?}", &config.mode);
        Processor {
            queue: config.mode.queue().to_owned(),
            client,
            worker: Arc::from(worker),
            max_messages: config.max_messages,
            wait_seconds: config.wait_seconds,
            idle_delay: config.idle_delay,
            error_backoff: config.error_backoff,
            delete_policy: config.delete_policy,
            shutdown_grace: config.shutdown_grace,
        }
    }

    /// Spawns the loop onto the current tokio runtime
    pub fn start(self) -> ProcessorHandle {
        let shutdown = CancellationToken::new();
        let token = shutdown.clone();
        let task = tokio::spawn(async move { self.run(token).await });
        ProcessorHandle { shutdown, task }
    }

    /// Runs until `shutdown` is cancelled
    ///
    /// Queue errors are logged and the next iteration carries on, so the
    /// only way out of the loop is cancellation. A failed receive is
    /// followed by the error backoff even when the idle delay is disabled.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!("Starting to consume messages from {}", &self.queue);
        while !shutdown.is_cancelled() {
            let pause = match self.process_batch(&shutdown).await {
                BatchOutcome::Completed => self.idle_delay,
                BatchOutcome::ReceiveFailed => Some(self.error_backoff),
            };

            if let Some(pause) = pause {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = tokio::time::sleep(pause) => {}
                }
            }
        }
        info!("Stopped consuming messages from {}", &self.queue);
    }

    /// One receive, process, delete cycle
    async fn process_batch(&self, shutdown: &CancellationToken) -> BatchOutcome {
        trace!("process_batch called!");
        let received = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Shutdown requested while waiting for messages");
                return BatchOutcome::Completed;
            }
            received = self.client.receive(self.max_messages, self.wait_seconds) => received,
        };

        let messages = match received {
            Ok(messages) => messages,
            Err(e) => {
                error!("Error fetching messages: {}", e);
                return BatchOutcome::ReceiveFailed;
            }
        };
        info!("Received {} message(s) from {}", messages.len(), &self.queue);
        if messages.is_empty() {
            return BatchOutcome::Completed;
        }

        let receipt_handles = self.process_messages(&messages).await;
        if receipt_handles.is_empty() {
            debug!("No messages to delete in this batch");
        } else {
            self.delete(&receipt_handles, shutdown).await;
        }
        BatchOutcome::Completed
    }

    /// Hands every message to the worker in order and returns the receipt
    /// handles that should be deleted
    async fn process_messages(&self, messages: &[Message]) -> Vec<String> {
        let mut receipt_handles = Vec::with_capacity(messages.len());
        for message in messages {
            debug!("process_messages: handling {:?}", message.log_id());
            match self.process_message(message).await {
                Ok(()) => {
                    info!("Processed message {}", message.log_id());
                    receipt_handles.push(message.receipt_handle.clone());
                }
                Err(e) => {
                    log_work_error(message, &e);
                    if self.delete_policy == DeletePolicy::All {
                        receipt_handles.push(message.receipt_handle.clone());
                    }
                }
            }
        }
        receipt_handles
    }

    async fn process_message(&self, message: &Message) -> ProcessingResult {
        AssertUnwindSafe(self.worker.process(message))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| {
                Err(WorkError::UnRecoverableError(
                    "Worker panicked while processing the message".to_owned(),
                ))
            })
    }

    /// Deletes the batch. Once shutdown is requested the call gets
    /// `shutdown_grace` to finish before it is abandoned.
    async fn delete(&self, receipt_handles: &[String], shutdown: &CancellationToken) {
        let delete = self.client.delete_batch(receipt_handles);
        tokio::pin!(delete);

        let result = tokio::select! {
            result = &mut delete => Some(result),
            _ = shutdown.cancelled() => {
                tokio::time::timeout(self.shutdown_grace, &mut delete).await.ok()
            }
        };

        match result {
            Some(Ok(())) => debug!("Deleted {} message(s)", receipt_handles.len()),
            Some(Err(e)) => error!("Error deleting messages: {}", e),
            None => warn!(
                "Gave up deleting {} message(s) during shutdown, they will be redelivered",
                receipt_handles.len()
            ),
        }
    }
}

impl ProcessorHandle {
    /// A token that stops the processor when cancelled
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Requests shutdown and waits for the current iteration to wind down
    pub async fn stop(self) -> Result<(), ProcessorError> {
        self.shutdown.cancel();
        self.task.await.map_err(ProcessorError::from)
    }
}

fn log_work_error(message: &Message, e: &WorkError) {
    let receive_count = message
        .receive_count
        .map(|c| c.to_string())
        .unwrap_or_else(|| "?".to_owned());
    match e {
        WorkError::RecoverableError(_) => warn!(
            "Error processing message {} (receive count {}): {}",
            message.log_id(),
            receive_count,
            e
        ),
        WorkError::UnRecoverableError(_) => error!(
            "Error processing message {} (receive count {}): {}",
            message.log_id(),
            receive_count,
            e
        ),
    }
}
