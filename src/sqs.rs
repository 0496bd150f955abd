use crate::config::{Config, Mode};
use crate::errors::ProcessorError;
use crate::queue::{Message, QueueClient};
use async_trait::async_trait;
use futures::future::try_join_all;
use rusoto_core::{HttpClient, Region};
use rusoto_credential::StaticProvider;
use rusoto_sqs::{
    DeleteMessageBatchRequest, DeleteMessageBatchRequestEntry, DeleteMessageBatchResult,
    Message as SqsMessage, ReceiveMessageRequest, Sqs, SqsClient as RusotoSqsClient,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const SQS_LOCAL_REGION: &str = "sqs-local";
const RECEIVE_COUNT_ATTRIBUTE: &str = "ApproximateReceiveCount";
/// SQS accepts at most 10 entries per DeleteMessageBatch call
const MAX_DELETE_BATCH: usize = 10;
/// Added on top of the long-poll wait before a request is given up on
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(10);

/// [`QueueClient`] backed by Amazon SQS (or ElasticMQ in local mode)
#[derive(Clone)]
pub struct SqsClient {
    pub queue_url: String,
    visibility_timeout: Option<u32>,
    sqs: Arc<RusotoSqsClient>,
}

impl SqsClient {
    pub fn new(region: Region, queue_url: &str) -> Result<Self, ProcessorError> {
        let sqs = build_sqs_client(region)?;
        Ok(SqsClient {
            queue_url: queue_url.to_owned(),
            visibility_timeout: None,
            sqs: Arc::new(sqs),
        })
    }

    pub fn local(port: u32, queue_url: &str) -> Result<Self, ProcessorError> {
        SqsClient::new(build_local_region(port), queue_url)
    }

    pub fn from_config(config: &Config) -> Result<Self, ProcessorError> {
        let client = match &config.mode {
            Mode::AWS(region, queue) => SqsClient::new(region.to_owned(), queue),
            Mode::Local(port, queue) => SqsClient::local(*port, queue),
        }?;
        Ok(client.with_visibility_timeout(config.visibility_timeout))
    }

    pub fn with_visibility_timeout(mut self, visibility_timeout: Option<u32>) -> Self {
        self.visibility_timeout = visibility_timeout;
        self
    }

    async fn delete_chunk(
        &self,
        entries: Vec<DeleteMessageBatchRequestEntry>,
    ) -> Result<(), ProcessorError> {
        let request = DeleteMessageBatchRequest {
            queue_url: self.queue_url.clone(),
            entries,
        };
        let result = with_timeout(REQUEST_TIMEOUT_MARGIN, self.sqs.delete_message_batch(request))
            .await?
            .map_err(ProcessorError::from)?;
        delete_result(result)
    }
}

#[async_trait]
impl QueueClient for SqsClient {
    async fn receive(
        &self,
        max_messages: u32,
        wait_seconds: u32,
    ) -> Result<Vec<Message>, ProcessorError> {
        trace!("receive called for {}", &self.queue_url);
        let request = receive_request(
            &self.queue_url,
            self.visibility_timeout,
            max_messages,
            wait_seconds,
        );
        let timeout = Duration::from_secs(u64::from(wait_seconds)) + REQUEST_TIMEOUT_MARGIN;
        let result = with_timeout(timeout, self.sqs.receive_message(request))
            .await?
            .map_err(ProcessorError::from)?;
        debug!("sqs: received message result: {:?}", &result);
        Ok(sqs_messages_to_messages(result.messages.unwrap_or_default()))
    }

    async fn delete_batch(&self, receipt_handles: &[String]) -> Result<(), ProcessorError> {
        debug!("delete_batch called with {} receipt handle(s)", receipt_handles.len());
        let deletes = delete_entries(receipt_handles)
            .into_iter()
            .map(|entries| self.delete_chunk(entries));
        try_join_all(deletes).await.map(|_| ())
    }
}

fn receive_request(
    queue_url: &str,
    visibility_timeout: Option<u32>,
    max_messages: u32,
    wait_seconds: u32,
) -> ReceiveMessageRequest {
    ReceiveMessageRequest {
        queue_url: queue_url.to_owned(),
        max_number_of_messages: Some(i64::from(max_messages)),
        wait_time_seconds: Some(i64::from(wait_seconds)),
        visibility_timeout: visibility_timeout.map(i64::from),
        attribute_names: Some(vec![RECEIVE_COUNT_ATTRIBUTE.to_owned()]),
        ..ReceiveMessageRequest::default()
    }
}

async fn with_timeout<F: Future>(duration: Duration, f: F) -> Result<F::Output, ProcessorError> {
    tokio::time::timeout(duration, f)
        .await
        .map_err(|_| ProcessorError::Timeout(duration))
}

/// Splits receipt handles into batch entries, ids are unique within each chunk
fn delete_entries(receipt_handles: &[String]) -> Vec<Vec<DeleteMessageBatchRequestEntry>> {
    receipt_handles
        .chunks(MAX_DELETE_BATCH)
        .map(|chunk| {
            chunk
                .iter()
                .enumerate()
                .map(|(i, receipt_handle)| DeleteMessageBatchRequestEntry {
                    id: i.to_string(),
                    receipt_handle: receipt_handle.clone(),
                })
                .collect()
        })
        .collect()
}

/// Turns per-entry failures of a batch delete into an error
fn delete_result(result: DeleteMessageBatchResult) -> Result<(), ProcessorError> {
    if result.failed.is_empty() {
        return Ok(());
    }
    let failures = result
        .failed
        .into_iter()
        .map(|f| match f.message {
            Some(message) => format!("{}: {} ({})", f.id, f.code, message),
            None => format!("{}: {}", f.id, f.code),
        })
        .collect();
    Err(ProcessorError::PartialDeleteFailure(failures))
}

fn sqs_messages_to_messages(messages: Vec<SqsMessage>) -> Vec<Message> {
    messages
        .into_iter()
        .filter_map(sqs_message_to_message)
        .collect()
}

fn sqs_message_to_message(message: SqsMessage) -> Option<Message> {
    let receive_count = message
        .attributes
        .as_ref()
        .and_then(|attributes| attributes.get(RECEIVE_COUNT_ATTRIBUTE))
        .and_then(|count| count.parse::<u32>().ok());
    match message.receipt_handle {
        Some(receipt_handle) => Some(Message {
            message_id: message.message_id,
            receipt_handle,
            body: message.body.unwrap_or_default().into_bytes(),
            receive_count,
        }),
        None => {
            warn!(
                "Dropping message {:?} as it has no receipt handle",
                &message.message_id
            );
            None
        }
    }
}

fn build_sqs_client(region: Region) -> Result<RusotoSqsClient, ProcessorError> {
    match region {
        Region::Custom { .. } => {
            let dispatcher = HttpClient::new()?;
            let credentials_provider =
                StaticProvider::new("fakeKey".to_string(), "fakeSecret".to_string(), None, None);
            Ok(RusotoSqsClient::new_with(
                dispatcher,
                credentials_provider,
                region,
            ))
        }
        _ => Ok(RusotoSqsClient::new(region)),
    }
}

fn build_local_region(port: u32) -> Region {
    Region::Custom {
        name: SQS_LOCAL_REGION.to_string(),
        endpoint: format!("http://localhost:{}", port),
    }
}
