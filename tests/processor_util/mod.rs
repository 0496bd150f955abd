use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqs_queue_worker::config::{Config, DeletePolicy, Mode};
use sqs_queue_worker::errors::{ProcessorError, WorkError};
use sqs_queue_worker::queue::{Message, QueueClient};
use sqs_queue_worker::work::{ProcessingResult, WorkLoad, Worker};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub enum Action {
    Success,
    FailRequeue,
    FailDelete,
    Panic,
}

#[derive(Debug, Serialize, Deserialize, Clone, Eq, PartialEq)]
pub struct Payload {
    msg: String,
    action: Action,
}

impl Payload {
    pub fn new(msg: &str, action: Action) -> Self {
        Payload {
            msg: msg.to_owned(),
            action,
        }
    }

    pub fn to_message(&self) -> Message {
        message(&serde_json::to_string(self).unwrap())
    }
}

pub fn message(body: &str) -> Message {
    Message::new(Uuid::new_v4().to_string(), body)
        .with_message_id(Uuid::new_v4().to_string())
        .with_receive_count(1)
}

pub fn handles(messages: &[Message]) -> Vec<String> {
    messages.iter().map(|m| m.receipt_handle.clone()).collect()
}

/// What the fake returns for one receive call
pub enum Receive {
    Batch(Vec<Message>),
    Fail,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub enum DeleteBehaviour {
    Succeed,
    FailFirst,
    Hang,
}

/// Plays back scripted receives and records every call. Once the script
/// runs out a receive waits forever, like a long poll on an idle queue.
pub struct FakeQueueClient {
    script: Mutex<VecDeque<Receive>>,
    receive_calls: AtomicUsize,
    deletes: Mutex<Vec<Vec<String>>>,
    delete_behaviour: DeleteBehaviour,
}

impl FakeQueueClient {
    pub fn new(script: Vec<Receive>) -> Arc<Self> {
        FakeQueueClient::with_delete_behaviour(script, DeleteBehaviour::Succeed)
    }

    pub fn with_delete_behaviour(
        script: Vec<Receive>,
        delete_behaviour: DeleteBehaviour,
    ) -> Arc<Self> {
        Arc::new(FakeQueueClient {
            script: Mutex::new(script.into_iter().collect()),
            receive_calls: AtomicUsize::new(0),
            deletes: Mutex::new(vec![]),
            delete_behaviour,
        })
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> Vec<Vec<String>> {
        self.deletes.lock().unwrap().clone()
    }
}

#[async_trait]
impl QueueClient for FakeQueueClient {
    async fn receive(
        &self,
        _max_messages: u32,
        _wait_seconds: u32,
    ) -> Result<Vec<Message>, ProcessorError> {
        self.receive_calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Receive::Batch(messages)) => Ok(messages),
            Some(Receive::Fail) => Err(ProcessorError::Timeout(Duration::from_secs(30))),
            None => futures::future::pending().await,
        }
    }

    async fn delete_batch(&self, receipt_handles: &[String]) -> Result<(), ProcessorError> {
        let call = {
            let mut deletes = self.deletes.lock().unwrap();
            deletes.push(receipt_handles.to_vec());
            deletes.len()
        };
        match self.delete_behaviour {
            DeleteBehaviour::Succeed => Ok(()),
            DeleteBehaviour::FailFirst if call == 1 => Err(ProcessorError::PartialDeleteFailure(
                vec!["0: InternalError".to_owned()],
            )),
            DeleteBehaviour::FailFirst => Ok(()),
            DeleteBehaviour::Hang => futures::future::pending().await,
        }
    }
}

/// Records every body it sees. Bodies holding a [`Payload`] follow its
/// action, anything else has to be a valid [`WorkLoad`].
#[derive(Default)]
pub struct TestWorker {
    seen: Arc<Mutex<Vec<String>>>,
}

impl TestWorker {
    pub fn new() -> (Self, Arc<Mutex<Vec<String>>>) {
        let worker = TestWorker::default();
        let seen = Arc::clone(&worker.seen);
        (worker, seen)
    }
}

#[async_trait]
impl Worker for TestWorker {
    async fn process(&self, message: &Message) -> ProcessingResult {
        let body = message
            .body_str()
            .map_err(|e| WorkError::UnRecoverableError(e.to_string()))?
            .to_owned();
        self.seen.lock().unwrap().push(body.clone());

        match serde_json::from_str::<Payload>(&body) {
            Ok(payload) => match payload.action {
                Action::Success => Ok(()),
                Action::FailRequeue => Err(WorkError::RecoverableError(
                    "Received requeue action".to_owned(),
                )),
                Action::FailDelete => Err(WorkError::UnRecoverableError(
                    "Received delete action".to_owned(),
                )),
                Action::Panic => panic!("Received panic action"),
            },
            Err(_) => WorkLoad::from_message(message).map(|_| ()),
        }
    }
}

pub fn config(delete_policy: DeletePolicy) -> Config {
    Config::new(Mode::Local(9324, "test-queue".to_owned()))
        .with_idle_delay(None)
        .with_error_backoff(Duration::from_millis(50))
        .with_delete_policy(delete_policy)
        .with_shutdown_grace(Duration::from_millis(100))
}

/// Polls `condition` until it holds, panicking after [`WAIT`]
pub async fn eventually<F>(condition: F)
where
    F: Fn() -> bool,
{
    let wait = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    };
    tokio::time::timeout(WAIT, wait)
        .await
        .expect("Timed out waiting for condition")
}
