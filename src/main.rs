#[macro_use]
extern crate log;

use sqs_queue_worker::config::Cli;
use sqs_queue_worker::errors::ProcessorError;
use sqs_queue_worker::processor::Processor;
use sqs_queue_worker::sqs::SqsClient;
use sqs_queue_worker::work::LoggingWorker;
use std::process;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        error!("{}", e);
        process::exit(1);
    }
}

async fn run() -> Result<(), ProcessorError> {
    let config = Cli::new().build_config()?;
    let client = SqsClient::from_config(&config)?;
    let processor = Processor::new(&config, Arc::new(client), Box::new(LoggingWorker));
    let handle = processor.start();

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => error!("Could not listen for Ctrl-C, shutting down: {}", e),
    }
    handle.stop().await
}
