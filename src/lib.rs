//! A long running worker that drains an SQS queue.
//!
//! A [`processor::Processor`] repeatedly long-polls a [`queue::QueueClient`]
//! for a batch of messages, hands each one to a [`work::Worker`] and
//! acknowledges them according to the configured
//! [`config::DeletePolicy`], until its cancellation token fires.

#[macro_use]
extern crate log;

pub mod config;
pub mod errors;
pub mod processor;
pub mod queue;
pub mod sqs;
pub mod work;
