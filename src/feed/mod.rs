//! Upstream signalling feed: transport, reconnects and the frame-arrival loop.

use crate::crossing::{BatchOutcome, CrossingMonitor};
use crate::error::AppError;
use std::future::Future;
use std::time::SystemTime;
use thiserror::Error;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, warn};

pub mod mock;
pub mod records;
pub mod retry;
pub mod stomp;

use retry::{RetryPolicy, connect_with_retry};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("feed i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection rejected: {0}")]
    Rejected(String),
    #[error("broker error: {0}")]
    Broker(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("timed out waiting for the feed")]
    Timeout,
    #[error("feed not connected")]
    NotConnected,
    #[error("gave up after {attempts} connect attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

/// A subscribed source of message bodies.
pub trait FeedSource {
    /// Connect and (re)subscribe. Called again after every disconnect.
    fn connect(&mut self) -> impl Future<Output = Result<(), FeedError>> + Send;

    /// Next message body, or `None` once the connection has closed.
    fn next_message(&mut self) -> impl Future<Output = Result<Option<String>, FeedError>> + Send;
}

/// Feed every message into `monitor`, reconnecting on disconnect.
///
/// Only returns when `policy` gives up on reconnecting.
pub async fn run_feed<S: FeedSource>(
    source: &mut S,
    policy: &RetryPolicy,
    monitor: &mut CrossingMonitor,
) -> FeedError {
    loop {
        if let Err(err) = connect_with_retry(source, policy).await {
            return err;
        }

        loop {
            match source.next_message().await {
                Ok(Some(body)) => match process_blocking(monitor, &body) {
                    Ok(outcome) => debug!(
                        trains_added = outcome.trains_added,
                        signalling_updates = outcome.signalling_updates,
                        transitions = outcome.transitions.len(),
                        "Feed message processed"
                    ),
                    Err(err) => warn!(error = %err, "Failed to process feed message"),
                },
                Ok(None) => {
                    warn!("Feed disconnected, reconnecting");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "Feed error, reconnecting");
                    break;
                }
            }
        }
    }
}

/// Stats persistence does blocking file I/O, so on a multi-threaded runtime
/// the batch runs via `block_in_place` to keep other tasks moving.
fn process_blocking(
    monitor: &mut CrossingMonitor,
    body: &str,
) -> Result<BatchOutcome, AppError> {
    let mut process = || monitor.process_message(body, SystemTime::now());
    match Handle::try_current().map(|handle| handle.runtime_flavor()) {
        Ok(RuntimeFlavor::MultiThread) => tokio::task::block_in_place(process),
        _ => process(),
    }
}
