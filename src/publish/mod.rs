//! Outbound notification channel.

use thiserror::Error;

pub mod mock;
pub mod mqtt;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish to {topic} failed: {reason}")]
    Send { topic: String, reason: String },
}

/// Fire-and-forget publisher. Implementations must not block the caller.
pub trait Publisher: Send + Sync + std::fmt::Debug {
    fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError>;
}

/// Payload for the crossing state topic.
pub fn state_payload(down: bool) -> String {
    if down { "true" } else { "false" }.to_string()
}
