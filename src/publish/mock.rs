use crate::publish::{PublishError, Publisher};
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub topic: String,
    pub payload: String,
}

/// Publisher that records every message, optionally failing each send.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    messages: Mutex<Vec<PublishedMessage>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            messages: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn messages(&self) -> Vec<PublishedMessage> {
        self.messages
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }

    pub fn payloads_for(&self, topic: &str) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|m| m.topic == topic)
            .map(|m| m.payload)
            .collect()
    }
}

impl Publisher for RecordingPublisher {
    fn publish(&self, topic: &str, payload: String) -> Result<(), PublishError> {
        if self.fail {
            return Err(PublishError::Send {
                topic: topic.to_string(),
                reason: "mock publish failed".to_string(),
            });
        }
        let mut guard = self.messages.lock().map_err(|_| PublishError::Send {
            topic: topic.to_string(),
            reason: "recorder lock poisoned".to_string(),
        })?;
        guard.push(PublishedMessage {
            topic: topic.to_string(),
            payload,
        });
        Ok(())
    }
}
