use crate::feed::{FeedError, FeedSource};
use std::collections::VecDeque;

/// Feed that plays back pre-recorded sessions. Each successful connect starts the next session;
/// a session ends (disconnect) when its messages run out.
#[derive(Debug, Default)]
pub struct ScriptedFeed {
    sessions: VecDeque<Vec<String>>,
    current: VecDeque<String>,
    failing_connects: usize,
    connect_calls: usize,
}

impl ScriptedFeed {
    pub fn new(sessions: Vec<Vec<String>>) -> Self {
        Self {
            sessions: sessions.into(),
            ..Self::default()
        }
    }

    /// Fail this many connect attempts before the scripted sessions begin.
    pub fn failing_connects(mut self, count: usize) -> Self {
        self.failing_connects = count;
        self
    }

    pub fn connect_calls(&self) -> usize {
        self.connect_calls
    }
}

impl FeedSource for ScriptedFeed {
    async fn connect(&mut self) -> Result<(), FeedError> {
        self.connect_calls += 1;
        if self.failing_connects > 0 {
            self.failing_connects -= 1;
            return Err(FeedError::Rejected("mock connect refused".to_string()));
        }
        match self.sessions.pop_front() {
            Some(session) => {
                self.current = session.into();
                Ok(())
            }
            None => Err(FeedError::Rejected("no more sessions".to_string())),
        }
    }

    async fn next_message(&mut self) -> Result<Option<String>, FeedError> {
        Ok(self.current.pop_front())
    }
}
