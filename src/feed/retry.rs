use crate::feed::{FeedError, FeedSource};
use std::time::Duration;
use tracing::{info, warn};

/// How reconnects are attempted. The delay is fixed between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(self, max_attempts: Option<u32>) -> Self {
        Self {
            max_attempts,
            ..self
        }
    }

    fn allows_another(&self, attempts_made: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempts_made < max)
    }
}

/// Connect (and subscribe) until it succeeds. Returns the number of attempts used.
pub async fn connect_with_retry<S: FeedSource>(
    source: &mut S,
    policy: &RetryPolicy,
) -> Result<u32, FeedError> {
    let mut attempts = 0;
    loop {
        attempts += 1;
        match source.connect().await {
            Ok(()) => {
                info!(attempts, "Feed connected");
                return Ok(attempts);
            }
            Err(err) => {
                if !policy.allows_another(attempts) {
                    return Err(FeedError::RetriesExhausted {
                        attempts,
                        last: err.to_string(),
                    });
                }
                warn!(
                    error = %err,
                    attempt = attempts,
                    retry_in_secs = policy.delay.as_secs(),
                    "Feed connect failed"
                );
                tokio::time::sleep(policy.delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feed::mock::ScriptedFeed;

    #[tokio::test]
    async fn retries_until_connected() -> Result<(), FeedError> {
        let mut feed = ScriptedFeed::new(vec![]).failing_connects(2);
        let policy = RetryPolicy::fixed(Duration::ZERO);

        let attempts = connect_with_retry(&mut feed, &policy).await?;

        assert_eq!(attempts, 3);
        assert_eq!(feed.connect_calls(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let mut feed = ScriptedFeed::new(vec![]).failing_connects(5);
        let policy = RetryPolicy::fixed(Duration::ZERO).with_max_attempts(Some(2));

        let result = connect_with_retry(&mut feed, &policy).await;

        assert!(matches!(
            result,
            Err(FeedError::RetriesExhausted { attempts: 2, .. })
        ));
        assert_eq!(feed.connect_calls(), 2);
    }

    #[test]
    fn unlimited_policy_always_allows_another() {
        let policy = RetryPolicy::fixed(Duration::from_secs(120));
        assert!(policy.allows_another(u32::MAX - 1));
        assert!(!policy.with_max_attempts(Some(1)).allows_another(1));
    }
}
