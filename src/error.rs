use crate::config::ConfigError;
use crate::feed::FeedError;
use crate::publish::PublishError;
use crate::stats::StatsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("feed error: {0}")]
    Feed(#[from] FeedError),
    #[error("stats error: {0}")]
    Stats(#[from] StatsError),
    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
    #[error("state lock poisoned")]
    StateLock,
}
