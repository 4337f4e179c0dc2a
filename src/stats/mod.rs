//! Historical closure durations per train.
//!
//! The store is small enough to live in memory and is written out in full
//! through a [`StatsBackend`] after every change.

use crate::timestamp::epoch_seconds_string;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;
use tracing::debug;

pub mod file;

pub use file::JsonFileBackend;

pub type TrainStats = BTreeMap<String, TrainStat>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownTimeEntry {
    pub down_time: u64,
    pub time_stamp: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainStat {
    pub total_time: u64,
    pub stat_count: u64,
    pub down_times: Vec<DownTimeEntry>,
}

impl TrainStat {
    pub fn record(&mut self, down_time: u64, timestamp: SystemTime) {
        self.total_time += down_time;
        self.stat_count += 1;
        self.down_times.push(DownTimeEntry {
            down_time,
            time_stamp: epoch_seconds_string(timestamp),
        });
    }

    /// Mean closure duration in whole seconds, truncated.
    pub fn average(&self) -> Option<u64> {
        self.total_time.checked_div(self.stat_count)
    }
}

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("failed to access stats file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode or decode stats: {0}")]
    Json(#[from] serde_json::Error),
    #[error("stats backend lock poisoned")]
    Lock,
}

/// Durable storage for the whole stats mapping.
pub trait StatsBackend: Send + std::fmt::Debug {
    /// Load the persisted mapping. A missing store is an empty mapping, not an error.
    fn load(&self) -> Result<TrainStats, StatsError>;

    /// Replace the persisted mapping. Readers never observe a partial write.
    ///
    /// May block on file I/O; async callers run it off the scheduler.
    fn save(&self, stats: &TrainStats) -> Result<(), StatsError>;
}

/// Backend that keeps the last saved mapping in memory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    saved: Mutex<Option<TrainStats>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_stats(stats: TrainStats) -> Self {
        Self {
            saved: Mutex::new(Some(stats)),
        }
    }

    pub fn saved(&self) -> Option<TrainStats> {
        self.saved.lock().ok().and_then(|guard| guard.clone())
    }
}

impl StatsBackend for MemoryBackend {
    fn load(&self) -> Result<TrainStats, StatsError> {
        let guard = self.saved.lock().map_err(|_| StatsError::Lock)?;
        Ok(guard.clone().unwrap_or_default())
    }

    fn save(&self, stats: &TrainStats) -> Result<(), StatsError> {
        let mut guard = self.saved.lock().map_err(|_| StatsError::Lock)?;
        *guard = Some(stats.clone());
        Ok(())
    }
}

#[derive(Debug)]
pub struct StatsStore {
    stats: TrainStats,
    backend: Box<dyn StatsBackend>,
}

impl StatsStore {
    /// Load from `backend`.
    ///
    /// A missing store is empty. An unreadable one is an error, so the next
    /// save cannot overwrite history that failed to parse.
    pub fn load(backend: Box<dyn StatsBackend>) -> Result<Self, StatsError> {
        let stats = backend.load()?;
        debug!(trains = stats.len(), "Closure stats loaded");
        Ok(Self { stats, backend })
    }

    pub fn get(&self, train: &str) -> Option<&TrainStat> {
        self.stats.get(train)
    }

    pub fn stats(&self) -> &TrainStats {
        &self.stats
    }

    pub fn average(&self, train: &str) -> Option<u64> {
        self.stats.get(train).and_then(TrainStat::average)
    }

    /// The slowest historical average among `trains`, or `None` if none have history.
    pub fn max_average(&self, trains: &[String]) -> Option<u64> {
        trains.iter().filter_map(|t| self.average(t)).max()
    }

    /// Credit one closure to every train in `trains`, then persist the whole mapping.
    pub fn record_closure(
        &mut self,
        trains: &[String],
        down_time: u64,
        timestamp: SystemTime,
    ) -> Result<(), StatsError> {
        if trains.is_empty() {
            return Ok(());
        }
        for train in trains {
            self.stats
                .entry(train.clone())
                .or_default()
                .record(down_time, timestamp);
        }
        self.backend.save(&self.stats)
    }
}
