//! Live "time to reopen" extrapolation.
//!
//! The monitor replaces a [`DownStateSnapshot`] whenever it re-evaluates the
//! barrier. This task never consults the monitor: on each tick it copies the
//! latest snapshot out of the watch channel and projects it forward to now.

use crate::publish::Publisher;
use crate::timestamp::{
    epoch_seconds_string, format_rfc3339, offset_by_seconds, signed_seconds_between,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Remaining closure time as known at `timestamp`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DownStateSnapshot {
    pub timestamp: SystemTime,
    pub time_left_secs: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaEstimate {
    pub timestamp: SystemTime,
    pub remaining_secs: f64,
    pub estimated_reopen: SystemTime,
}

impl EtaEstimate {
    /// Whole seconds left, floored.
    pub fn time_left_secs(&self) -> i64 {
        self.remaining_secs.floor() as i64
    }
}

/// Wire format of the ETA topic.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct EtaPayload {
    #[serde(rename = "timeStamp")]
    pub time_stamp: String,
    #[serde(rename = "timeLeft")]
    pub time_left: i64,
    #[serde(rename = "estTimeUp")]
    pub est_time_up: String,
}

impl EtaPayload {
    pub fn from_estimate(estimate: &EtaEstimate) -> Self {
        let est_time_up = format_rfc3339(estimate.estimated_reopen)
            .unwrap_or_else(|_| epoch_seconds_string(estimate.estimated_reopen));
        Self {
            time_stamp: epoch_seconds_string(estimate.timestamp),
            time_left: estimate.time_left_secs(),
            est_time_up,
        }
    }
}

/// Project `snapshot` forward to `now`. No correction is applied; stale snapshots go negative.
pub fn extrapolate(snapshot: &DownStateSnapshot, now: SystemTime) -> EtaEstimate {
    let elapsed = signed_seconds_between(snapshot.timestamp, now);
    let remaining_secs = snapshot.time_left_secs - elapsed;
    EtaEstimate {
        timestamp: now,
        remaining_secs,
        estimated_reopen: offset_by_seconds(now, remaining_secs),
    }
}

/// One publisher tick. Returns the estimate sent, or `None` when the crossing has no live snapshot.
pub fn run_eta_tick(
    snapshots: &watch::Receiver<Option<DownStateSnapshot>>,
    publisher: &dyn Publisher,
    topic: &str,
    now: SystemTime,
) -> Option<EtaEstimate> {
    // Copy out so the sender is never held up by this tick.
    let snapshot = (*snapshots.borrow())?;
    let estimate = extrapolate(&snapshot, now);
    let payload = EtaPayload::from_estimate(&estimate);

    match serde_json::to_string(&payload) {
        Ok(body) => {
            debug!(
                time_left = payload.time_left,
                est_time_up = %payload.est_time_up,
                "Publishing time to reopen"
            );
            if let Err(err) = publisher.publish(topic, body) {
                warn!(error = %err, "Failed to publish time to reopen");
            }
        }
        Err(err) => warn!(error = %err, "Failed to encode time to reopen"),
    }

    Some(estimate)
}

pub fn spawn_eta_publisher(
    snapshots: watch::Receiver<Option<DownStateSnapshot>>,
    publisher: Arc<dyn Publisher>,
    topic: String,
    interval: Duration,
) -> JoinHandle<()> {
    info!(
        interval_ms = interval.as_millis(),
        topic = %topic,
        "Starting ETA publisher"
    );
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            run_eta_tick(&snapshots, publisher.as_ref(), &topic, SystemTime::now());
        }
    })
}
