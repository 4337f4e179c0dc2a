use crate::crossing::ClosureRecord;
use crate::crossing::indicators::IndicatorSet;
use crate::eta::DownStateSnapshot;
use std::time::SystemTime;
use tokio::sync::watch;

/// Crossing state as of the last processed batch.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossingStatus {
    pub down: bool,
    pub change_time: Option<SystemTime>,
    pub average_closure_secs: Option<u64>,
    pub watched_trains: Vec<String>,
    pub indicators: IndicatorSet,
    pub updated_at: SystemTime,
}

#[derive(Debug)]
pub struct AppState {
    status: Option<CrossingStatus>,
    status_tx: watch::Sender<Option<CrossingStatus>>,
    down_snapshot_tx: watch::Sender<Option<DownStateSnapshot>>,
    last_closure: Option<ClosureRecord>,
}

impl AppState {
    pub fn new() -> Self {
        let (status_tx, _status_rx) = watch::channel(None);
        let (down_snapshot_tx, _down_snapshot_rx) = watch::channel(None);
        Self {
            status: None,
            status_tx,
            down_snapshot_tx,
            last_closure: None,
        }
    }

    pub fn status(&self) -> Option<&CrossingStatus> {
        self.status.as_ref()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<Option<CrossingStatus>> {
        self.status_tx.subscribe()
    }

    pub fn set_status(&mut self, status: CrossingStatus) {
        self.status = Some(status.clone());
        self.status_tx.send_replace(Some(status));
    }

    /// Copy of the current snapshot.
    pub fn down_snapshot(&self) -> Option<DownStateSnapshot> {
        *self.down_snapshot_tx.borrow()
    }

    pub fn subscribe_down_snapshot(&self) -> watch::Receiver<Option<DownStateSnapshot>> {
        self.down_snapshot_tx.subscribe()
    }

    /// Replace the snapshot as a whole value; subscribers see either the old or the new one.
    pub fn set_down_snapshot(&mut self, snapshot: Option<DownStateSnapshot>) {
        self.down_snapshot_tx.send_replace(snapshot);
    }

    pub fn last_closure(&self) -> Option<&ClosureRecord> {
        self.last_closure.as_ref()
    }

    pub fn set_last_closure(&mut self, record: ClosureRecord) {
        self.last_closure = Some(record);
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}
