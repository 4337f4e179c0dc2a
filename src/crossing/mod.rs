//! The frame-arrival path: decoded events in, barrier state and closure
//! statistics out.
//!
//! Everything here runs on a single task. The only value shared with the
//! ETA publisher is the down-state snapshot, which is replaced whole through
//! [`AppState::set_down_snapshot`].

use crate::error::AppError;
use crate::eta::DownStateSnapshot;
use crate::feed::records::{CrossingEvent, FrameDecoder};
use crate::publish::{Publisher, state_payload};
use crate::state::{AppState, CrossingStatus};
use crate::stats::StatsStore;
use crate::timestamp::signed_seconds_between;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::{debug, info, warn};

pub mod closure;
pub mod indicators;
pub mod trains;

use closure::{ClosureState, Transition};
use indicators::IndicatorSet;
use trains::TrainWatchList;

pub const RESULTS_LOG_CAPACITY: usize = 1000;

/// One completed closure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosureRecord {
    pub timestamp: SystemTime,
    pub trains: Vec<String>,
    pub down_time_secs: u64,
    /// Average that was in force while the barrier was down.
    pub predicted_secs: Option<u64>,
}

impl ClosureRecord {
    /// Predicted minus actual, when a prediction existed.
    pub fn error_secs(&self) -> Option<i64> {
        self.predicted_secs
            .map(|predicted| predicted as i64 - self.down_time_secs as i64)
    }
}

/// What a single batch did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    pub trains_added: usize,
    pub signalling_updates: usize,
    pub transitions: Vec<Transition>,
    /// Value sent on the state topic, if the batch carried signalling.
    pub published_state: Option<bool>,
}

#[derive(Debug)]
pub struct CrossingMonitor {
    decoder: FrameDecoder,
    state_topic: String,
    indicators: IndicatorSet,
    closure: ClosureState,
    average_secs: Option<u64>,
    trains: TrainWatchList,
    stats: StatsStore,
    results: VecDeque<ClosureRecord>,
    publisher: Arc<dyn Publisher>,
    state: Arc<RwLock<AppState>>,
}

impl CrossingMonitor {
    pub fn new(
        decoder: FrameDecoder,
        state_topic: impl Into<String>,
        stats: StatsStore,
        publisher: Arc<dyn Publisher>,
        state: Arc<RwLock<AppState>>,
    ) -> Self {
        Self {
            decoder,
            state_topic: state_topic.into(),
            indicators: IndicatorSet::default(),
            closure: ClosureState::default(),
            average_secs: None,
            trains: TrainWatchList::new(),
            stats,
            results: VecDeque::new(),
            publisher,
            state,
        }
    }

    pub fn indicators(&self) -> IndicatorSet {
        self.indicators
    }

    pub fn closure(&self) -> ClosureState {
        self.closure
    }

    pub fn average_secs(&self) -> Option<u64> {
        self.average_secs
    }

    pub fn watched_trains(&self) -> &[String] {
        self.trains.trains()
    }

    pub fn stats(&self) -> &StatsStore {
        &self.stats
    }

    pub fn results(&self) -> impl Iterator<Item = &ClosureRecord> {
        self.results.iter()
    }

    /// Decode and apply one feed message body.
    pub fn process_message(
        &mut self,
        body: &str,
        now: SystemTime,
    ) -> Result<BatchOutcome, AppError> {
        let events = self.decoder.decode_batch(body);
        self.process_events(events, now)
    }

    /// Apply a decoded batch in order.
    ///
    /// Each signalling update re-evaluates the barrier, so a close and reopen
    /// inside one batch are both seen. Updates at addresses without crossing
    /// indicators leave the bits alone but still count as signalling. The
    /// state topic is written once per batch that carried signalling, whether
    /// or not anything changed.
    pub fn process_events(
        &mut self,
        events: Vec<CrossingEvent>,
        now: SystemTime,
    ) -> Result<BatchOutcome, AppError> {
        let mut outcome = BatchOutcome::default();

        for event in events {
            match event {
                CrossingEvent::TrainEntered { descr } => {
                    if self.trains.observe(&descr) {
                        info!(train = %descr, "Train detected in watch zone");
                        outcome.trains_added += 1;
                    }
                }
                CrossingEvent::Signalling { address, data } => {
                    outcome.signalling_updates += 1;
                    if IndicatorSet::is_significant(address) {
                        self.indicators = self.indicators.apply(address, data);
                        debug!(
                            address = format_args!("{address:#04x}"),
                            data = format_args!("{data:#04x}"),
                            indicators = ?self.indicators,
                            "Signalling update applied"
                        );
                    }
                    if let Some(transition) = self.evaluate(now)? {
                        outcome.transitions.push(transition);
                    }
                }
            }
        }

        if outcome.signalling_updates > 0 {
            let down = self.closure.is_down();
            if let Err(err) = self.publisher.publish(&self.state_topic, state_payload(down)) {
                warn!(error = %err, "Failed to publish crossing state");
            }
            outcome.published_state = Some(down);
        }

        if outcome.signalling_updates > 0 || outcome.trains_added > 0 {
            self.publish_status(now)?;
        }

        Ok(outcome)
    }

    fn evaluate(&mut self, now: SystemTime) -> Result<Option<Transition>, AppError> {
        let new_down = self.indicators.any_set();
        let transition = self.closure.update(new_down, now);

        match transition {
            Some(Transition::WentDown) => {
                self.average_secs = self.stats.max_average(self.trains.trains());
                info!(
                    trains = ?self.trains.trains(),
                    average_secs = ?self.average_secs,
                    "Barrier down"
                );
            }
            Some(Transition::WentUp {
                down_time_secs: Some(down_time),
            }) => self.complete_closure(down_time, now)?,
            Some(Transition::WentUp {
                down_time_secs: None,
            }) => {
                debug!("Barrier up with unknown start, closure not recorded");
            }
            None => {}
        }

        let snapshot = self.down_snapshot(now);
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_down_snapshot(snapshot);

        Ok(transition)
    }

    fn complete_closure(&mut self, down_time: u64, now: SystemTime) -> Result<(), AppError> {
        let trains = self.trains.take();
        let record = ClosureRecord {
            timestamp: now,
            trains,
            down_time_secs: down_time,
            predicted_secs: self.average_secs,
        };
        info!(
            down_time_secs = down_time,
            average_secs = ?record.predicted_secs,
            error_secs = ?record.error_secs(),
            trains = ?record.trains,
            "Barrier up"
        );

        if let Err(err) = self.stats.record_closure(&record.trains, down_time, now) {
            warn!(error = %err, "Failed to persist closure stats");
        }

        if self.results.len() == RESULTS_LOG_CAPACITY {
            self.results.pop_front();
        }
        self.results.push_back(record.clone());

        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_last_closure(record);
        Ok(())
    }

    /// Snapshot for the ETA publisher; only while down with a usable average.
    fn down_snapshot(&self, now: SystemTime) -> Option<DownStateSnapshot> {
        if !self.closure.is_down() {
            return None;
        }
        let average = self.average_secs.filter(|avg| *avg > 0)?;
        let change_time = self.closure.change_time?;
        let elapsed = signed_seconds_between(change_time, now);
        Some(DownStateSnapshot {
            timestamp: now,
            time_left_secs: average as f64 - elapsed,
        })
    }

    fn publish_status(&self, now: SystemTime) -> Result<(), AppError> {
        let status = CrossingStatus {
            down: self.closure.is_down(),
            change_time: self.closure.change_time,
            average_closure_secs: self.average_secs,
            watched_trains: self.trains.trains().to_vec(),
            indicators: self.indicators,
            updated_at: now,
        };
        let mut guard = self.state.write().map_err(|_| AppError::StateLock)?;
        guard.set_status(status);
        Ok(())
    }
}
