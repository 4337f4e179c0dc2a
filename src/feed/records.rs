//! Decoding of train describer batches.
//!
//! A feed message body is a JSON array of single-key objects, the key naming
//! the record type. Only berth steps (`CA_MSG`) and signalling updates
//! (`SF_MSG`) matter here; anything else, or anything malformed, is skipped
//! without affecting the rest of the batch.

use crate::crossing::trains::WatchZone;
use serde::Deserialize;
use tracing::debug;

const BERTH_STEP: &str = "CA";
const SIGNALLING_UPDATE: &str = "SF";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BerthStep {
    pub area_id: String,
    pub msg_type: String,
    pub to: String,
    pub descr: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SignallingUpdate {
    pub area_id: String,
    pub msg_type: String,
    pub address: String,
    pub data: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub enum FeedRecord {
    #[serde(rename = "CA_MSG")]
    BerthStep(BerthStep),
    #[serde(rename = "SF_MSG")]
    SignallingUpdate(SignallingUpdate),
}

/// A record that concerns the crossing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrossingEvent {
    TrainEntered { descr: String },
    Signalling { address: u16, data: u16 },
}

/// Filters records down to the configured area and watch zone.
#[derive(Debug, Clone)]
pub struct FrameDecoder {
    area_id: String,
    watch_zone: WatchZone,
}

impl FrameDecoder {
    pub fn new(area_id: impl Into<String>, watch_zone: WatchZone) -> Self {
        Self {
            area_id: area_id.into(),
            watch_zone,
        }
    }

    /// Decode one message body. An unparseable body yields no events.
    pub fn decode_batch(&self, body: &str) -> Vec<CrossingEvent> {
        let values: Vec<serde_json::Value> = match serde_json::from_str(body) {
            Ok(values) => values,
            Err(err) => {
                debug!(error = %err, "Ignoring feed message that is not a JSON array");
                return Vec::new();
            }
        };

        values
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<FeedRecord>(value) {
                Ok(record) => self.classify(record),
                Err(err) => {
                    debug!(error = %err, "Skipping unrecognised record");
                    None
                }
            })
            .collect()
    }

    pub fn classify(&self, record: FeedRecord) -> Option<CrossingEvent> {
        match record {
            FeedRecord::BerthStep(step) => {
                if step.msg_type != BERTH_STEP || step.area_id != self.area_id {
                    return None;
                }
                if !self.watch_zone.contains(&step.to) {
                    return None;
                }
                Some(CrossingEvent::TrainEntered { descr: step.descr })
            }
            FeedRecord::SignallingUpdate(update) => {
                if update.msg_type != SIGNALLING_UPDATE || update.area_id != self.area_id {
                    return None;
                }
                let address = parse_hex(&update.address)?;
                let data = parse_hex(&update.data)?;
                Some(CrossingEvent::Signalling { address, data })
            }
        }
    }
}

fn parse_hex(text: &str) -> Option<u16> {
    match u16::from_str_radix(text.trim(), 16) {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(value = text, error = %err, "Skipping record with invalid hex field");
            None
        }
    }
}
