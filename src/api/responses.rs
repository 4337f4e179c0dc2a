use crate::crossing::indicators::IndicatorSet;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CrossingSuccessResponse {
    pub down: bool,
    pub change_time: Option<String>,
    pub average_closure_secs: Option<u64>,
    pub watched_trains: Vec<String>,
    pub indicators: IndicatorSet,
    pub time_left_secs: Option<i64>,
    pub estimated_reopen_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_closure: Option<LastClosureResponse>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct LastClosureResponse {
    pub timestamp: String,
    pub down_time_secs: u64,
    pub trains: Vec<String>,
    pub error_secs: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct CrossingErrorResponse {
    pub error_code: CrossingErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrossingErrorCode {
    NoData,
    InternalError,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Ok,
    Degraded,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthSuccessResponse {
    pub status: HealthStatus,
    pub last_update: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct HealthErrorResponse {
    pub error_code: HealthErrorCode,
    pub error_message: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthErrorCode {
    InternalError,
}
