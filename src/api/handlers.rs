use crate::api::responses::{
    CrossingErrorCode, CrossingErrorResponse, CrossingSuccessResponse, HealthErrorCode,
    HealthErrorResponse, HealthStatus, HealthSuccessResponse, LastClosureResponse,
};
use crate::crossing::ClosureRecord;
use crate::eta::extrapolate;
use crate::state::AppState;
use crate::timestamp::format_rfc3339;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;
use tracing::error;

const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

pub enum CrossingResponse {
    Success(CrossingSuccessResponse),
    Error {
        status: StatusCode,
        body: CrossingErrorResponse,
    },
}

impl IntoResponse for CrossingResponse {
    fn into_response(self) -> Response {
        match self {
            CrossingResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            CrossingResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_crossing(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_crossing_response(state, SystemTime::now())
}

pub enum HealthResponse {
    Success(HealthSuccessResponse),
    Error {
        status: StatusCode,
        body: HealthErrorResponse,
    },
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        match self {
            HealthResponse::Success(body) => (StatusCode::OK, Json(body)).into_response(),
            HealthResponse::Error { status, body } => (status, Json(body)).into_response(),
        }
    }
}

pub async fn get_health(State(state): State<Arc<RwLock<AppState>>>) -> impl IntoResponse {
    build_health_response(state, SystemTime::now())
}

fn build_crossing_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> CrossingResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return crossing_internal_error("state lock poisoned while reading crossing status");
        }
    };
    let status = guard.status().cloned();
    let snapshot = guard.down_snapshot();
    let last_closure = guard.last_closure().cloned();
    drop(guard);

    let Some(status) = status else {
        return CrossingResponse::Error {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: CrossingErrorResponse {
                error_code: CrossingErrorCode::NoData,
                error_message: "No signalling data received yet".to_string(),
                timestamp: format_or_fallback(now),
            },
        };
    };

    let estimate = snapshot.map(|snapshot| extrapolate(&snapshot, now));
    let timestamp = match format_rfc3339(now) {
        Ok(formatted) => formatted,
        Err(_) => return crossing_internal_error("timestamp formatting failure"),
    };

    CrossingResponse::Success(CrossingSuccessResponse {
        down: status.down,
        change_time: status.change_time.and_then(|t| format_rfc3339(t).ok()),
        average_closure_secs: status.average_closure_secs,
        watched_trains: status.watched_trains,
        indicators: status.indicators,
        time_left_secs: estimate.map(|e| e.time_left_secs()),
        estimated_reopen_time: estimate.and_then(|e| format_rfc3339(e.estimated_reopen).ok()),
        last_closure: last_closure.map(last_closure_response),
        timestamp,
    })
}

fn last_closure_response(record: ClosureRecord) -> LastClosureResponse {
    LastClosureResponse {
        timestamp: format_or_fallback(record.timestamp),
        down_time_secs: record.down_time_secs,
        error_secs: record.error_secs(),
        trains: record.trains,
    }
}

fn crossing_internal_error(message: &str) -> CrossingResponse {
    error!(
        message = message,
        "Internal error while handling /api/crossing"
    );
    CrossingResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: CrossingErrorResponse {
            error_code: CrossingErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: format_or_fallback(SystemTime::now()),
        },
    }
}

fn build_health_response(state: Arc<RwLock<AppState>>, now: SystemTime) -> HealthResponse {
    let guard = match state.read() {
        Ok(guard) => guard,
        Err(_) => {
            return health_internal_error("state lock poisoned while reading crossing status");
        }
    };
    let last_update = guard.status().map(|status| status.updated_at);
    drop(guard);

    let status = if last_update.is_some() {
        HealthStatus::Ok
    } else {
        HealthStatus::Degraded
    };

    match format_rfc3339(now) {
        Ok(timestamp) => HealthResponse::Success(HealthSuccessResponse {
            status,
            last_update: last_update.and_then(|t| format_rfc3339(t).ok()),
            timestamp,
        }),
        Err(_) => health_internal_error("timestamp formatting failure"),
    }
}

fn health_internal_error(message: &str) -> HealthResponse {
    error!(message = message, "Internal error while handling /api/health");
    HealthResponse::Error {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: HealthErrorResponse {
            error_code: HealthErrorCode::InternalError,
            error_message: INTERNAL_ERROR_MESSAGE.to_string(),
            timestamp: format_or_fallback(SystemTime::now()),
        },
    }
}

fn format_or_fallback(timestamp: SystemTime) -> String {
    format_rfc3339(timestamp).unwrap_or_else(|err| {
        error!(error = %err, "Failed to format timestamp");
        FALLBACK_TIMESTAMP.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crossing::indicators::IndicatorSet;
    use crate::eta::DownStateSnapshot;
    use crate::state::CrossingStatus;
    use std::time::{Duration, UNIX_EPOCH};

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn down_status() -> CrossingStatus {
        CrossingStatus {
            down: true,
            change_time: Some(at(100)),
            average_closure_secs: Some(120),
            watched_trains: vec!["1W23".to_string()],
            indicators: IndicatorSet {
                spw5261: true,
                ..IndicatorSet::default()
            },
            updated_at: at(110),
        }
    }

    #[test]
    fn crossing_returns_no_data_before_first_batch() {
        let state = Arc::new(RwLock::new(AppState::new()));

        match build_crossing_response(state, at(1)) {
            CrossingResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
                assert_eq!(body.error_code, CrossingErrorCode::NoData);
                assert_eq!(body.timestamp, "1970-01-01T00:00:01Z");
            }
            CrossingResponse::Success(_) => panic!("expected no data"),
        }
    }

    #[test]
    fn crossing_extrapolates_time_left_from_snapshot() {
        let mut app_state = AppState::new();
        app_state.set_status(down_status());
        app_state.set_down_snapshot(Some(DownStateSnapshot {
            timestamp: at(110),
            time_left_secs: 110.0,
        }));
        let state = Arc::new(RwLock::new(app_state));

        match build_crossing_response(state, at(140)) {
            CrossingResponse::Success(body) => {
                assert!(body.down);
                assert_eq!(body.time_left_secs, Some(80));
                assert_eq!(
                    body.estimated_reopen_time.as_deref(),
                    Some("1970-01-01T00:03:40Z")
                );
                assert_eq!(body.change_time.as_deref(), Some("1970-01-01T00:01:40Z"));
                assert_eq!(body.watched_trains, vec!["1W23".to_string()]);
                assert!(body.indicators.spw5261);
                assert!(body.last_closure.is_none());
            }
            CrossingResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn crossing_includes_last_closure() {
        let mut app_state = AppState::new();
        app_state.set_status(CrossingStatus {
            down: false,
            ..down_status()
        });
        app_state.set_last_closure(ClosureRecord {
            timestamp: at(220),
            trains: vec!["1W23".to_string()],
            down_time_secs: 120,
            predicted_secs: Some(100),
        });
        let state = Arc::new(RwLock::new(app_state));

        match build_crossing_response(state, at(230)) {
            CrossingResponse::Success(body) => {
                assert_eq!(body.time_left_secs, None);
                let closure = body.last_closure.expect("last closure");
                assert_eq!(closure.down_time_secs, 120);
                assert_eq!(closure.error_secs, Some(-20));
            }
            CrossingResponse::Error { status, .. } => {
                panic!("expected success response, got error: {status}");
            }
        }
    }

    #[test]
    fn health_is_degraded_until_data_arrives() {
        let state = Arc::new(RwLock::new(AppState::new()));

        match build_health_response(Arc::clone(&state), at(5)) {
            HealthResponse::Success(body) => {
                assert_eq!(body.status, HealthStatus::Degraded);
                assert!(body.last_update.is_none());
            }
            HealthResponse::Error { .. } => panic!("expected success"),
        }

        state.write().expect("state lock").set_status(down_status());

        match build_health_response(state, at(120)) {
            HealthResponse::Success(body) => {
                assert_eq!(body.status, HealthStatus::Ok);
                assert_eq!(body.last_update.as_deref(), Some("1970-01-01T00:01:50Z"));
            }
            HealthResponse::Error { .. } => panic!("expected success"),
        }
    }

    #[test]
    fn poisoned_lock_returns_internal_error() {
        let state = Arc::new(RwLock::new(AppState::new()));
        let poison = Arc::clone(&state);
        let _ = std::thread::spawn(move || {
            let _guard = poison.write().expect("lock");
            panic!("poison the lock");
        })
        .join();

        match build_crossing_response(state, at(1)) {
            CrossingResponse::Error { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body.error_code, CrossingErrorCode::InternalError);
            }
            CrossingResponse::Success(_) => panic!("expected internal error"),
        }
    }
}
