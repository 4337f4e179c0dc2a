use crate::state::AppState;
use axum::Router;
use axum::routing::get;
use std::sync::{Arc, RwLock};

pub mod handlers;
pub mod responses;

pub fn router(state: Arc<RwLock<AppState>>) -> Router {
    Router::new()
        .route("/api/crossing", get(handlers::get_crossing))
        .route("/api/health", get(handlers::get_health))
        .with_state(state)
}
