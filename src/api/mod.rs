//! HTTP API module
//! 
//! This module contains all HTTP endpoint handlers and response structures.

pub mod handlers;
pub mod responses;

use std::sync::Arc;
use axum::{
    routing::{delete, get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use handlers::*;

/// Create the HTTP router with all endpoints
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/timer", get(timer_handler))
        .route("/timer/start", post(start_handler))
        .route("/timer/pause", post(pause_handler))
        .route("/timer/reset", post(reset_handler))
        .route("/timer/mode/:mode", post(mode_handler))
        .route("/timer/mute", post(mute_handler))
        .route("/timer/alarm/stop", post(stop_alarm_handler))
        .route("/timer/dismiss", post(dismiss_handler))
        .route("/timer/visibility", post(visibility_handler))
        .route("/settings", get(get_settings_handler).patch(update_settings_handler))
        .route("/presence", get(presence_handler))
        .route("/presence/heartbeat", post(heartbeat_handler))
        .route("/presence/:client_id", delete(end_session_handler))
        .route("/status", get(status_handler))
        .route("/health", get(health_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
