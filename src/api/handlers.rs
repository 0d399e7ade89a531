//! HTTP endpoint handlers

use std::sync::Arc;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use tracing::{error, info, warn};

use crate::{
    services::ACTIVE_WINDOW_SECS,
    state::{AppState, SettingsPatch, TimerMode, TimerSettings, TimerSnapshot},
    tasks::TimerCommand,
};
use super::responses::{
    ApiResponse, EndSessionResponse, ErrorResponse, HealthResponse, HeartbeatRequest,
    PresenceResponse, StatusResponse, VisibilityRequest,
};

type HandlerResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

/// Forward a command to the timer and wrap the resulting snapshot
async fn run_command(state: &AppState, command: TimerCommand, message: &str) -> HandlerResult<ApiResponse> {
    match state.dispatch(command).await {
        Ok(snapshot) => Ok(Json(ApiResponse::new(message, snapshot))),
        Err(e) => {
            error!("{}", e);
            Err((StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse::new(e))))
        }
    }
}

/// Handle GET /timer - Current timer snapshot
pub async fn timer_handler(State(state): State<Arc<AppState>>) -> Json<TimerSnapshot> {
    Json(state.get_timer_snapshot())
}

/// Handle POST /timer/start
pub async fn start_handler(State(state): State<Arc<AppState>>) -> HandlerResult<ApiResponse> {
    run_command(&state, TimerCommand::Start, "Timer started").await
}

/// Handle POST /timer/pause
pub async fn pause_handler(State(state): State<Arc<AppState>>) -> HandlerResult<ApiResponse> {
    run_command(&state, TimerCommand::Pause, "Timer paused").await
}

/// Handle POST /timer/reset
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> HandlerResult<ApiResponse> {
    run_command(&state, TimerCommand::Reset, "Timer reset").await
}

/// Handle POST /timer/mode/:mode - Switch mode
pub async fn mode_handler(
    State(state): State<Arc<AppState>>,
    Path(mode): Path<String>,
) -> HandlerResult<ApiResponse> {
    let mode: TimerMode = match mode.parse() {
        Ok(mode) => mode,
        Err(e) => {
            warn!("Rejected mode switch: {}", e);
            return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse::new(e))));
        }
    };

    let message = format!("Switched to {}", mode);
    run_command(&state, TimerCommand::SetMode(mode), &message).await
}

/// Handle POST /timer/mute - Toggle mute
pub async fn mute_handler(State(state): State<Arc<AppState>>) -> HandlerResult<ApiResponse> {
    let mut response = run_command(&state, TimerCommand::ToggleMute, "Mute toggled").await?;
    response.message = if response.timer.is_muted { "Muted" } else { "Unmuted" }.to_string();
    Ok(response)
}

/// Handle POST /timer/alarm/stop
pub async fn stop_alarm_handler(State(state): State<Arc<AppState>>) -> HandlerResult<ApiResponse> {
    run_command(&state, TimerCommand::StopAlarm, "Alarm stopped").await
}

/// Handle POST /timer/dismiss - Acknowledge completion and move to the next mode
pub async fn dismiss_handler(State(state): State<Arc<AppState>>) -> HandlerResult<ApiResponse> {
    run_command(&state, TimerCommand::DismissCompletion, "Completion dismissed").await
}

/// Handle POST /timer/visibility - The view reports being hidden or shown
pub async fn visibility_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<VisibilityRequest>,
) -> HandlerResult<ApiResponse> {
    let message = if request.hidden { "View hidden" } else { "View visible" };
    run_command(&state, TimerCommand::VisibilityChanged { hidden: request.hidden }, message).await
}

/// Handle GET /settings
pub async fn get_settings_handler(State(state): State<Arc<AppState>>) -> Json<TimerSettings> {
    Json(state.get_timer_snapshot().settings)
}

/// Handle PATCH /settings - Merge and persist a partial update
pub async fn update_settings_handler(
    State(state): State<Arc<AppState>>,
    Json(patch): Json<SettingsPatch>,
) -> HandlerResult<ApiResponse> {
    run_command(&state, TimerCommand::UpdateSettings(patch), "Settings updated").await
}

/// Handle GET /presence - Active session count
pub async fn presence_handler(State(state): State<Arc<AppState>>) -> Json<PresenceResponse> {
    Json(PresenceResponse {
        active_users: state.presence.active_count(),
        window_seconds: ACTIVE_WINDOW_SECS,
        timestamp: chrono::Utc::now(),
    })
}

/// Handle POST /presence/heartbeat - Register or refresh a browser session
pub async fn heartbeat_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<HeartbeatRequest>,
) -> HandlerResult<PresenceResponse> {
    let client_id = request.client_id.trim();
    if client_id.is_empty() {
        return Err((StatusCode::BAD_REQUEST, Json(ErrorResponse::new("clientId must not be empty"))));
    }

    let presence = &state.presence;
    if let Err(e) = presence.backend().report_heartbeat(client_id, presence.page()) {
        warn!("Heartbeat from {} failed: {}", client_id, e);
        return Err((StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse::new(e.to_string()))));
    }
    presence.refresh();

    Ok(Json(PresenceResponse {
        active_users: presence.active_count(),
        window_seconds: ACTIVE_WINDOW_SECS,
        timestamp: chrono::Utc::now(),
    }))
}

/// Handle DELETE /presence/:client_id - End a browser session
pub async fn end_session_handler(
    State(state): State<Arc<AppState>>,
    Path(client_id): Path<String>,
) -> HandlerResult<EndSessionResponse> {
    let presence = &state.presence;
    match presence.backend().end_session(&client_id, presence.page()) {
        Ok(ended) => {
            info!("Presence session {} ended: {}", client_id, ended);
            presence.refresh();
            Ok(Json(EndSessionResponse { client_id, ended }))
        }
        Err(e) => {
            warn!("Failed to end presence session {}: {}", client_id, e);
            Err((StatusCode::SERVICE_UNAVAILABLE, Json(ErrorResponse::new(e.to_string()))))
        }
    }
}

/// Handle GET /status - Timer, presence and server status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let (last_action, last_action_time) = state.get_last_action();

    Json(StatusResponse {
        timer: state.get_timer_snapshot(),
        active_users: state.presence.active_count(),
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    })
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
