//! Main application state management

use std::{
    sync::{Arc, Mutex},
    time::Instant,
};
use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::TimerSnapshot;
use crate::{
    services::PresenceClient,
    tasks::{TimerCommand, TimerHandle},
};

/// Application state shared by all HTTP handlers
pub struct AppState {
    /// Handle to the countdown task that owns the timer
    pub timer: TimerHandle,
    /// Presence counter of this process
    pub presence: Arc<PresenceClient>,
    /// Server metadata
    pub start_time: Instant,
    pub port: u16,
    pub host: String,
    /// Last action tracking
    pub last_action: Arc<Mutex<Option<String>>>,
    pub last_action_time: Arc<Mutex<Option<DateTime<Utc>>>>,
}

impl AppState {
    pub fn new(timer: TimerHandle, presence: Arc<PresenceClient>, port: u16, host: String) -> Self {
        Self {
            timer,
            presence,
            start_time: Instant::now(),
            port,
            host,
            last_action: Arc::new(Mutex::new(None)),
            last_action_time: Arc::new(Mutex::new(None)),
        }
    }

    /// Forward a control command to the timer and record it as the last action
    pub async fn dispatch(&self, command: TimerCommand) -> Result<TimerSnapshot, String> {
        let action = command.action();
        info!("Dispatching timer command: {}", action);

        let snapshot = self.timer.send(command).await
            .map_err(|e| format!("Failed to dispatch {}: {}", action, e))?;

        // Update last action tracking
        if let Ok(mut last_action) = self.last_action.lock() {
            *last_action = Some(action.to_string());
        } else {
            warn!("Failed to record last action");
        }
        if let Ok(mut last_time) = self.last_action_time.lock() {
            *last_time = Some(Utc::now());
        }

        Ok(snapshot)
    }

    /// Get the latest timer snapshot
    pub fn get_timer_snapshot(&self) -> TimerSnapshot {
        self.timer.snapshot()
    }

    /// Calculate server uptime as a formatted string
    pub fn get_uptime(&self) -> String {
        let duration = self.start_time.elapsed();
        let hours = duration.as_secs() / 3600;
        let minutes = (duration.as_secs() % 3600) / 60;
        let seconds = duration.as_secs() % 60;
        
        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Get last action information
    pub fn get_last_action(&self) -> (Option<String>, Option<DateTime<Utc>>) {
        let last_action = self.last_action.lock().ok().and_then(|a| a.clone());
        let last_action_time = self.last_action_time.lock().ok().and_then(|t| *t);
        (last_action, last_action_time)
    }
}
