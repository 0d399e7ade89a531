//! Tomato Timer - A state-managed HTTP server hosting a pomodoro timer
//! 
//! The timer itself is a pure state machine (`state::TimerCore`). A
//! background task drives it with one-second ticks, plays the alarm and
//! persists settings, while the HTTP API exposes the control surface and a
//! presence counter of active sessions.

pub mod config;
pub mod state;
pub mod storage;
pub mod api;
pub mod services;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use state::{AppState, TimerCore, TimerMode, TimerSettings, TimerSnapshot};
pub use api::create_router;
pub use tasks::{spawn_timer, TimerCommand, TimerHandle};
pub use utils::signals::shutdown_signal;
