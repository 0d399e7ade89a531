//! State management module
//! 
//! This module contains the timer state machine, its settings and snapshot
//! types, and the shared application state handed to the HTTP handlers.

pub mod app_state;
pub mod settings;
pub mod timer_core;
pub mod timer_state;

// Re-export main types
pub use app_state::AppState;
pub use settings::{SettingsPatch, ThemeColor, TimerSettings};
pub use timer_core::{Effect, Effects, TimerCore};
pub use timer_state::{TimerMode, TimerPhase, TimerSnapshot};
