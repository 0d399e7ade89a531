//! Background tasks module
//! 
//! This module contains background tasks that run alongside the HTTP server.

pub mod countdown;
pub mod presence;

// Re-export main functions
pub use countdown::{spawn_timer, TimerCommand, TimerHandle, TimerHandleError};
pub use presence::{presence_cleanup_task, presence_heartbeat_task, CLEANUP_INTERVAL_SECS};
