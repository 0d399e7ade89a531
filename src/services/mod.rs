//! External collaborators
//! 
//! Alarm playback and the presence counter. Both are best effort: their
//! failures are logged and never reach the timer core.

pub mod alarm;
pub mod presence;

// Re-export main types
pub use alarm::{AlarmError, AlarmPlayer, CommandAlarm, SilentAlarm};
pub use presence::{
    generate_client_id, LocalPresence, PresenceBackend, PresenceClient, PresenceError,
    ACTIVE_WINDOW_SECS, HEARTBEAT_INTERVAL_SECS, STALE_SESSION_SECS,
};
