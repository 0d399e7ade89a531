//! Presence counter for concurrently active sessions
//!
//! Clients send a heartbeat every [`HEARTBEAT_INTERVAL_SECS`]; a session
//! counts as active while its last heartbeat is within
//! [`ACTIVE_WINDOW_SECS`]. The backend is swappable behind
//! [`PresenceBackend`]; [`LocalPresence`] keeps everything in process.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use chrono::{DateTime, Duration, Utc};
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;
pub const ACTIVE_WINDOW_SECS: i64 = 60;
pub const STALE_SESSION_SECS: i64 = 120;

/// Page all sessions of this application register under
pub const DEFAULT_PAGE: &str = "home";

#[derive(Debug, Clone, thiserror::Error)]
pub enum PresenceError {
    #[error("presence backend unavailable: {0}")]
    Unavailable(String),
    #[error("presence state lock poisoned")]
    Poisoned,
}

pub type PresenceResult<T> = Result<T, PresenceError>;

pub trait PresenceBackend: Send + Sync {
    /// Register or refresh a session
    fn report_heartbeat(&self, client_id: &str, page: &str) -> PresenceResult<()>;

    /// Drop a session; returns whether it existed
    fn end_session(&self, client_id: &str, page: &str) -> PresenceResult<bool>;

    /// Number of sessions on `page` seen within the last `window_secs`
    fn query_active_count(&self, page: &str, window_secs: i64) -> PresenceResult<usize>;

    /// Remove sessions idle for longer than `max_idle_secs`; returns how many
    fn cleanup_inactive(&self, max_idle_secs: i64) -> PresenceResult<usize>;

    /// Change notifications, for backends that can push them
    fn subscribe(&self) -> Option<broadcast::Receiver<()>> {
        None
    }
}

/// In-process presence backend
#[derive(Debug)]
pub struct LocalPresence {
    sessions: Mutex<HashMap<(String, String), DateTime<Utc>>>,
    changes: broadcast::Sender<()>,
}

impl LocalPresence {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(16);
        Self {
            sessions: Mutex::new(HashMap::new()),
            changes,
        }
    }

    pub fn report_heartbeat_at(&self, client_id: &str, page: &str, now: DateTime<Utc>) -> PresenceResult<()> {
        let mut sessions = self.sessions.lock().map_err(|_| PresenceError::Poisoned)?;
        let previous = sessions.insert((client_id.to_string(), page.to_string()), now);
        drop(sessions);

        if previous.is_none() {
            debug!("Presence session registered: {}", client_id);
            self.notify();
        }
        Ok(())
    }

    pub fn query_active_count_at(&self, page: &str, window_secs: i64, now: DateTime<Utc>) -> PresenceResult<usize> {
        let sessions = self.sessions.lock().map_err(|_| PresenceError::Poisoned)?;
        let cutoff = now - Duration::seconds(window_secs);
        Ok(sessions
            .iter()
            .filter(|((_, p), last_seen)| p == page && **last_seen >= cutoff)
            .count())
    }

    pub fn cleanup_inactive_at(&self, max_idle_secs: i64, now: DateTime<Utc>) -> PresenceResult<usize> {
        let mut sessions = self.sessions.lock().map_err(|_| PresenceError::Poisoned)?;
        let cutoff = now - Duration::seconds(max_idle_secs);
        let before = sessions.len();
        sessions.retain(|_, last_seen| *last_seen >= cutoff);
        let removed = before - sessions.len();
        drop(sessions);

        if removed > 0 {
            self.notify();
        }
        Ok(removed)
    }

    fn notify(&self) {
        // No subscribers is fine
        let _ = self.changes.send(());
    }
}

impl Default for LocalPresence {
    fn default() -> Self {
        Self::new()
    }
}

impl PresenceBackend for LocalPresence {
    fn report_heartbeat(&self, client_id: &str, page: &str) -> PresenceResult<()> {
        self.report_heartbeat_at(client_id, page, Utc::now())
    }

    fn end_session(&self, client_id: &str, page: &str) -> PresenceResult<bool> {
        let mut sessions = self.sessions.lock().map_err(|_| PresenceError::Poisoned)?;
        let existed = sessions
            .remove(&(client_id.to_string(), page.to_string()))
            .is_some();
        drop(sessions);

        if existed {
            debug!("Presence session ended: {}", client_id);
            self.notify();
        }
        Ok(existed)
    }

    fn query_active_count(&self, page: &str, window_secs: i64) -> PresenceResult<usize> {
        self.query_active_count_at(page, window_secs, Utc::now())
    }

    fn cleanup_inactive(&self, max_idle_secs: i64) -> PresenceResult<usize> {
        self.cleanup_inactive_at(max_idle_secs, Utc::now())
    }

    fn subscribe(&self) -> Option<broadcast::Receiver<()>> {
        Some(self.changes.subscribe())
    }
}

/// Anonymous session identifier: eight random alphanumerics and a timestamp
pub fn generate_client_id() -> String {
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", &random[..8], Utc::now().timestamp_millis())
}

/// This process's view of the presence counter
pub struct PresenceClient {
    backend: Arc<dyn PresenceBackend>,
    client_id: String,
    page: String,
    count_tx: watch::Sender<usize>,
}

impl PresenceClient {
    pub fn new(backend: Arc<dyn PresenceBackend>) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            backend,
            client_id: generate_client_id(),
            page: DEFAULT_PAGE.to_string(),
            count_tx,
        }
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn page(&self) -> &str {
        &self.page
    }

    pub fn backend(&self) -> &Arc<dyn PresenceBackend> {
        &self.backend
    }

    /// Last published active count
    pub fn active_count(&self) -> usize {
        *self.count_tx.borrow()
    }

    /// Receive every published count
    pub fn watch(&self) -> watch::Receiver<usize> {
        self.count_tx.subscribe()
    }

    /// Report this process as active and republish the count
    pub fn heartbeat(&self) {
        if let Err(e) = self.backend.report_heartbeat(&self.client_id, &self.page) {
            warn!("Presence heartbeat failed: {}", e);
            return;
        }
        self.refresh();
    }

    /// Query the backend and publish the result; failures keep the old count
    pub fn refresh(&self) {
        match self.backend.query_active_count(&self.page, ACTIVE_WINDOW_SECS) {
            Ok(count) => {
                self.count_tx.send_replace(count);
            }
            Err(e) => warn!("Failed to query active sessions: {}", e),
        }
    }

    /// End this process's own session
    pub fn end(&self) {
        match self.backend.end_session(&self.client_id, &self.page) {
            Ok(_) => debug!("Presence session {} ended", self.client_id),
            Err(e) => warn!("Failed to end presence session: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenBackend;

    impl PresenceBackend for BrokenBackend {
        fn report_heartbeat(&self, _: &str, _: &str) -> PresenceResult<()> {
            Err(PresenceError::Unavailable("offline".to_string()))
        }

        fn end_session(&self, _: &str, _: &str) -> PresenceResult<bool> {
            Err(PresenceError::Unavailable("offline".to_string()))
        }

        fn query_active_count(&self, _: &str, _: i64) -> PresenceResult<usize> {
            Err(PresenceError::Unavailable("offline".to_string()))
        }

        fn cleanup_inactive(&self, _: i64) -> PresenceResult<usize> {
            Err(PresenceError::Unavailable("offline".to_string()))
        }
    }

    #[test]
    fn counts_only_recent_sessions_on_page() {
        let presence = LocalPresence::new();
        let now = Utc::now();
        presence.report_heartbeat_at("a", "home", now).unwrap();
        presence.report_heartbeat_at("b", "home", now - Duration::seconds(59)).unwrap();
        presence.report_heartbeat_at("c", "home", now - Duration::seconds(61)).unwrap();
        presence.report_heartbeat_at("d", "stats", now).unwrap();

        assert_eq!(presence.query_active_count_at("home", ACTIVE_WINDOW_SECS, now).unwrap(), 2);
    }

    #[test]
    fn heartbeat_refreshes_existing_session() {
        let presence = LocalPresence::new();
        let now = Utc::now();
        presence.report_heartbeat_at("a", "home", now - Duration::seconds(90)).unwrap();
        assert_eq!(presence.query_active_count_at("home", 60, now).unwrap(), 0);

        presence.report_heartbeat_at("a", "home", now).unwrap();
        assert_eq!(presence.query_active_count_at("home", 60, now).unwrap(), 1);
    }

    #[test]
    fn cleanup_removes_stale_sessions() {
        let presence = LocalPresence::new();
        let now = Utc::now();
        presence.report_heartbeat_at("old", "home", now - Duration::seconds(300)).unwrap();
        presence.report_heartbeat_at("new", "home", now).unwrap();

        assert_eq!(presence.cleanup_inactive_at(STALE_SESSION_SECS, now).unwrap(), 1);
        assert_eq!(presence.query_active_count_at("home", 600, now).unwrap(), 1);
    }

    #[test]
    fn changes_are_pushed() {
        let presence = LocalPresence::new();
        let mut rx = presence.subscribe().unwrap();
        presence.report_heartbeat("a", "home").unwrap();
        assert!(rx.try_recv().is_ok());

        // A refresh of a known session is not a change
        presence.report_heartbeat("a", "home").unwrap();
        assert!(rx.try_recv().is_err());

        assert!(presence.end_session("a", "home").unwrap());
        assert!(rx.try_recv().is_ok());
        assert!(!presence.end_session("a", "home").unwrap());
    }

    #[test]
    fn client_ids_look_anonymous() {
        let id = generate_client_id();
        let (random, millis) = id.split_once('-').unwrap();
        assert_eq!(random.len(), 8);
        assert!(random.chars().all(|c| c.is_ascii_alphanumeric()));
        assert!(millis.parse::<i64>().is_ok());
        assert_ne!(generate_client_id(), id);
    }

    #[test]
    fn client_publishes_counts() {
        let client = PresenceClient::new(Arc::new(LocalPresence::new()));
        let mut rx = client.watch();
        client.heartbeat();

        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
        assert_eq!(client.active_count(), 1);

        client.end();
        client.refresh();
        assert_eq!(client.active_count(), 0);
    }

    #[test]
    fn backend_failures_keep_last_count() {
        let client = PresenceClient::new(Arc::new(BrokenBackend));
        client.heartbeat();
        client.refresh();
        client.end();
        assert_eq!(client.active_count(), 0);
    }
}
