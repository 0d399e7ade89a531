//! Presence background tasks

use std::{sync::Arc, time::Duration};

use tokio::{sync::broadcast::error::RecvError, time::interval};
use tracing::{debug, info, warn};

use crate::services::{PresenceClient, HEARTBEAT_INTERVAL_SECS, STALE_SESSION_SECS};

/// How often stale sessions are swept
pub const CLEANUP_INTERVAL_SECS: u64 = 5 * 60;

/// Keep this process registered and republish the count whenever the
/// backend reports a change
pub async fn presence_heartbeat_task(client: Arc<PresenceClient>) {
    info!("Starting presence heartbeat task ({})", client.client_id());

    let mut heartbeat = interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
    let mut changes = client.backend().subscribe();

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                client.heartbeat();
                debug!("Presence heartbeat sent, {} active", client.active_count());
            }

            change = recv_change(&mut changes) => {
                match change {
                    Ok(()) | Err(RecvError::Lagged(_)) => client.refresh(),
                    Err(RecvError::Closed) => {
                        warn!("Presence change channel closed, relying on heartbeats");
                        changes = None;
                    }
                }
            }
        }
    }
}

/// Periodically remove sessions that stopped sending heartbeats
pub async fn presence_cleanup_task(client: Arc<PresenceClient>) {
    info!("Starting presence cleanup task");

    let mut sweep = interval(Duration::from_secs(CLEANUP_INTERVAL_SECS));

    loop {
        sweep.tick().await;

        match client.backend().cleanup_inactive(STALE_SESSION_SECS) {
            Ok(0) => {}
            Ok(removed) => info!("Removed {} stale presence sessions", removed),
            Err(e) => warn!("Presence cleanup failed: {}", e),
        }
    }
}

async fn recv_change(
    changes: &mut Option<tokio::sync::broadcast::Receiver<()>>,
) -> Result<(), RecvError> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{LocalPresence, PresenceBackend};

    #[tokio::test(start_paused = true)]
    async fn heartbeat_registers_and_tracks_other_sessions() {
        let backend = Arc::new(LocalPresence::new());
        let client = Arc::new(PresenceClient::new(backend.clone()));
        let task = tokio::spawn(presence_heartbeat_task(Arc::clone(&client)));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.active_count(), 1);

        backend.report_heartbeat("someone-else", client.page()).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(client.active_count(), 2);

        task.abort();
    }
}
