// src/adapter/coordinator.rs
// Session control surface: start and stop live monitors

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::application::service::{
    spawn_monitor, CancellationFlag, MonitorSettings, MonitorStream, SessionParams,
};
use crate::domain::repository::MarketDataProvider;

pub type SessionId = u64;

struct SessionEntry {
    identifier: String,
    cancel: CancellationFlag,
}

/// Registry of running monitor sessions.
pub struct MonitorCoordinator {
    provider: Arc<dyn MarketDataProvider>,
    settings: MonitorSettings,
    sessions: Arc<Mutex<HashMap<SessionId, SessionEntry>>>,
    next_id: AtomicU64,
}

impl MonitorCoordinator {
    pub fn new(provider: Arc<dyn MarketDataProvider>, settings: MonitorSettings) -> Self {
        Self {
            provider,
            settings,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
        }
    }

    /// Start a session. Its events arrive on the returned stream, ending with
    /// a `Stopped` event.
    pub async fn start(&self, params: SessionParams) -> (SessionId, MonitorStream) {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let identifier = params.identifier.clone();
        let (stream, handle) = spawn_monitor(self.provider.clone(), self.settings.clone(), params);

        self.sessions.lock().await.insert(
            id,
            SessionEntry {
                identifier: identifier.clone(),
                cancel: stream.cancellation(),
            },
        );
        log::info!("Started monitor session {} for {}", id, identifier);

        let sessions = self.sessions.clone();
        tokio::spawn(async move {
            if let Err(e) = handle.await {
                log::error!("Monitor session {} task failed: {}", id, e);
            }
            if sessions.lock().await.remove(&id).is_some() {
                log::debug!("Monitor session {} deregistered", id);
            }
        });

        (id, stream)
    }

    /// Request a session to stop. Returns `false` for unknown sessions.
    pub async fn stop(&self, id: SessionId) -> bool {
        match self.sessions.lock().await.remove(&id) {
            Some(entry) => {
                entry.cancel.cancel();
                log::info!("Stopping monitor session {} for {}", id, entry.identifier);
                true
            }
            None => {
                log::warn!("No active monitor session {}", id);
                false
            }
        }
    }

    /// Stop every session. Returns how many were running.
    pub async fn stop_all(&self) -> usize {
        let mut sessions = self.sessions.lock().await;
        let count = sessions.len();
        for (id, entry) in sessions.drain() {
            entry.cancel.cancel();
            log::info!("Stopping monitor session {} for {}", id, entry.identifier);
        }
        count
    }

    /// Active sessions as `(id, identifier)`, ordered by id.
    pub async fn active_sessions(&self) -> Vec<(SessionId, String)> {
        let sessions = self.sessions.lock().await;
        let mut active: Vec<_> = sessions
            .iter()
            .map(|(id, entry)| (*id, entry.identifier.clone()))
            .collect();
        active.sort_by_key(|(id, _)| *id);
        active
    }
}
