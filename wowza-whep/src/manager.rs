//! Session registry and lifecycle.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinSet;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{GatewayError, Result};
use crate::session::{Session, SessionStats};

/// Statistics for all live sessions, exposed on `/stats`.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStats {
    pub active_sessions: usize,
    pub timestamp: i64,
    pub sessions: Vec<SessionStats>,
}

/// Registry of live sessions. A single reader/writer lock protects the
/// map; it is never held across I/O or stop callbacks.
pub struct Manager {
    config: Arc<Config>,
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl Manager {
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        Arc::new(Self {
            config,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Create and register a new session. The stop callback removes the
    /// registry entry, so a stopped session can never linger in the map.
    pub fn create(
        self: &Arc<Self>,
        app_name: &str,
        stream_name: &str,
        ws_url: &str,
    ) -> (String, Arc<Session>) {
        let id = format!("session-{}", Uuid::new_v4());
        let mut session = Session::new(id.clone(), app_name, stream_name, ws_url, self.config.clone());

        let manager = Arc::downgrade(self);
        session.set_stop_callback(move |session_id| {
            if let Some(manager) = manager.upgrade() {
                manager.forget(session_id);
            }
        });

        let session = Arc::new(session);
        let active = {
            let mut sessions = self.sessions.write();
            sessions.insert(id.clone(), session.clone());
            sessions.len()
        };
        info!(
            session_id = %id,
            app = app_name,
            stream = stream_name,
            active,
            "session created"
        );

        (id, session)
    }

    /// Drop a registry entry without stopping the session. Invoked by the
    /// stop callback; a second removal of the same id is a no-op.
    fn forget(&self, id: &str) {
        let (removed, active) = {
            let mut sessions = self.sessions.write();
            (sessions.remove(id).is_some(), sessions.len())
        };
        if removed {
            info!(session_id = id, active, "session removed");
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().get(id).cloned()
    }

    /// Stop and remove a session. The entry is detached under the lock
    /// first so the stop callback's own removal is a no-op.
    pub fn remove(&self, id: &str) {
        let session = { self.sessions.write().remove(id) };
        if let Some(session) = session {
            session.stop();
            let active = self.sessions.read().len();
            info!(session_id = id, active, "session removed");
        }
    }

    pub fn active_ids(&self) -> Vec<String> {
        self.sessions.read().keys().cloned().collect()
    }

    pub fn stats(&self) -> ManagerStats {
        let sessions: Vec<SessionStats> =
            self.sessions.read().values().map(|s| s.stats()).collect();
        ManagerStats {
            active_sessions: sessions.len(),
            timestamp: Utc::now().timestamp(),
            sessions,
        }
    }

    /// Stop every session concurrently and wait for the stop callbacks to
    /// run, bounded by `timeout`.
    pub async fn shutdown(&self, timeout: Duration) -> Result<()> {
        let snapshot: Vec<Arc<Session>> = {
            let mut sessions = self.sessions.write();
            sessions.drain().map(|(_, session)| session).collect()
        };
        if snapshot.is_empty() {
            return Ok(());
        }

        info!(count = snapshot.len(), "shutting down sessions");

        let mut stops = JoinSet::new();
        for session in snapshot {
            stops.spawn(async move { session.stop() });
        }
        let drain = async {
            while stops.join_next().await.is_some() {}
        };
        tokio::time::timeout(timeout, drain)
            .await
            .map_err(|_| GatewayError::ShutdownTimeout)
    }
}
