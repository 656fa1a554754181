//! Session registry

use std::sync::Arc;

use dashmap::DashMap;
use joinwarden_protocol::UserId;
use tracing::info;

use crate::login::LoginFlow;
use crate::session::Session;
use crate::session_actor::SessionActorHandle;

/// Live session actors keyed by admin identity. Sessions are created on
/// first contact and live until `shutdown_all`.
pub struct SessionRegistry {
    sessions: DashMap<UserId, SessionActorHandle>,
    flow: Arc<LoginFlow>,
}

impl SessionRegistry {
    pub fn new(flow: Arc<LoginFlow>) -> Self {
        Self {
            sessions: DashMap::new(),
            flow,
        }
    }

    /// Get the actor for `admin`, spawning a fresh session on first contact.
    pub fn get_or_create(&self, admin: UserId) -> SessionActorHandle {
        self.sessions
            .entry(admin)
            .or_insert_with(|| {
                info!(
                    component = "registry",
                    event = "registry.session_created",
                    admin_id = %admin,
                    "Session created"
                );
                SessionActorHandle::spawn(Session::new(admin), self.flow.clone())
            })
            .clone()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Stop every session, releasing each platform connection. Disconnect
    /// failures are logged by the sessions themselves.
    pub async fn shutdown_all(&self) {
        let handles: Vec<SessionActorHandle> = self
            .sessions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        self.sessions.clear();

        info!(
            component = "registry",
            event = "registry.shutdown",
            sessions = handles.len(),
            "Shutting down sessions"
        );
        futures::future::join_all(handles.iter().map(|handle| handle.shutdown())).await;
    }
}
