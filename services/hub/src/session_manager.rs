//! Route-id → session index: conflict-checked upsert, heartbeat reaping,
//! and membership fan-out on removal.

use crate::session::RouterSession;
use route_protocol::{MessageType, RouteMessage, RouteNode};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);
const REAP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
#[error("RouterId '{0}' 已经存在! 请修改您的 routerId 配置.")]
pub struct RouteIdConflict(pub String);

#[derive(Default)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<RouterSession>>>,
}

impl SessionManager {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Upsert semantics: insert if absent or the prior session is closed;
    /// refresh in place for a repeat heartbeat from the same connection;
    /// reject as a conflict if a *different* connection claims a route-id
    /// an active session already owns.
    pub async fn upsert_session(
        &self,
        route_id: &str,
        new_session: Arc<RouterSession>,
    ) -> Result<Arc<RouterSession>, RouteIdConflict> {
        let mut sessions = self.sessions.write().await;
        match sessions.get(route_id) {
            Some(existing) if existing.is_active() && existing.remote_addr == new_session.remote_addr => {
                existing.refresh_heartbeat();
                Ok(Arc::clone(existing))
            }
            Some(existing) if existing.is_active() => Err(RouteIdConflict(route_id.to_owned())),
            _ => {
                sessions.insert(route_id.to_owned(), Arc::clone(&new_session));
                Ok(new_session)
            }
        }
    }

    pub async fn get_session(&self, route_id: &str) -> Option<Arc<RouterSession>> {
        self.sessions.read().await.get(route_id).cloned()
    }

    pub async fn all_route_node_list(&self) -> Vec<RouteNode> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| RouteNode {
                router_id: s.router_id.clone(),
                host_for_rpc: s.rpc_server_info.host.clone(),
                port_for_rpc: s.rpc_server_info.port,
            })
            .collect()
    }

    /// Removes `route_ids`, closing each session, then broadcasts a single
    /// `RemoveRouteNode` message (naming all of them) to every survivor.
    /// Each recipient gets the message addressed to itself, matching the
    /// original implementation's broadcast framing.
    pub async fn remove_sessions(&self, route_ids: &[String]) {
        {
            let mut sessions = self.sessions.write().await;
            for id in route_ids {
                if let Some(session) = sessions.remove(id) {
                    session.close().await;
                    info!(route_id = %id, "session removed");
                }
            }
        }
        if route_ids.is_empty() {
            return;
        }
        let data = serde_json::to_string(route_ids).unwrap_or_default();
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            let msg = RouteMessage {
                from_route_id: session.router_id.clone(),
                to_route_id: session.router_id.clone(),
                message_type: Some(MessageType::RemoveRouteNode),
                data: Some(data.clone()),
            };
            if let Err(err) = session.write_route_message(&msg).await {
                warn!(route_id = %session.router_id, %err, "failed to broadcast removal");
            }
        }
    }

    pub async fn remove_session(&self, route_id: &str) {
        self.remove_sessions(std::slice::from_ref(&route_id.to_owned())).await;
    }

    /// Spawns a reaper task bound to `shutdown`; returns its join handle so
    /// the caller can await a clean stop instead of leaving an unstoppable
    /// daemon running past hub shutdown.
    pub fn spawn_reaper(self: &Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(REAP_INTERVAL);
            loop {
                tokio::select! {
                    _ = ticker.tick() => manager.reap_once().await,
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        })
    }

    async fn reap_once(&self) {
        let now = crate::session::now_ms();
        let cutoff = now - HEARTBEAT_TIMEOUT.as_millis() as i64;
        let offline: Vec<String> = {
            let sessions = self.sessions.read().await;
            sessions
                .values()
                .filter(|s| s.last_heartbeat_ms() < cutoff)
                .map(|s| s.router_id.clone())
                .collect()
        };
        if !offline.is_empty() {
            self.remove_sessions(&offline).await;
        }
    }
}
