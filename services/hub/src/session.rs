//! One connected edge, as seen by the hub.

use route_protocol::message::encode;
use route_protocol::{MessageType, RouteMessage, RpcServerInfo};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::Mutex as AsyncMutex;

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A route-id's live connection. `write_half` is shared with the
/// connection's own read-loop task so every frame write — session replies
/// and forwarded messages alike — goes through the same serialization
/// point.
pub struct RouterSession {
    pub router_id: String,
    pub remote_addr: String,
    pub rpc_server_info: RpcServerInfo,
    last_heartbeat_ms: AtomicI64,
    closed: AtomicBool,
    write_half: Arc<AsyncMutex<OwnedWriteHalf>>,
}

impl std::fmt::Debug for RouterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RouterSession")
            .field("router_id", &self.router_id)
            .field("remote_addr", &self.remote_addr)
            .field("active", &self.is_active())
            .finish()
    }
}

impl RouterSession {
    pub fn new(
        router_id: impl Into<String>,
        remote_addr: impl Into<String>,
        rpc_server_info: RpcServerInfo,
        write_half: Arc<AsyncMutex<OwnedWriteHalf>>,
    ) -> Self {
        Self {
            router_id: router_id.into(),
            remote_addr: remote_addr.into(),
            rpc_server_info,
            last_heartbeat_ms: AtomicI64::new(now_ms()),
            closed: AtomicBool::new(false),
            write_half,
        }
    }

    pub fn refresh_heartbeat(&self) {
        self.last_heartbeat_ms.store(now_ms(), Ordering::SeqCst);
    }

    pub fn last_heartbeat_ms(&self) -> i64 {
        self.last_heartbeat_ms.load(Ordering::SeqCst)
    }

    pub fn is_active(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }

    pub fn mark_closed(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn write_route_message(&self, msg: &RouteMessage) -> std::io::Result<()> {
        let payload = encode(msg);
        let mut guard = self.write_half.lock().await;
        let len = payload.len() as u32;
        guard.write_all(&len.to_be_bytes()).await?;
        guard.write_all(&payload).await?;
        guard.flush().await
    }

    pub async fn write_system_error(&self, from_route_id: &str, message: &str) {
        let msg = RouteMessage {
            from_route_id: from_route_id.to_owned(),
            to_route_id: self.router_id.clone(),
            message_type: Some(MessageType::SystemError),
            data: Some(message.to_owned()),
        };
        let _ = self.write_route_message(&msg).await;
    }

    pub async fn close(&self) {
        self.mark_closed();
        let mut guard = self.write_half.lock().await;
        let _ = guard.shutdown().await;
    }
}
