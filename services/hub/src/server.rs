//! The hub's TCP accept loop and per-connection dispatch.

use crate::config::HubConfig;
use crate::session::RouterSession;
use crate::session_manager::SessionManager;
use route_protocol::{read_frame, MessageType, RouteMessage, RpcServerInfo};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Mutex};
use tracing::{info, warn};

const DEBUG_ADMIN_ROUTE_ID: &str = "debug-admin";
const DEBUG_RESULT_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Default)]
pub struct Stats {
    pub total_connections: AtomicU64,
    pub current_connections: AtomicI64,
    pub total_bytes: AtomicU64,
    pub total_requests: AtomicU64,
}

pub struct Hub {
    pub config: HubConfig,
    pub sessions: Arc<SessionManager>,
    pub stats: Stats,
    debug_results: Mutex<HashMap<String, (String, Instant)>>,
    bound_port: std::sync::OnceLock<u16>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Hub {
    pub fn new(config: HubConfig) -> Arc<Self> {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            config,
            sessions: SessionManager::new(),
            stats: Stats::default(),
            debug_results: Mutex::new(HashMap::new()),
            bound_port: std::sync::OnceLock::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub async fn get_debug_result(&self, rpc_uid: &str) -> Option<String> {
        self.debug_results.lock().await.get(rpc_uid).map(|(v, _)| v.clone())
    }

    /// The actual listening port, once `run()` has bound its socket — useful
    /// in tests that configure `router_server_port = 0` for an OS-assigned
    /// ephemeral port.
    pub fn bound_port(&self) -> Option<u16> {
        self.bound_port.get().copied()
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Binds and serves until `shutdown()` is called. The heartbeat reaper
    /// and the debug-result sweep are both bound to the same signal, rather
    /// than running as unstoppable daemons.
    pub async fn run(self: &Arc<Self>) -> std::io::Result<()> {
        let listener = TcpListener::bind(("0.0.0.0", self.config.router_server_port)).await?;
        let port = listener.local_addr()?.port();
        let _ = self.bound_port.set(port);
        info!(port, "hub listening");

        let reaper = self.sessions.spawn_reaper(self.shutdown_rx.clone());
        let sweeper = self.spawn_debug_sweeper();

        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, addr) = accepted?;
                    self.stats.total_connections.fetch_add(1, Ordering::Relaxed);
                    self.stats.current_connections.fetch_add(1, Ordering::Relaxed);
                    let hub = Arc::clone(self);
                    let stats_hub = Arc::clone(self);
                    tokio::spawn(async move {
                        hub.handle_connection(stream, addr).await;
                        stats_hub.stats.current_connections.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        reaper.abort();
        sweeper.abort();
        Ok(())
    }

    fn spawn_debug_sweeper(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let hub = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_rx.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let mut results = hub.debug_results.lock().await;
                        results.retain(|_, (_, stored_at)| stored_at.elapsed() < DEBUG_RESULT_TTL);
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() { return; }
                    }
                }
            }
        })
    }

    async fn handle_connection(self: Arc<Self>, stream: TcpStream, addr: SocketAddr) {
        let (mut read_half, write_half) = stream.into_split();
        let write_half = Arc::new(Mutex::new(write_half));
        let mut route_id: Option<String> = None;

        loop {
            let payload = match read_frame(&mut read_half).await {
                Ok(p) => p,
                Err(_) => {
                    if let Some(id) = &route_id {
                        self.sessions.remove_session(id).await;
                    }
                    return;
                }
            };
            self.stats.total_requests.fetch_add(1, Ordering::Relaxed);
            self.stats.total_bytes.fetch_add(payload.len() as u64, Ordering::Relaxed);

            let msg = match route_protocol::message::decode(&payload) {
                Ok(m) => m,
                Err(err) => {
                    warn!(%err, "decode route message error");
                    continue;
                }
            };
            let Some(message_type) = msg.message_type else {
                warn!(remote = %addr, from = %msg.from_route_id, to = %msg.to_route_id, "msgType absent");
                continue;
            };
            if !msg.from_route_id.is_empty() {
                route_id = Some(msg.from_route_id.clone());
            }

            self.dispatch(message_type, msg, &addr, &write_half).await;
        }
    }

    async fn dispatch(
        &self,
        message_type: MessageType,
        msg: RouteMessage,
        addr: &SocketAddr,
        write_half: &Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>>,
    ) {
        match message_type {
            MessageType::HeartBeat => self.handle_heartbeat(msg, addr, write_half).await,
            MessageType::MessageData | MessageType::RpcRequest => self.forward_to_target(&msg).await,
            MessageType::RpcResponse => self.handle_rpc_response(msg).await,
            MessageType::SystemError | MessageType::RemoveRouteNode => {}
        }
    }

    async fn handle_heartbeat(
        &self,
        msg: RouteMessage,
        addr: &SocketAddr,
        write_half: &Arc<Mutex<tokio::net::tcp::OwnedWriteHalf>>,
    ) {
        let Some(data) = &msg.data else { return };
        let rpc_info: RpcServerInfo = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(err) => {
                warn!(%err, "heartbeat parse error");
                return;
            }
        };

        let new_session = Arc::new(RouterSession::new(
            msg.from_route_id.clone(),
            addr.to_string(),
            rpc_info,
            Arc::clone(write_half),
        ));

        match self.sessions.upsert_session(&msg.from_route_id, Arc::clone(&new_session)).await {
            Err(conflict) => {
                new_session.write_system_error("server", &conflict.to_string()).await;
                new_session.close().await;
            }
            Ok(session) => {
                let route_list = self.sessions.all_route_node_list().await;
                let data = serde_json::to_string(&route_list).unwrap_or_default();
                let reply = RouteMessage {
                    from_route_id: msg.from_route_id.clone(),
                    to_route_id: msg.from_route_id.clone(),
                    message_type: Some(MessageType::HeartBeat),
                    data: Some(data),
                };
                if let Err(err) = session.write_route_message(&reply).await {
                    warn!(%err, route_id = %msg.from_route_id, "failed to send heartbeat reply");
                }
            }
        }
    }

    async fn forward_to_target(&self, msg: &RouteMessage) {
        if msg.to_route_id.is_empty() {
            return;
        }
        match self.sessions.get_session(&msg.to_route_id).await {
            Some(target) => {
                if let Err(err) = target.write_route_message(msg).await {
                    warn!(%err, to = %msg.to_route_id, "forward failed");
                }
            }
            None => {
                warn!(from = %msg.from_route_id, to = %msg.to_route_id, "route message dropped, target offline");
            }
        }
    }

    async fn handle_rpc_response(&self, msg: RouteMessage) {
        if msg.to_route_id == DEBUG_ADMIN_ROUTE_ID {
            let Some(data) = msg.data else { return };
            if let Some(rpc_uid) = extract_rpc_uid(&data) {
                self.debug_results.lock().await.insert(rpc_uid, (data, Instant::now()));
            }
            return;
        }
        self.forward_to_target(&msg).await;
    }
}

fn extract_rpc_uid(json: &str) -> Option<String> {
    #[derive(serde::Deserialize)]
    struct Probe {
        #[serde(rename = "rpcUid")]
        rpc_uid: Option<serde_json::Value>,
    }
    let probe: Probe = serde_json::from_str(json).ok()?;
    match probe.rpc_uid? {
        serde_json::Value::String(s) => Some(s),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
