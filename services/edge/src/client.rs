//! The edge's single long-lived connection to the hub: connect / reconnect
//! with backoff, heartbeat broadcasting, a read loop dispatching incoming
//! frames, and the `Send` API with local short-circuit.

use crate::config::{EdgeConfig, RpcMode};
use crate::error::EdgeError;
use crate::route_table::RouteTable;
use async_trait::async_trait;
use route_protocol::{MessageType, RouteMessage, RpcRequest, RpcResponse, RpcServerInfo};
use route_rpc::{FutureRegistry, RouteSender, RpcError, StubRegistry};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{error, info, warn};

const ROUTE_TABLE_POLL: Duration = Duration::from_millis(100);
const ROUTE_TABLE_WAIT_MAX: Duration = Duration::from_secs(10);
const RECONNECT_CAP: Duration = Duration::from_secs(60);

pub struct EdgeClient {
    config: EdgeConfig,
    route_table: Arc<RouteTable>,
    stubs: Arc<StubRegistry>,
    relay_futures: Arc<FutureRegistry>,
    write_half: AsyncMutex<Option<tokio::net::tcp::OwnedWriteHalf>>,
    need_connect: AtomicBool,
    is_open: AtomicBool,
    reconnect_attempt: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl EdgeClient {
    pub fn new(config: EdgeConfig, stubs: Arc<StubRegistry>) -> Arc<Self> {
        let relay_futures = Arc::new(FutureRegistry::new());
        let route_table = RouteTable::new(config.route_id.clone(), config.rpc_mode, Arc::clone(&stubs), Arc::clone(&relay_futures));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Arc::new(Self {
            config,
            route_table,
            stubs,
            relay_futures,
            write_half: AsyncMutex::new(None),
            need_connect: AtomicBool::new(false),
            is_open: AtomicBool::new(false),
            reconnect_attempt: AtomicBool::new(false),
            shutdown_tx,
            shutdown_rx,
        })
    }

    pub fn route_table(&self) -> &Arc<RouteTable> {
        &self.route_table
    }

    pub fn stubs(&self) -> &Arc<StubRegistry> {
        &self.stubs
    }

    /// Ensures the stub registry is non-empty, then connects (synchronously
    /// attempting once) and, in direct mode, starts the local RPC listener.
    /// Repeat calls are a no-op.
    pub async fn start(self: &Arc<Self>) -> Result<(), EdgeError> {
        if !self.stubs.is_initialized() {
            return Err(EdgeError::StubsNotInitialized);
        }
        self.route_table.set_router_client(self).await;

        if self.need_connect.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return Ok(());
        }

        self.run_router_client().await;
        self.run_rpc_server();
        Ok(())
    }

    async fn run_router_client(self: &Arc<Self>) {
        if let Some(read_half) = self.try_connect().await {
            info!(host = %self.config.router_center_host, port = self.config.router_center_port, route_id = %self.config.route_id, "连接 Router Center 成功");
            self.is_open.store(true, Ordering::SeqCst);
            self.start_heartbeat();
            let this = Arc::clone(self);
            tokio::spawn(async move { this.read_loop(read_half).await });
            return;
        }
        warn!(host = %self.config.router_center_host, port = self.config.router_center_port, "首次连接 Router Center 失败，将在后台自动重连");
        self.start_background_reconnect();
    }

    fn run_rpc_server(self: &Arc<Self>) {
        if self.config.rpc_mode != RpcMode::Direct {
            info!("RPC 模式: RELAY，RPC 调用将通过 Router Center 转发");
            return;
        }
        info!(port = self.config.local_rpc_port, "RPC 模式: DIRECT，启动本地 RPC 服务器");
        let stubs = Arc::clone(&self.stubs);
        let host = self.config.local_rpc_host.clone();
        let port = self.config.local_rpc_port;
        tokio::spawn(async move {
            if let Err(err) = route_rpc::serve_direct_rpc(&host, port, stubs).await {
                error!(%err, "direct rpc server stopped");
            }
        });
    }

    async fn try_connect(&self) -> Option<OwnedReadHalf> {
        let stream = TcpStream::connect((self.config.router_center_host.as_str(), self.config.router_center_port)).await.ok()?;
        let (read_half, write_half) = stream.into_split();
        *self.write_half.lock().await = Some(write_half);
        Some(read_half)
    }

    fn start_heartbeat(self: &Arc<Self>) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            if this.send_heartbeat().await.is_err() {
                this.on_connection_lost("heartbeat failed").await;
                return;
            }
            let mut shutdown_rx = this.shutdown_rx.clone();
            loop {
                if !this.is_open.load(Ordering::SeqCst) {
                    return;
                }
                tokio::select! {
                    _ = shutdown_rx.changed() => { if *shutdown_rx.borrow() { return; } }
                    _ = tokio::time::sleep(Duration::from_secs(this.config.heart_beat_interval_second.max(1) as u64)) => {}
                }
                if this.send_heartbeat().await.is_err() {
                    this.on_connection_lost("heartbeat failed").await;
                    return;
                }
            }
        });
    }

    async fn send_heartbeat(&self) -> std::io::Result<()> {
        let is_direct = self.config.rpc_mode == RpcMode::Direct;
        let info = RpcServerInfo {
            host: if is_direct { self.config.local_rpc_host.clone() } else { String::new() },
            port: if is_direct { self.config.local_rpc_port as i32 } else { 0 },
            stubs: self.stubs.all_metadata(),
        };
        let data = serde_json::to_string(&info)?;
        let msg = RouteMessage {
            from_route_id: self.config.route_id.clone(),
            to_route_id: String::new(),
            message_type: Some(MessageType::HeartBeat),
            data: Some(data),
        };
        self.write_route_message(&msg).await
    }

    async fn write_route_message(&self, msg: &RouteMessage) -> std::io::Result<()> {
        let payload = route_protocol::message::encode(msg);
        let mut guard = self.write_half.lock().await;
        let Some(write_half) = guard.as_mut() else {
            return Err(std::io::Error::new(std::io::ErrorKind::NotConnected, "not connected"));
        };
        route_protocol::write_frame(write_half, &payload).await
    }

    async fn read_loop(self: Arc<Self>, mut read_half: OwnedReadHalf) {
        loop {
            match route_protocol::read_frame(&mut read_half).await {
                Ok(payload) => {
                    let Ok(msg) = route_protocol::message::decode(&payload) else { continue };
                    if msg.message_type.is_none() {
                        continue;
                    }
                    self.handle_message(msg).await;
                }
                Err(_) => {
                    self.on_connection_lost("read loop closed").await;
                    return;
                }
            }
        }
    }

    async fn handle_message(self: &Arc<Self>, msg: RouteMessage) {
        let Some(message_type) = msg.message_type else { return };
        match message_type {
            MessageType::HeartBeat => self.handle_register(msg).await,
            MessageType::RemoveRouteNode => self.handle_remove_offline(msg).await,
            MessageType::MessageData => info!(data = %msg.data.unwrap_or_default(), "收到 message data"),
            MessageType::RpcRequest => self.handle_relay_rpc_request(msg).await,
            MessageType::RpcResponse => self.handle_relay_rpc_response(msg).await,
            MessageType::SystemError => self.handle_system_error(msg),
        }
    }

    async fn handle_register(&self, msg: RouteMessage) {
        let Some(data) = msg.data else { return };
        let Ok(nodes) = serde_json::from_str(&data) else {
            warn!("init route info error");
            return;
        };
        self.route_table.upsert_route_node(nodes).await;
    }

    async fn handle_remove_offline(&self, msg: RouteMessage) {
        let Some(data) = msg.data else { return };
        let Ok(ids): Result<Vec<String>, _> = serde_json::from_str(&data) else {
            warn!("remove offline parse error");
            return;
        };
        if ids.is_empty() {
            return;
        }
        self.route_table.remove_route_node(&ids).await;
        info!(route_ids = ?ids, "删除已离线的 Route Client");
    }

    fn handle_system_error(&self, msg: RouteMessage) {
        let Some(err_msg) = msg.data else { return };
        error!(error_message = %err_msg, "收到系统错误");
        if is_route_id_conflict(&err_msg) {
            error!(detail = %err_msg, hint = "请修改配置文件中的 routeId，然后重启程序", "FATAL ERROR: RouterId 冲突");
            std::process::exit(1);
        }
    }

    async fn handle_relay_rpc_request(self: &Arc<Self>, msg: RouteMessage) {
        let Some(data) = msg.data else { return };
        let Ok(req): Result<RpcRequest, _> = serde_json::from_str(&data) else { return };
        let mut resp = RpcResponse {
            rpc_uid: req.rpc_uid.clone(),
            error_flag: false,
            error_msg: String::new(),
            start_time_ms: req.start_time_ms,
            packet_id: req.packet_id,
            result_value_str: String::new(),
        };
        match self.stubs.invoke(req.packet_id, req.method_args_json_list).await {
            Ok(value) => resp.result_value_str = value,
            Err(e) => {
                resp.error_flag = true;
                resp.error_msg = e;
            }
        }
        let Ok(payload) = serde_json::to_string(&resp) else { return };
        if let Err(err) = self.send(&msg.from_route_id, MessageType::RpcResponse, payload).await {
            warn!(%err, to = %msg.from_route_id, "failed to send rpc response");
        }
    }

    async fn handle_relay_rpc_response(&self, msg: RouteMessage) {
        let Some(data) = msg.data else { return };
        let Ok(resp): Result<RpcResponse, _> = serde_json::from_str(&data) else { return };
        if resp.error_flag {
            self.relay_futures.set_error(&resp.rpc_uid, resp.error_msg);
        } else {
            self.relay_futures.set_success(&resp.rpc_uid, resp.result_value_str);
        }
    }

    fn start_background_reconnect(self: &Arc<Self>) {
        if !self.need_connect.load(Ordering::SeqCst) {
            return;
        }
        if self.reconnect_attempt.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            return;
        }
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.reconnect_loop().await;
            this.reconnect_attempt.store(false, Ordering::SeqCst);
        });
    }

    async fn reconnect_loop(self: &Arc<Self>) {
        let mut attempt: u32 = 0;
        let mut shutdown_rx = self.shutdown_rx.clone();
        loop {
            if !self.need_connect.load(Ordering::SeqCst) {
                return;
            }
            if !self.is_open.load(Ordering::SeqCst) {
                if let Some(read_half) = self.try_connect().await {
                    self.is_open.store(true, Ordering::SeqCst);
                    info!(host = %self.config.router_center_host, port = self.config.router_center_port, route_id = %self.config.route_id, "重连 Router Center 成功");
                    self.start_heartbeat();
                    let this = Arc::clone(self);
                    tokio::spawn(async move { this.read_loop(read_half).await });
                    return;
                }
                attempt += 1;
            }
            let delay = next_reconnect_delay(attempt, self.config.reconnect_interval_ms);
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn on_connection_lost(self: &Arc<Self>, reason: &str) {
        if !self.need_connect.load(Ordering::SeqCst) {
            return;
        }
        let was_open = self.is_open.swap(false, Ordering::SeqCst);
        self.close_conn().await;
        if was_open {
            warn!(reason, host = %self.config.router_center_host, port = self.config.router_center_port, "Router Center 连接断开，准备重连");
        }
        self.start_background_reconnect();
    }

    async fn close_conn(&self) {
        *self.write_half.lock().await = None;
    }

    /// Sends `data` to `to_route_id`; a send targeting this client's own
    /// route-id is short-circuited into local dispatch without touching the
    /// network.
    pub async fn send(self: &Arc<Self>, to_route_id: &str, message_type: MessageType, data: String) -> Result<(), EdgeError> {
        if to_route_id == self.config.route_id {
            let msg = RouteMessage {
                from_route_id: self.config.route_id.clone(),
                to_route_id: to_route_id.to_owned(),
                message_type: Some(message_type),
                data: Some(data),
            };
            Box::pin(self.handle_message(msg)).await;
            return Ok(());
        }
        if !self.is_connected() {
            return Err(EdgeError::NotConnected);
        }
        let msg = RouteMessage {
            from_route_id: self.config.route_id.clone(),
            to_route_id: to_route_id.to_owned(),
            message_type: Some(message_type),
            data: Some(data),
        };
        match self.write_route_message(&msg).await {
            Ok(()) => Ok(()),
            Err(err) => {
                self.on_connection_lost("send failed").await;
                Err(EdgeError::Io(err))
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    pub async fn shutdown(&self) {
        self.need_connect.store(false, Ordering::SeqCst);
        self.is_open.store(false, Ordering::SeqCst);
        let _ = self.shutdown_tx.send(true);
        self.close_conn().await;
    }

    /// Invokes an RPC method on `target_route_id` through whichever
    /// transport the route table's mode selects.
    pub async fn call(&self, target_route_id: &str, packet_id: i32, timeout: Duration, args: Vec<String>) -> Result<String, EdgeError> {
        let provider = self.route_table.get_rpc_service_provider(target_route_id).await?;
        Ok(provider.call(packet_id, timeout, args).await?)
    }

    pub async fn await_connected(&self, timeout: Duration) -> bool {
        RouteSender::await_connected(self, timeout).await
    }

    /// Polls every 100 ms, up to 10 s, for the route table to contain at
    /// least one node — the signal that the hub has replied to our first
    /// heartbeat.
    pub async fn await_route_table_ready(&self) -> Result<(), EdgeError> {
        let deadline = tokio::time::Instant::now() + ROUTE_TABLE_WAIT_MAX;
        loop {
            if self.route_table.has_any_route_node().await {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(EdgeError::RouteTableTimeout);
            }
            tokio::time::sleep(ROUTE_TABLE_POLL).await;
        }
    }
}

#[async_trait]
impl RouteSender for EdgeClient {
    fn route_id(&self) -> &str {
        &self.config.route_id
    }

    fn is_connected(&self) -> bool {
        self.is_open.load(Ordering::SeqCst)
    }

    async fn await_connected(&self, timeout: Duration) -> bool {
        if self.is_connected() {
            return true;
        }
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_connected() {
                return true;
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return false;
            }
            tokio::time::sleep((deadline - now).min(ROUTE_TABLE_POLL)).await;
        }
    }

    async fn send(&self, to_route_id: &str, message_type: MessageType, data: String) -> Result<(), RpcError> {
        if !self.is_connected() {
            return Err(RpcError::NotConnected);
        }
        let msg = RouteMessage {
            from_route_id: self.config.route_id.clone(),
            to_route_id: to_route_id.to_owned(),
            message_type: Some(message_type),
            data: Some(data),
        };
        self.write_route_message(&msg).await.map_err(|e| RpcError::Send(e.to_string()))
    }
}

fn is_route_id_conflict(message: &str) -> bool {
    message.contains("RouterId") && message.contains("已经存在")
}

/// Exponential backoff starting at `base_ms`, doubling per failed attempt,
/// capped at 60s. `attempt <= 1` always returns the base delay.
fn next_reconnect_delay(attempt: u32, base_ms: i64) -> Duration {
    let base_ms = if base_ms <= 0 { 10_000 } else { base_ms as u64 };
    let base = Duration::from_millis(base_ms);
    if attempt <= 1 {
        return base;
    }
    let mut delay = base;
    for _ in 1..attempt {
        delay *= 2;
        if delay >= RECONNECT_CAP {
            return RECONNECT_CAP;
        }
    }
    delay.min(RECONNECT_CAP)
}
