//! Direct RPC: a dedicated TCP connection straight to the target edge's own
//! RPC listener, carrying JSON-encoded `RpcRequest`/`RpcResponse` inside the
//! shared length-prefixed frame — the same framing codec used everywhere
//! else, not a duplicated ad hoc one.

use crate::error::RpcError;
use crate::future::{FutureRegistry, RpcOutcome};
use crate::ids::generate_rpc_uid;
use crate::provider::ServiceProvider;
use crate::stub::StubRegistry;
use async_trait::async_trait;
use route_protocol::{read_frame, write_frame, RpcRequest, RpcResponse};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;

/// A connection to one other edge's direct RPC listener. Opened lazily on
/// first call; the owning route-table evicts and rebuilds this when the
/// target's advertised address changes.
pub struct DirectClient {
    local_route_id: String,
    remote_host: String,
    remote_port: i32,
    futures: Arc<FutureRegistry>,
    write_half: Arc<AsyncMutex<Option<OwnedWriteHalf>>>,
}

impl DirectClient {
    pub fn new(local_route_id: impl Into<String>, host: impl Into<String>, port: i32) -> Self {
        Self {
            local_route_id: local_route_id.into(),
            remote_host: host.into(),
            remote_port: port,
            futures: Arc::new(FutureRegistry::new()),
            write_half: Arc::new(AsyncMutex::new(None)),
        }
    }

    async fn ensure_connected(&self) -> Result<(), RpcError> {
        if self.write_half.lock().await.is_some() {
            return Ok(());
        }
        let stream = TcpStream::connect((self.remote_host.as_str(), self.remote_port as u16))
            .await
            .map_err(|e| RpcError::Send(e.to_string()))?;
        let (mut read_half, write_half) = stream.into_split();
        *self.write_half.lock().await = Some(write_half);

        let futures = Arc::clone(&self.futures);
        let write_half_slot = Arc::clone(&self.write_half);
        tokio::spawn(async move {
            loop {
                let payload = match read_frame(&mut read_half).await {
                    Ok(p) => p,
                    Err(_) => {
                        *write_half_slot.lock().await = None;
                        return;
                    }
                };
                let Ok(text) = String::from_utf8(payload) else { continue };
                let Ok(resp) = serde_json::from_str::<RpcResponse>(&text) else { continue };
                if resp.error_flag {
                    futures.set_error(&resp.rpc_uid, resp.error_msg);
                } else {
                    futures.set_success(&resp.rpc_uid, resp.result_value_str);
                }
            }
        });
        Ok(())
    }

    /// Closes the connection; the next call reconnects from scratch.
    pub async fn close(&self) {
        *self.write_half.lock().await = None;
    }
}

#[async_trait]
impl ServiceProvider for DirectClient {
    async fn call(
        &self,
        packet_id: i32,
        timeout: Duration,
        args: Vec<String>,
    ) -> Result<String, RpcError> {
        self.ensure_connected().await?;

        let rpc_uid = generate_rpc_uid("direct");
        let future = self.futures.register(rpc_uid.clone());
        let request = RpcRequest {
            from_route_id: self.local_route_id.clone(),
            to_route_id: String::new(),
            rpc_uid,
            start_time_ms: 0,
            packet_id,
            method_args_json_list: args,
        };
        let payload = serde_json::to_string(&request).map_err(|e| RpcError::Send(e.to_string()))?;

        {
            let mut guard = self.write_half.lock().await;
            let Some(write_half) = guard.as_mut() else {
                return Err(RpcError::NotConnected);
            };
            write_frame(write_half, payload.as_bytes())
                .await
                .map_err(|e| RpcError::Send(e.to_string()))?;
        }

        match future.await_result(timeout).await {
            RpcOutcome::Success(v) => Ok(v),
            RpcOutcome::Error(e) => Err(RpcError::Stub(e)),
        }
    }
}

/// Serves direct-mode RPC requests: binds `port`, and for every accepted
/// connection reads `RpcRequest` frames, invokes `stubs`, and writes back
/// `RpcResponse` frames.
pub async fn serve_direct_rpc(
    host: &str,
    port: u16,
    stubs: Arc<StubRegistry>,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    loop {
        let (stream, _addr) = listener.accept().await?;
        let stubs = Arc::clone(&stubs);
        tokio::spawn(async move {
            if let Err(err) = handle_direct_connection(stream, stubs).await {
                tracing::debug!(%err, "direct rpc connection closed");
            }
        });
    }
}

async fn handle_direct_connection(
    mut stream: TcpStream,
    stubs: Arc<StubRegistry>,
) -> std::io::Result<()> {
    loop {
        let payload = read_frame(&mut stream).await.map_err(std::io::Error::other)?;
        let Ok(text) = String::from_utf8(payload) else {
            continue;
        };
        let Ok(req) = serde_json::from_str::<RpcRequest>(&text) else {
            continue;
        };
        if req.rpc_uid.is_empty() {
            continue;
        }
        let mut resp = RpcResponse {
            rpc_uid: req.rpc_uid.clone(),
            error_flag: false,
            error_msg: String::new(),
            start_time_ms: req.start_time_ms,
            packet_id: req.packet_id,
            result_value_str: String::new(),
        };
        match stubs.invoke(req.packet_id, req.method_args_json_list).await {
            Ok(value) => resp.result_value_str = value,
            Err(e) => {
                resp.error_flag = true;
                resp.error_msg = e;
            }
        }
        let out = serde_json::to_string(&resp).map_err(std::io::Error::other)?;
        write_frame(&mut stream, out.as_bytes()).await?;
        stream.flush().await?;
    }
}
