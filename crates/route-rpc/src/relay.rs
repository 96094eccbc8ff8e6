//! RPC requests routed through the hub: the caller wraps the call as an
//! `RpcRequest` inside a `RouteMessage` and lets the hub forward it to the
//! target edge; the reply comes back the same way.

use crate::error::RpcError;
use crate::future::{FutureRegistry, RpcOutcome};
use crate::ids::generate_rpc_uid;
use crate::provider::{RouteSender, ServiceProvider};
use crate::stub::StubRegistry;
use async_trait::async_trait;
use route_protocol::{MessageType, RpcRequest};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Minimum timeout given to the final await, so a budget exhausted by
/// connect/retry overhead never turns into a zero-duration wait.
const MIN_AWAIT: Duration = Duration::from_millis(10);

pub struct RelayClient<S: RouteSender> {
    target_route_id: String,
    sender: Arc<S>,
    futures: Arc<FutureRegistry>,
    /// Used only for the local short-circuit path.
    local_stubs: Arc<StubRegistry>,
}

impl<S: RouteSender> RelayClient<S> {
    pub fn new(target_route_id: impl Into<String>, sender: Arc<S>, futures: Arc<FutureRegistry>, local_stubs: Arc<StubRegistry>) -> Self {
        Self {
            target_route_id: target_route_id.into(),
            sender,
            futures,
            local_stubs,
        }
    }
}

#[async_trait]
impl<S: RouteSender> ServiceProvider for RelayClient<S> {
    async fn call(
        &self,
        packet_id: i32,
        timeout: Duration,
        args: Vec<String>,
    ) -> Result<String, RpcError> {
        let started = Instant::now();

        // Checked before connectivity: a local call never touches the
        // network, so it must succeed even while the edge is disconnected.
        if self.target_route_id == self.sender.route_id() {
            return self
                .local_stubs
                .invoke(packet_id, args)
                .await
                .map_err(RpcError::Stub);
        }

        if !self.sender.is_connected() && !self.sender.await_connected(timeout).await {
            return Err(RpcError::NotConnected);
        }

        let rpc_uid = generate_rpc_uid("relay");
        let future = self.futures.register(rpc_uid.clone());

        let request = RpcRequest {
            from_route_id: self.sender.route_id().to_owned(),
            to_route_id: self.target_route_id.clone(),
            rpc_uid: rpc_uid.clone(),
            start_time_ms: 0,
            packet_id,
            method_args_json_list: args,
        };
        let payload = serde_json::to_string(&request).map_err(|e| RpcError::Send(e.to_string()))?;

        if let Err(first_err) = self
            .sender
            .send(&self.target_route_id, MessageType::RpcRequest, payload.clone())
            .await
        {
            let remaining = timeout.saturating_sub(started.elapsed());
            if !self.sender.await_connected(remaining).await {
                return Err(first_err);
            }
            self.sender
                .send(&self.target_route_id, MessageType::RpcRequest, payload)
                .await?;
        }

        let remaining = timeout.saturating_sub(started.elapsed()).max(MIN_AWAIT);
        match future.await_result(remaining).await {
            RpcOutcome::Success(v) => Ok(v),
            RpcOutcome::Error(e) => Err(RpcError::Stub(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeSender {
        route_id: String,
        connected: AtomicBool,
    }

    #[async_trait]
    impl RouteSender for FakeSender {
        fn route_id(&self) -> &str {
            &self.route_id
        }
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
        async fn await_connected(&self, _timeout: Duration) -> bool {
            self.connected.load(Ordering::SeqCst)
        }
        async fn send(&self, _to: &str, _mt: MessageType, _data: String) -> Result<(), RpcError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn local_short_circuit_never_sends_over_the_network() {
        let sender = Arc::new(FakeSender {
            route_id: "edge-a".into(),
            connected: AtomicBool::new(false),
        });
        let stubs = Arc::new(StubRegistry::new());
        let (meta, handler) = crate::stub::two_arg_handler::<i64, i64, i64, _>(
            1,
            "",
            "add",
            ["a", "b"],
            |a, b| Ok(a + b),
        );
        stubs.register_raw(meta, handler);
        let futures = Arc::new(FutureRegistry::new());
        let client = RelayClient::new("edge-a", sender, futures, stubs);
        // sender reports disconnected; local short-circuit must still work
        // because it never touches the network.
        let result = client
            .call(1, Duration::from_secs(1), vec!["2".into(), "3".into()])
            .await
            .unwrap();
        assert_eq!(result, "5");
    }

    #[tokio::test]
    async fn remote_call_fails_fast_when_never_connected() {
        let sender = Arc::new(FakeSender {
            route_id: "edge-a".into(),
            connected: AtomicBool::new(false),
        });
        let stubs = Arc::new(StubRegistry::new());
        let futures = Arc::new(FutureRegistry::new());
        let client = RelayClient::new("edge-b", sender, futures, stubs);
        let err = client
            .call(1, Duration::from_millis(50), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, RpcError::NotConnected));
    }
}
