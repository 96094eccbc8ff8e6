//! The capability both RPC transports implement, and the minimal capability
//! a relay transport needs from its owning edge client.

use crate::error::RpcError;
use async_trait::async_trait;
use route_protocol::MessageType;
use std::time::Duration;

/// Satisfied by both [`crate::direct::DirectClient`] and
/// [`crate::relay::RelayClient`]; the edge's route-table caches callers as
/// `Arc<dyn ServiceProvider>` so direct/relay mode is an implementation
/// detail of which provider got cached.
#[async_trait]
pub trait ServiceProvider: Send + Sync {
    async fn call(
        &self,
        packet_id: i32,
        timeout: Duration,
        args: Vec<String>,
    ) -> Result<String, RpcError>;
}

/// The subset of the edge client's behaviour a [`crate::relay::RelayClient`]
/// needs: send a message through the hub, know its own route-id, and know
/// (or wait for) connectivity. Implemented by the edge client crate so
/// `route-rpc` stays unaware of reconnect/heartbeat machinery.
#[async_trait]
pub trait RouteSender: Send + Sync {
    fn route_id(&self) -> &str;
    fn is_connected(&self) -> bool;
    async fn await_connected(&self, timeout: Duration) -> bool;
    async fn send(
        &self,
        to_route_id: &str,
        message_type: MessageType,
        data: String,
    ) -> Result<(), RpcError>;
}
