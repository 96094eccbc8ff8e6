//! The edge's local mirror of the hub's membership: route-id → `RouteNode`,
//! plus lazily created RPC clients (one direct, one relay, per target
//! route-id) cached until membership changes evict them.

use crate::client::EdgeClient;
use crate::config::RpcMode;
use crate::error::EdgeError;
use route_protocol::RouteNode;
use route_rpc::{DirectClient, FutureRegistry, RelayClient, ServiceProvider, StubRegistry};
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::RwLock;
use tracing::info;

pub struct RouteTable {
    route_id: String,
    rpc_mode: RpcMode,
    router_client: RwLock<Option<Weak<EdgeClient>>>,
    stubs: Arc<StubRegistry>,
    relay_futures: Arc<FutureRegistry>,
    nodes: RwLock<HashMap<String, RouteNode>>,
    direct_clients: RwLock<HashMap<String, Arc<DirectClient>>>,
    relay_clients: RwLock<HashMap<String, Arc<RelayClient<EdgeClient>>>>,
}

impl RouteTable {
    pub fn new(route_id: impl Into<String>, rpc_mode: RpcMode, stubs: Arc<StubRegistry>, relay_futures: Arc<FutureRegistry>) -> Arc<Self> {
        Arc::new(Self {
            route_id: route_id.into(),
            rpc_mode,
            router_client: RwLock::new(None),
            stubs,
            relay_futures,
            nodes: RwLock::new(HashMap::new()),
            direct_clients: RwLock::new(HashMap::new()),
            relay_clients: RwLock::new(HashMap::new()),
        })
    }

    pub async fn set_router_client(&self, client: &Arc<EdgeClient>) {
        *self.router_client.write().await = Some(Arc::downgrade(client));
    }

    /// Upserts nodes whose data actually changed; an unchanged node is a
    /// no-op, a changed one evicts any cached direct client for it (the
    /// cached connection's address would now be stale) without explicitly
    /// closing it — it closes on drop once the last reference goes away.
    pub async fn upsert_route_node(&self, incoming: Vec<RouteNode>) {
        let mut nodes = self.nodes.write().await;
        let mut direct_clients = self.direct_clients.write().await;
        for node in incoming {
            match nodes.get(&node.router_id) {
                Some(existing) if *existing == node => continue,
                Some(_) => {
                    direct_clients.remove(&node.router_id);
                    info!(route_id = %node.router_id, "路由连接信息变更，关闭历史连接");
                }
                None => {}
            }
            nodes.insert(node.router_id.clone(), node);
        }
    }

    pub async fn remove_route_node(&self, route_ids: &[String]) {
        let evicted: Vec<Arc<DirectClient>> = {
            let mut nodes = self.nodes.write().await;
            let mut direct_clients = self.direct_clients.write().await;
            let mut evicted = Vec::new();
            for id in route_ids {
                nodes.remove(id);
                if let Some(client) = direct_clients.remove(id) {
                    evicted.push(client);
                }
            }
            evicted
        };
        for client in evicted {
            client.close().await;
        }
    }

    pub async fn has_any_route_node(&self) -> bool {
        !self.nodes.read().await.is_empty()
    }

    pub async fn has_route_node(&self, route_id: &str) -> bool {
        self.nodes.read().await.contains_key(route_id)
    }

    pub async fn get_or_create_direct_client(&self, route_id: &str) -> Result<Arc<DirectClient>, EdgeError> {
        if let Some(client) = self.direct_clients.read().await.get(route_id) {
            return Ok(Arc::clone(client));
        }
        let mut direct_clients = self.direct_clients.write().await;
        if let Some(client) = direct_clients.get(route_id) {
            return Ok(Arc::clone(client));
        }
        let node = self
            .nodes
            .read()
            .await
            .get(route_id)
            .cloned()
            .ok_or_else(|| EdgeError::RouteNotFound(route_id.to_owned()))?;
        let client = Arc::new(DirectClient::new(self.route_id.clone(), node.host_for_rpc, node.port_for_rpc));
        direct_clients.insert(route_id.to_owned(), Arc::clone(&client));
        Ok(client)
    }

    async fn get_or_create_relay(&self, route_id: &str) -> Result<Arc<RelayClient<EdgeClient>>, EdgeError> {
        if let Some(client) = self.relay_clients.read().await.get(route_id) {
            return Ok(Arc::clone(client));
        }
        let router_client = self
            .router_client
            .read()
            .await
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(EdgeError::NotStarted)?;
        let mut relay_clients = self.relay_clients.write().await;
        if let Some(client) = relay_clients.get(route_id) {
            return Ok(Arc::clone(client));
        }
        let client = Arc::new(RelayClient::new(route_id, router_client, Arc::clone(&self.relay_futures), Arc::clone(&self.stubs)));
        relay_clients.insert(route_id.to_owned(), Arc::clone(&client));
        Ok(client)
    }

    pub async fn get_rpc_service_provider(&self, route_id: &str) -> Result<Arc<dyn ServiceProvider>, EdgeError> {
        if self.rpc_mode == RpcMode::Relay {
            Ok(self.get_or_create_relay(route_id).await?)
        } else {
            Ok(self.get_or_create_direct_client(route_id).await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, host: &str, port: i32) -> RouteNode {
        RouteNode { router_id: id.to_owned(), host_for_rpc: host.to_owned(), port_for_rpc: port }
    }

    #[tokio::test]
    async fn unchanged_node_upsert_keeps_cached_direct_client() {
        let table = RouteTable::new("self-id", RpcMode::Direct, Arc::new(StubRegistry::new()), Arc::new(FutureRegistry::new()));
        table.upsert_route_node(vec![node("peer", "127.0.0.1", 9000)]).await;
        assert!(table.has_any_route_node().await);
        table.upsert_route_node(vec![node("peer", "127.0.0.1", 9000)]).await;
        assert!(!table.direct_clients.read().await.contains_key("peer"));
    }

    #[tokio::test]
    async fn changed_node_evicts_cached_direct_client() {
        let table = RouteTable::new("self-id", RpcMode::Direct, Arc::new(StubRegistry::new()), Arc::new(FutureRegistry::new()));
        table.upsert_route_node(vec![node("peer", "127.0.0.1", 9000)]).await;
        {
            let client = Arc::new(DirectClient::new("self-id", "127.0.0.1", 9000));
            table.direct_clients.write().await.insert("peer".to_owned(), client);
        }
        table.upsert_route_node(vec![node("peer", "127.0.0.1", 9001)]).await;
        assert!(!table.direct_clients.read().await.contains_key("peer"));
    }

    #[tokio::test]
    async fn missing_route_id_errors_on_direct_client_lookup() {
        let table = RouteTable::new("self-id", RpcMode::Direct, Arc::new(StubRegistry::new()), Arc::new(FutureRegistry::new()));
        match table.get_or_create_direct_client("ghost").await {
            Err(EdgeError::RouteNotFound(id)) => assert_eq!(id, "ghost"),
            Ok(_) => panic!("expected RouteNotFound"),
            Err(other) => panic!("expected RouteNotFound, got {other}"),
        }
    }
}
