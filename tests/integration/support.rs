use hub::{Hub, HubConfig};
use std::sync::Arc;
use std::time::Duration;

/// Spawns a real hub on an OS-assigned ephemeral port and returns it
/// together with the port, once the listener is actually bound.
pub async fn spawn_hub() -> (Arc<Hub>, u16) {
    let config = HubConfig {
        router_server_port: 0,
        http_monitor_port: 19999,
        admin_password: "root".to_owned(),
    };
    let hub = Hub::new(config);
    let running = Arc::clone(&hub);
    tokio::spawn(async move {
        let _ = running.run().await;
    });
    let port = loop {
        if let Some(port) = hub.bound_port() {
            break port;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    };
    (hub, port)
}
