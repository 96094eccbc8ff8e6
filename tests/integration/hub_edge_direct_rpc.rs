#[path = "support.rs"]
mod support;

use edge::{EdgeClient, EdgeConfig, EdgeConfigInput};
use route_rpc::StubRegistry;
use std::sync::Arc;
use std::time::Duration;

async fn free_port() -> u16 {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
    listener.local_addr().unwrap().port()
}

fn direct_config(route_id: &str, hub_port: u16, local_rpc_port: u16) -> EdgeConfig {
    EdgeConfig::validate(EdgeConfigInput {
        route_id: route_id.to_owned(),
        router_center_host: "127.0.0.1".to_owned(),
        router_center_port: hub_port,
        rpc_mode: "direct".to_owned(),
        local_rpc_host: "127.0.0.1".to_owned(),
        local_rpc_port,
        heart_beat_interval_second: 1,
        reconnect_interval_ms: 1000,
    })
    .unwrap()
}

/// Y registers packetId 10 = (a, b) -> a * b on its own local RPC listener.
/// X calls Y through the direct transport (no hub relay in the data path)
/// once the hub has told X where Y's listener lives.
#[tokio::test]
async fn two_edges_call_each_other_directly_once_addresses_are_known() {
    let (_hub, hub_port) = support::spawn_hub().await;
    let y_port = free_port().await;

    let y_stubs = Arc::new(StubRegistry::new());
    let (meta, handler) = route_rpc::stub::two_arg_handler::<i64, i64, i64, _>(10, "multiplies", "mul", ["a", "b"], |a, b| Ok(a * b));
    y_stubs.register_raw(meta, handler);
    let y = EdgeClient::new(direct_config("edge-y", hub_port, y_port), y_stubs);
    y.start().await.unwrap();

    let x_stubs = Arc::new(StubRegistry::new());
    let (meta, handler) = route_rpc::stub::two_arg_handler::<i64, i64, i64, _>(1, "noop", "noop", ["a", "b"], |a, _b| Ok(a));
    x_stubs.register_raw(meta, handler);
    let x_port = free_port().await;
    let x = EdgeClient::new(direct_config("edge-x", hub_port, x_port), x_stubs);
    x.start().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if x.route_table().has_route_node("edge-y").await {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "edge-x never learned edge-y's direct rpc address");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let result = x.call("edge-y", 10, Duration::from_secs(2), vec!["4".into(), "5".into()]).await.unwrap();
    assert_eq!(result, "20");

    x.shutdown().await;
    y.shutdown().await;
}
