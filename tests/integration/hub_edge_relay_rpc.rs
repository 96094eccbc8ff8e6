#[path = "support.rs"]
mod support;

use edge::{EdgeClient, EdgeConfig, EdgeConfigInput};
use route_rpc::StubRegistry;
use std::sync::Arc;
use std::time::Duration;

fn relay_config(route_id: &str, hub_port: u16) -> EdgeConfig {
    EdgeConfig::validate(EdgeConfigInput {
        route_id: route_id.to_owned(),
        router_center_host: "127.0.0.1".to_owned(),
        router_center_port: hub_port,
        rpc_mode: "relay".to_owned(),
        local_rpc_host: String::new(),
        local_rpc_port: 0,
        heart_beat_interval_second: 1,
        reconnect_interval_ms: 1000,
    })
    .unwrap()
}

/// Two edges connect to a hub; Y registers packetId 7 = (a, b) -> a + b.
/// X calls Y through the relay transport and gets "5" back.
#[tokio::test]
async fn two_edges_relay_an_rpc_call_through_the_hub() {
    let (_hub, hub_port) = support::spawn_hub().await;

    let y_stubs = Arc::new(StubRegistry::new());
    let (meta, handler) = route_rpc::stub::two_arg_handler::<i64, i64, i64, _>(7, "adds", "add", ["a", "b"], |a, b| Ok(a + b));
    y_stubs.register_raw(meta, handler);
    let y = EdgeClient::new(relay_config("edge-y", hub_port), y_stubs);
    y.start().await.unwrap();

    let x_stubs = Arc::new(StubRegistry::new());
    let (meta, handler) = route_rpc::stub::two_arg_handler::<i64, i64, i64, _>(1, "noop", "noop", ["a", "b"], |a, _b| Ok(a));
    x_stubs.register_raw(meta, handler);
    let x = EdgeClient::new(relay_config("edge-x", hub_port), x_stubs);
    x.start().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if x.route_table().has_route_node("edge-y").await {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "edge-x never learned about edge-y");
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let result = x.call("edge-y", 7, Duration::from_secs(2), vec!["2".into(), "3".into()]).await.unwrap();
    assert_eq!(result, "5");

    x.shutdown().await;
    y.shutdown().await;
}
