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
        reconnect_interval_ms: 200,
    })
    .unwrap()
}

/// When the hub drops an edge's session (forcing its socket closed), the
/// edge notices the connection loss and reconnects on its own, without any
/// caller intervention.
#[tokio::test]
async fn edge_reconnects_after_the_hub_drops_its_session() {
    let _ = tracing_subscriber::fmt().with_env_filter("debug").try_init();
    let (hub, hub_port) = support::spawn_hub().await;

    let stubs = Arc::new(StubRegistry::new());
    let (meta, handler) = route_rpc::stub::two_arg_handler::<i64, i64, i64, _>(1, "noop", "noop", ["a", "b"], |a, _b| Ok(a));
    stubs.register_raw(meta, handler);
    let edge = EdgeClient::new(relay_config("flaky-edge", hub_port), stubs);
    edge.start().await.unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    let original_session = loop {
        if let Some(session) = hub.sessions.get_session("flaky-edge").await
            && edge.is_connected()
        {
            break session;
        }
        assert!(tokio::time::Instant::now() < deadline, "edge never registered its first heartbeat with the hub");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };

    hub.sessions.remove_session("flaky-edge").await;

    // The reconnect can happen faster than any poll interval could observe
    // the transient disconnected state, so the proof of a *real* reconnect
    // (rather than the original connection never having dropped at all) is
    // a fresh session object replacing the removed one.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(session) = hub.sessions.get_session("flaky-edge").await
            && !Arc::ptr_eq(&session, &original_session)
        {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "edge never re-registered a fresh session after the drop");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(edge.is_connected());

    edge.shutdown().await;
}
