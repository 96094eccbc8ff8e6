#[path = "support.rs"]
mod support;

use route_protocol::{read_route_message, write_route_message, MessageType, RouteMessage, RpcServerInfo};
use std::time::Duration;
use tokio::net::TcpStream;

async fn raw_heartbeat(stream: &mut TcpStream, route_id: &str) -> RouteMessage {
    let info = RpcServerInfo { host: String::new(), port: 0, stubs: vec![] };
    let msg = RouteMessage {
        from_route_id: route_id.to_owned(),
        to_route_id: String::new(),
        message_type: Some(MessageType::HeartBeat),
        data: Some(serde_json::to_string(&info).unwrap()),
    };
    write_route_message(stream, &msg).await.unwrap();
    tokio::time::timeout(Duration::from_secs(2), read_route_message(stream))
        .await
        .expect("hub did not reply to heartbeat")
        .unwrap()
}

/// A second TCP connection claiming a route-id an active session already
/// owns gets a `SystemError` naming the conflict, not a normal heartbeat
/// reply.
#[tokio::test]
async fn conflicting_route_id_gets_a_system_error() {
    let (_hub, hub_port) = support::spawn_hub().await;

    let mut first = TcpStream::connect(("127.0.0.1", hub_port)).await.unwrap();
    let reply = raw_heartbeat(&mut first, "dup-edge").await;
    assert_eq!(reply.message_type, Some(MessageType::HeartBeat));

    let mut second = TcpStream::connect(("127.0.0.1", hub_port)).await.unwrap();
    let reply = raw_heartbeat(&mut second, "dup-edge").await;
    assert_eq!(reply.message_type, Some(MessageType::SystemError));
    let data = reply.data.unwrap();
    assert!(data.contains("RouterId"));
    assert!(data.contains("已经存在"));
}

/// A repeat heartbeat from the very same socket just refreshes the
/// existing session instead of being rejected as a conflict.
#[tokio::test]
async fn repeat_heartbeat_from_the_same_connection_is_not_a_conflict() {
    let (_hub, hub_port) = support::spawn_hub().await;

    let mut conn = TcpStream::connect(("127.0.0.1", hub_port)).await.unwrap();
    let first = raw_heartbeat(&mut conn, "steady-edge").await;
    assert_eq!(first.message_type, Some(MessageType::HeartBeat));

    let second = raw_heartbeat(&mut conn, "steady-edge").await;
    assert_eq!(second.message_type, Some(MessageType::HeartBeat));
}

/// Once a session is removed, its route-id is immediately reclaimable by a
/// new connection.
#[tokio::test]
async fn closed_session_route_id_is_reclaimable() {
    let (hub, hub_port) = support::spawn_hub().await;

    let mut first = TcpStream::connect(("127.0.0.1", hub_port)).await.unwrap();
    raw_heartbeat(&mut first, "reclaim-edge").await;
    drop(first);

    hub.sessions.remove_session("reclaim-edge").await;

    let mut second = TcpStream::connect(("127.0.0.1", hub_port)).await.unwrap();
    let reply = raw_heartbeat(&mut second, "reclaim-edge").await;
    assert_eq!(reply.message_type, Some(MessageType::HeartBeat));
}
