// route-protocol: wire types and framing for the router mesh.
//
// Two layers: an outer length-prefixed frame (`frame` module) and an inner
// `RouteMessage` envelope whose own fields are individually length-prefixed.
// Both layers are shared by the hub, every edge, and the direct RPC
// listeners — there is exactly one framing implementation in this crate.

use std::io;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

pub mod frame;
pub mod message;
pub mod rpc;

pub use frame::{read_frame, write_frame, FrameError, MAX_FRAME_SIZE};
pub use message::{MessageType, RouteMessage, RouteNode};
pub use rpc::{RpcRequest, RpcResponse, RpcServerInfo, RpcStubMetadata};

/// Errors raised while decoding a [`RouteMessage`] envelope from frame bytes.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("truncated envelope: {0}")]
    Truncated(&'static str),
    #[error("negative length field: {0}")]
    NegativeLength(i32),
    #[error("invalid utf-8 in envelope field: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),
}

/// Reads one frame from `reader` and decodes it as a [`RouteMessage`].
pub async fn read_route_message<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<RouteMessage, ProtocolError> {
    let payload = read_frame(reader).await?;
    message::decode(&payload)
}

/// Encodes `msg` and writes it as one frame to `writer`.
pub async fn write_route_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &RouteMessage,
) -> io::Result<()> {
    let payload = message::encode(msg);
    write_frame(writer, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[tokio::test]
    async fn round_trips_through_a_real_frame() {
        let msg = RouteMessage {
            from_route_id: "edge-a".into(),
            to_route_id: "edge-b".into(),
            message_type: Some(MessageType::MessageData),
            data: Some("payload".into()),
        };
        let mut buf = Vec::new();
        write_route_message(&mut buf, &msg).await.unwrap();
        let mut cursor = Cursor::new(buf);
        let decoded = read_route_message(&mut cursor).await.unwrap();
        assert_eq!(decoded, msg);
    }
}
