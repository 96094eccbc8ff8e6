//! The `RouteMessage` envelope and the closed `MessageType` taxonomy.
//!
//! Envelope layout (all integers big-endian i32, `-1` is the "absent"
//! sentinel for strings/type):
//!
//! ```text
//! i32 fromLen, fromLen bytes
//! i32 toLen,   toLen bytes
//! i32 msgTypeOrdinal
//! i32 dataLen, dataLen bytes (omitted if dataLen == -1)
//! ```

use crate::ProtocolError;
use serde::{Deserialize, Serialize};

/// Wire-stable ordinals. Never reorder; unknown ordinals decode as `None`,
/// not as a parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(i32)]
pub enum MessageType {
    HeartBeat = 0,
    MessageData = 1,
    RemoveRouteNode = 2,
    RpcRequest = 3,
    RpcResponse = 4,
    SystemError = 5,
}

impl MessageType {
    pub fn from_ordinal(ordinal: i32) -> Option<Self> {
        match ordinal {
            0 => Some(Self::HeartBeat),
            1 => Some(Self::MessageData),
            2 => Some(Self::RemoveRouteNode),
            3 => Some(Self::RpcRequest),
            4 => Some(Self::RpcResponse),
            5 => Some(Self::SystemError),
            _ => None,
        }
    }

    pub fn ordinal(self) -> i32 {
        self as i32
    }
}

/// A route-table entry: one edge's identity and, if it runs a direct RPC
/// listener, the address to reach it at.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteNode {
    #[serde(rename = "routerId")]
    pub router_id: String,
    #[serde(rename = "hostForRpc")]
    pub host_for_rpc: String,
    #[serde(rename = "portForRpc")]
    pub port_for_rpc: i32,
}

/// The envelope carried by every frame between a hub and an edge (and
/// between edges, for direct messaging through the hub's relay path).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMessage {
    pub from_route_id: String,
    pub to_route_id: String,
    pub message_type: Option<MessageType>,
    pub data: Option<String>,
}

fn put_string(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as i32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

/// Encodes the envelope's payload bytes (callers frame these separately).
pub fn encode(msg: &RouteMessage) -> Vec<u8> {
    let mut buf = Vec::new();
    put_string(&mut buf, &msg.from_route_id);
    put_string(&mut buf, &msg.to_route_id);
    let ordinal = msg.message_type.map_or(-1, MessageType::ordinal);
    buf.extend_from_slice(&ordinal.to_be_bytes());
    match &msg.data {
        Some(data) => put_string(&mut buf, data),
        None => buf.extend_from_slice(&(-1i32).to_be_bytes()),
    }
    buf
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        if self.remaining() < 4 {
            return Err(ProtocolError::Truncated("i32 field"));
        }
        let mut b = [0u8; 4];
        b.copy_from_slice(&self.bytes[self.pos..self.pos + 4]);
        self.pos += 4;
        Ok(i32::from_be_bytes(b))
    }

    fn read_string(&mut self, len: i32) -> Result<String, ProtocolError> {
        if len < 0 {
            return Err(ProtocolError::NegativeLength(len));
        }
        let len = len as usize;
        if self.remaining() < len {
            return Err(ProtocolError::Truncated("string field"));
        }
        let s = String::from_utf8(self.bytes[self.pos..self.pos + len].to_vec())?;
        self.pos += len;
        Ok(s)
    }
}

/// Decodes an envelope from raw payload bytes, tolerating one legacy quirk:
/// a payload that begins with a redundant 4-byte length prefix equal to the
/// length of everything after it.
pub fn decode(payload: &[u8]) -> Result<RouteMessage, ProtocolError> {
    let mut cursor = Cursor::new(payload);

    if cursor.remaining() >= 4 {
        let peek_pos = cursor.pos;
        let possible_len = cursor.read_i32()?;
        if possible_len >= 0 && possible_len as usize == cursor.remaining() {
            // Legacy extra length prefix: leave the cursor advanced past it.
        } else {
            cursor.pos = peek_pos;
        }
    }

    let from_len = cursor.read_i32()?;
    let from_route_id = cursor.read_string(from_len)?;
    let to_len = cursor.read_i32()?;
    let to_route_id = cursor.read_string(to_len)?;
    let ordinal = cursor.read_i32()?;
    let message_type = MessageType::from_ordinal(ordinal);
    let data_len = cursor.read_i32()?;
    let data = if data_len == -1 {
        None
    } else {
        Some(cursor.read_string(data_len)?)
    };

    Ok(RouteMessage {
        from_route_id,
        to_route_id,
        message_type,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(message_type: Option<MessageType>, data: Option<&str>) -> RouteMessage {
        RouteMessage {
            from_route_id: "a".into(),
            to_route_id: "b".into(),
            message_type,
            data: data.map(str::to_owned),
        }
    }

    #[test]
    fn round_trips_with_data_and_type() {
        let msg = sample(Some(MessageType::RpcRequest), Some("payload"));
        assert_eq!(decode(&encode(&msg)).unwrap(), msg);
    }

    #[test]
    fn round_trips_absent_data_and_type() {
        let msg = sample(None, None);
        assert_eq!(decode(&encode(&msg)).unwrap(), msg);
    }

    #[test]
    fn distinguishes_absent_data_from_empty_data() {
        let absent = sample(Some(MessageType::HeartBeat), None);
        let empty = sample(Some(MessageType::HeartBeat), Some(""));
        assert_ne!(encode(&absent), encode(&empty));
        assert_eq!(decode(&encode(&absent)).unwrap().data, None);
        assert_eq!(decode(&encode(&empty)).unwrap().data, Some(String::new()));
    }

    #[test]
    fn unknown_ordinal_decodes_as_absent() {
        let msg = sample(Some(MessageType::MessageData), Some("x"));
        let mut bytes = encode(&msg);
        // message_type field sits right after the two length-prefixed ids.
        let offset = 4 + msg.from_route_id.len() + 4 + msg.to_route_id.len();
        bytes[offset..offset + 4].copy_from_slice(&99i32.to_be_bytes());
        let decoded = decode(&bytes).unwrap();
        assert_eq!(decoded.message_type, None);
    }

    #[test]
    fn tolerates_a_legacy_extra_length_prefix() {
        let msg = sample(Some(MessageType::SystemError), Some("boom"));
        let inner = encode(&msg);
        let mut with_prefix = Vec::new();
        with_prefix.extend_from_slice(&(inner.len() as i32).to_be_bytes());
        with_prefix.extend_from_slice(&inner);
        assert_eq!(decode(&with_prefix).unwrap(), msg);
    }

    #[test]
    fn rejects_negative_length_other_than_sentinel() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(-2i32).to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&0i32.to_be_bytes());
        bytes.extend_from_slice(&(-1i32).to_be_bytes());
        assert!(decode(&bytes).is_err());
    }
}
