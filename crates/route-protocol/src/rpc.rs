//! JSON-encoded payload types carried inside `RouteMessage.data` (relay mode)
//! or sent directly over a framed connection (direct mode). Field names
//! mirror the wire's camelCase JSON tags exactly.

use serde::{Deserialize, Serialize};

/// One RPC-callable registered by an edge, advertised in its heartbeats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcStubMetadata {
    #[serde(rename = "packetId")]
    pub packet_id: i32,
    pub description: String,
    #[serde(rename = "className")]
    pub class_name: String,
    #[serde(rename = "methodName")]
    pub method_name: String,
    #[serde(rename = "parameterTypes")]
    pub parameter_types: Vec<String>,
    #[serde(rename = "parameterNames")]
    pub parameter_names: Vec<String>,
    #[serde(rename = "parameterDescriptions")]
    pub parameter_descriptions: Vec<String>,
    #[serde(rename = "parameterExampleJson")]
    pub parameter_example_json: Vec<String>,
}

/// Declared in every heartbeat; `host`/`port` are empty/zero in relay mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcServerInfo {
    pub host: String,
    pub port: i32,
    pub stubs: Vec<RpcStubMetadata>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(rename = "fromRouteId")]
    pub from_route_id: String,
    #[serde(rename = "toRouteId")]
    pub to_route_id: String,
    #[serde(rename = "rpcUid")]
    pub rpc_uid: String,
    #[serde(rename = "startTimeMs")]
    pub start_time_ms: i64,
    #[serde(rename = "packetId")]
    pub packet_id: i32,
    #[serde(rename = "methodArgsJsonList")]
    pub method_args_json_list: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcResponse {
    #[serde(rename = "rpcUid")]
    pub rpc_uid: String,
    #[serde(rename = "errorFlag")]
    pub error_flag: bool,
    #[serde(rename = "errorMsg")]
    pub error_msg: String,
    #[serde(rename = "startTimeMs")]
    pub start_time_ms: i64,
    #[serde(rename = "packetId")]
    pub packet_id: i32,
    #[serde(rename = "resultValueStr")]
    pub result_value_str: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_uses_camel_case_wire_tags() {
        let req = RpcRequest {
            from_route_id: "a".into(),
            to_route_id: "b".into(),
            rpc_uid: "relay-1-1".into(),
            start_time_ms: 0,
            packet_id: 7,
            method_args_json_list: vec!["2".into(), "3".into()],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["fromRouteId"], "a");
        assert_eq!(json["rpcUid"], "relay-1-1");
        assert_eq!(json["methodArgsJsonList"][0], "2");
    }
}
