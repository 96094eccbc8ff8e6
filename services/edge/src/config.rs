//! Edge configuration: validated construction. Loading this from a JSON
//! file on disk is the binary's job (`main.rs`); this type and its defaults
//! are unit-testable without touching the filesystem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("不允许 routeId 为空")]
    MissingRouteId,
    #[error("不允许 routerCenterHost 为空")]
    MissingRouterCenterHost,
    #[error("不允许 routerCenterPort = 0")]
    MissingRouterCenterPort,
    #[error("direct 模式下，必须配置 localRpcHost")]
    MissingLocalRpcHost,
    #[error("direct 模式下，必须配置 localRpcPort")]
    MissingLocalRpcPort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RpcMode {
    Relay,
    Direct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfigInput {
    #[serde(rename = "routeId", default)]
    pub route_id: String,
    #[serde(rename = "routerCenterHost", default)]
    pub router_center_host: String,
    #[serde(rename = "routerCenterPort", default)]
    pub router_center_port: u16,
    #[serde(rename = "rpcMode", default)]
    pub rpc_mode: String,
    #[serde(rename = "localRpcHost", default)]
    pub local_rpc_host: String,
    #[serde(rename = "localRpcPort", default)]
    pub local_rpc_port: u16,
    #[serde(rename = "heartBeatIntervalSecond", default)]
    pub heart_beat_interval_second: i64,
    #[serde(rename = "reconnectIntervalMs", default)]
    pub reconnect_interval_ms: i64,
}

#[derive(Debug, Clone)]
pub struct EdgeConfig {
    pub route_id: String,
    pub router_center_host: String,
    pub router_center_port: u16,
    pub rpc_mode: RpcMode,
    pub local_rpc_host: String,
    pub local_rpc_port: u16,
    pub heart_beat_interval_second: i64,
    pub reconnect_interval_ms: i64,
}

impl EdgeConfig {
    pub fn validate(input: EdgeConfigInput) -> Result<Self, ConfigError> {
        if input.route_id.trim().is_empty() {
            return Err(ConfigError::MissingRouteId);
        }
        if input.router_center_host.trim().is_empty() {
            return Err(ConfigError::MissingRouterCenterHost);
        }
        if input.router_center_port == 0 {
            return Err(ConfigError::MissingRouterCenterPort);
        }
        let rpc_mode = if input.rpc_mode.eq_ignore_ascii_case("direct") {
            RpcMode::Direct
        } else {
            RpcMode::Relay
        };
        if rpc_mode == RpcMode::Direct {
            if input.local_rpc_host.trim().is_empty() {
                return Err(ConfigError::MissingLocalRpcHost);
            }
            if input.local_rpc_port == 0 {
                return Err(ConfigError::MissingLocalRpcPort);
            }
        }
        Ok(Self {
            route_id: input.route_id,
            router_center_host: input.router_center_host,
            router_center_port: input.router_center_port,
            rpc_mode,
            local_rpc_host: input.local_rpc_host,
            local_rpc_port: input.local_rpc_port,
            heart_beat_interval_second: if input.heart_beat_interval_second <= 0 { 10 } else { input.heart_beat_interval_second },
            reconnect_interval_ms: if input.reconnect_interval_ms <= 0 { 30_000 } else { input.reconnect_interval_ms },
        })
    }
}
