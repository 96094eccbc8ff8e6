//! Hub configuration: validated construction. Loading this from a JSON file
//! on disk is the binary's job (`main.rs`); this type and its defaults are
//! unit-testable without touching the filesystem.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("routerServerPort must not be 0")]
    MissingPort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfigInput {
    #[serde(rename = "routerServerPort")]
    pub router_server_port: u16,
    #[serde(rename = "httpMonitorPort", default)]
    pub http_monitor_port: u16,
    #[serde(rename = "adminPassword", default)]
    pub admin_password: String,
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub router_server_port: u16,
    pub http_monitor_port: u16,
    pub admin_password: String,
}

impl HubConfig {
    pub fn validate(input: HubConfigInput) -> Result<Self, ConfigError> {
        if input.router_server_port == 0 {
            return Err(ConfigError::MissingPort);
        }
        Ok(Self {
            router_server_port: input.router_server_port,
            http_monitor_port: if input.http_monitor_port == 0 { 19999 } else { input.http_monitor_port },
            admin_password: if input.admin_password.is_empty() { "root".to_owned() } else { input.admin_password },
        })
    }
}
