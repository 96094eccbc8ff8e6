pub mod client;
pub mod config;
pub mod error;
pub mod route_table;

pub use client::EdgeClient;
pub use config::{ConfigError, EdgeConfig, EdgeConfigInput, RpcMode};
pub use error::EdgeError;
pub use route_table::RouteTable;
