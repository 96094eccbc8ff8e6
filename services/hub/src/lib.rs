pub mod config;
pub mod server;
pub mod session;
pub mod session_manager;

pub use config::{ConfigError, HubConfig, HubConfigInput};
pub use server::Hub;
pub use session::RouterSession;
pub use session_manager::{RouteIdConflict, SessionManager};
