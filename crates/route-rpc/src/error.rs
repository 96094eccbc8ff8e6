use thiserror::Error;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("not connected to the hub")]
    NotConnected,
    #[error("rpc timeout")]
    Timeout,
    #[error("send failed: {0}")]
    Send(String),
    #[error("{0}")]
    Stub(String),
}
