use thiserror::Error;

#[derive(Debug, Error)]
pub enum EdgeError {
    #[error("VirtualRouterClient 未连接到 Router Center，无法发送消息")]
    NotConnected,
    #[error("VirtualRouterClient 未启动")]
    NotStarted,
    #[error("等待 VirtualRouterClient 重连超时")]
    ConnectTimeout,
    #[error("VirtualRouterClient 已关闭")]
    Shutdown,
    #[error("10s 还是没有收到 router-server 返回任何注册信息, 请检查你的配置")]
    RouteTableTimeout,
    #[error("route-rpc error: {0}")]
    Rpc(#[from] route_rpc::RpcError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("route-id '{0}' not found in route table")]
    RouteNotFound(String),
    #[error("必须先注册至少一个 RPC Stub 才能启动")]
    StubsNotInitialized,
}
