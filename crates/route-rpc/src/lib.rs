//! RPC layer on top of route-protocol: stub registry, future registry, and
//! the two interchangeable transports (direct edge-to-edge, relay through
//! the hub) behind a shared `ServiceProvider` capability.

pub mod direct;
pub mod error;
pub mod future;
pub mod ids;
pub mod provider;
pub mod relay;
pub mod stub;

pub use direct::{serve_direct_rpc, DirectClient};
pub use error::RpcError;
pub use future::{Future, FutureRegistry, RpcOutcome};
pub use ids::generate_rpc_uid;
pub use provider::{RouteSender, ServiceProvider};
pub use relay::RelayClient;
pub use stub::{decode_arg, encode_result, StubRegistry};
