//! Stub registry: maps a wire `packetId` to a registered handler, with
//! metadata for discovery (advertised in heartbeats) and reflective-style
//! JSON argument binding in place of runtime reflection.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future as StdFuture;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use futures_util::FutureExt;
use route_protocol::RpcStubMetadata;

pub type BoxFuture<'a, T> = Pin<Box<dyn StdFuture<Output = T> + Send + 'a>>;
type Handler = Arc<dyn Fn(Vec<String>) -> BoxFuture<'static, Result<String, String>> + Send + Sync>;

const UNREGISTERED_ERROR: &str = "方法未注册";

#[derive(Default)]
struct Inner {
    handlers: HashMap<i32, Handler>,
    metadata: HashMap<i32, RpcStubMetadata>,
    initialized: bool,
}

/// An edge's registered set of callable RPC methods. Owned by the edge
/// client, not a process-global singleton.
#[derive(Default)]
pub struct StubRegistry {
    inner: Mutex<Inner>,
}

impl StubRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once at least one stub has been registered; the edge client
    /// refuses to start without this.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().unwrap().initialized
    }

    /// Registers a raw handler taking already-JSON-encoded positional
    /// arguments and returning a JSON-encoded (or plain string) result.
    pub fn register_raw(
        &self,
        metadata: RpcStubMetadata,
        handler: Handler,
    ) {
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.insert(metadata.packet_id, handler);
        inner.metadata.insert(metadata.packet_id, metadata);
        inner.initialized = true;
    }

    /// Invokes the registered handler for `packet_id` with JSON-encoded
    /// positional arguments, returning the JSON/plain-string result or the
    /// error text (including a panic inside the handler, caught here).
    pub async fn invoke(&self, packet_id: i32, args: Vec<String>) -> Result<String, String> {
        let handler = {
            let inner = self.inner.lock().unwrap();
            inner.handlers.get(&packet_id).cloned()
        };
        let Some(handler) = handler else {
            return Err(format!("{UNREGISTERED_ERROR}: packetId={packet_id}"));
        };
        match AssertUnwindSafe(handler(args)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => Err(format!("stub for packetId={packet_id} panicked")),
        }
    }

    pub fn all_metadata(&self) -> Vec<RpcStubMetadata> {
        self.inner.lock().unwrap().metadata.values().cloned().collect()
    }

    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.handlers.clear();
        inner.metadata.clear();
        inner.initialized = false;
    }
}

/// Decodes one positional JSON argument into `T`, or a descriptive error.
pub fn decode_arg<T: DeserializeOwned>(args: &[String], index: usize) -> Result<T, String> {
    let raw = args
        .get(index)
        .ok_or_else(|| format!("missing argument at position {index}"))?;
    serde_json::from_str(raw).map_err(|e| format!("argument {index} decode error: {e}"))
}

/// Encodes a handler's return value the way the wire expects: pass strings
/// through verbatim, JSON-encode everything else.
pub fn encode_result<T: Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("result encode error: {e}"))
}

/// Builder helper: registers a two-argument synchronous handler, deriving
/// metadata's parameter type names from the generic parameters.
pub fn two_arg_handler<A, B, R, F>(
    packet_id: i32,
    description: &str,
    method_name: &str,
    param_names: [&str; 2],
    f: F,
) -> (RpcStubMetadata, Handler)
where
    A: DeserializeOwned + Send + 'static,
    B: DeserializeOwned + Send + 'static,
    R: Serialize + Send + 'static,
    F: Fn(A, B) -> Result<R, String> + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handler: Handler = Arc::new(move |args: Vec<String>| {
        let f = f.clone();
        Box::pin(async move {
            let a: A = decode_arg(&args, 0)?;
            let b: B = decode_arg(&args, 1)?;
            let result = f(a, b)?;
            encode_result(&result)
        })
    });
    let metadata = RpcStubMetadata {
        packet_id,
        description: description.to_owned(),
        class_name: String::new(),
        method_name: method_name.to_owned(),
        parameter_types: vec![
            std::any::type_name::<A>().to_owned(),
            std::any::type_name::<B>().to_owned(),
        ],
        parameter_names: param_names.iter().map(|s| (*s).to_owned()).collect(),
        parameter_descriptions: vec![String::new(), String::new()],
        parameter_example_json: vec![String::new(), String::new()],
    };
    (metadata, handler)
}
