//! One-shot completion objects keyed by `rpcUid`, used to demultiplex async
//! RPC replies. Every edge owns two independent registries — one for direct
//! responses, one for relayed ones — rather than a single process-global
//! instance (see the explicitly-owned-registries design note).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::oneshot;

/// The terminal outcome of one RPC call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcOutcome {
    Success(String),
    Error(String),
}

/// A pending reply slot. `register` hands back the awaiting half; the
/// registry holds the completing half until `set_success`/`set_error` pops
/// it, or it is dropped by `pop`.
pub struct Future {
    rx: oneshot::Receiver<RpcOutcome>,
}

impl Future {
    /// Waits for completion, or resolves to the `"rpc timeout"` error once
    /// `timeout` elapses (a non-positive timeout waits forever).
    pub async fn await_result(self, timeout: Duration) -> RpcOutcome {
        if timeout.is_zero() {
            return self.rx.await.unwrap_or_else(|_| RpcOutcome::Error("rpc timeout".into()));
        }
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) | Err(_) => RpcOutcome::Error("rpc timeout".into()),
        }
    }
}

struct Slot {
    tx: oneshot::Sender<RpcOutcome>,
}

/// A `rpcUid -> pending Future` map. A response for an unknown or
/// already-popped uid is discarded silently.
#[derive(Default)]
pub struct FutureRegistry {
    pending: Mutex<HashMap<String, Slot>>,
}

impl FutureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `uid` and returns the `Future` the caller should await.
    pub fn register(&self, uid: impl Into<String>) -> Future {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(uid.into(), Slot { tx });
        Future { rx }
    }

    fn pop(&self, uid: &str) -> Option<Slot> {
        self.pending.lock().unwrap().remove(uid)
    }

    /// Completes `uid` with a success result. No-op if `uid` is unknown.
    pub fn set_success(&self, uid: &str, result: impl Into<String>) {
        if let Some(slot) = self.pop(uid) {
            let _ = slot.tx.send(RpcOutcome::Success(result.into()));
        }
    }

    /// Completes `uid` with an error. No-op if `uid` is unknown.
    pub fn set_error(&self, uid: &str, message: impl Into<String>) {
        if let Some(slot) = self.pop(uid) {
            let _ = slot.tx.send(RpcOutcome::Error(message.into()));
        }
    }
}
