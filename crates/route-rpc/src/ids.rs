//! Correlation-ID generation: `prefix-unixMs-counter`. Uniqueness is only
//! required within one process.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static COUNTER: AtomicU64 = AtomicU64::new(0);

pub fn generate_rpc_uid(prefix: &str) -> String {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{now_ms}-{n}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn generates_unique_ids_within_a_process() {
        let ids: HashSet<_> = (0..100).map(|_| generate_rpc_uid("relay")).collect();
        assert_eq!(ids.len(), 100);
    }
}
