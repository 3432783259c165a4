//! In-flight calls awaiting a correlated response.
//!
//! Each entry is a one-shot slot. It leaves the table exactly once: when
//! the response arrives, when the caller gives up (timeout, cancellation,
//! dropped future), or when a disconnect fails every pending call.

use crate::{HolonsError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;
use tracing::debug;

type Slot = oneshot::Sender<Result<Value>>;

/// Concurrent table of pending calls keyed by call id.
#[derive(Default)]
pub struct PendingCalls {
    calls: Mutex<HashMap<String, Slot>>,
}

impl std::fmt::Debug for PendingCalls {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingCalls")
            .field("len", &self.len())
            .finish()
    }
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Slot>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a call and return the receiving half of its slot.
    ///
    /// The returned guard removes the entry when dropped, so a caller that
    /// stops waiting for any reason never leaves a stale entry behind.
    pub fn register(
        self: &Arc<Self>,
        id: &str,
    ) -> Result<(oneshot::Receiver<Result<Value>>, PendingGuard)> {
        let (tx, rx) = oneshot::channel();
        let mut calls = self.lock();
        if calls.contains_key(id) {
            return Err(HolonsError::Other(format!(
                "pending request already exists for id {}",
                id
            )));
        }
        calls.insert(id.to_string(), tx);
        Ok((
            rx,
            PendingGuard {
                table: Arc::clone(self),
                id: id.to_string(),
            },
        ))
    }

    /// Complete the call with `id`. Returns `false` when nothing was pending
    /// under that id (late, duplicate or unknown response).
    pub fn resolve(&self, id: &str, outcome: Result<Value>) -> bool {
        let slot = self.lock().remove(id);
        match slot {
            Some(tx) => {
                // The waiter may have just given up; nothing left to notify.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    /// Fail every pending call with the error produced by `make_err`.
    pub fn fail_all(&self, make_err: impl Fn() -> HolonsError) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (id, tx) in drained {
            debug!("Failing pending call {}", id);
            let _ = tx.send(Err(make_err()));
        }
        count
    }

    /// Remove an entry without completing it.
    pub fn remove(&self, id: &str) -> bool {
        self.lock().remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Removes its pending entry on drop.
#[derive(Debug)]
pub struct PendingGuard {
    table: Arc<PendingCalls>,
    id: String,
}

impl PendingGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.table.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_resolve_delivers_result() {
        let table = Arc::new(PendingCalls::new());
        let (rx, _guard) = table.register("c1").unwrap();

        assert!(table.resolve("c1", Ok(json!({"ok": true}))));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"ok": true}));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_id_leaves_others_untouched() {
        let table = Arc::new(PendingCalls::new());
        let (_rx, _guard) = table.register("c1").unwrap();

        assert!(!table.resolve("c99", Ok(json!({}))));
        assert!(table.contains("c1"));
        assert_eq!(table.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_resolve_is_dropped() {
        let table = Arc::new(PendingCalls::new());
        let (rx, _guard) = table.register("c1").unwrap();

        assert!(table.resolve("c1", Ok(json!({"n": 1}))));
        assert!(!table.resolve("c1", Ok(json!({"n": 2}))));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"n": 1}));
    }

    #[tokio::test]
    async fn test_fail_all_fails_each_once() {
        let table = Arc::new(PendingCalls::new());
        let (rx1, _g1) = table.register("c1").unwrap();
        let (rx2, _g2) = table.register("c2").unwrap();

        assert_eq!(table.fail_all(|| HolonsError::ConnectionClosed), 2);
        assert_eq!(table.fail_all(|| HolonsError::ConnectionClosed), 0);

        assert!(matches!(rx1.await.unwrap(), Err(HolonsError::ConnectionClosed)));
        assert!(matches!(rx2.await.unwrap(), Err(HolonsError::ConnectionClosed)));
    }

    #[test]
    fn test_guard_removes_entry() {
        let table = Arc::new(PendingCalls::new());
        let (_rx, guard) = table.register("c1").unwrap();
        assert_eq!(guard.id(), "c1");
        drop(guard);
        assert!(!table.contains("c1"));
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let table = Arc::new(PendingCalls::new());
        let (_rx, _guard) = table.register("c1").unwrap();
        assert!(table.register("c1").is_err());
    }
}
