//! Pending-request table.
//!
//! Tracks outstanding requests keyed by correlation id and owns the
//! at-most-once settlement guarantee: every entry leaves the table exactly
//! once, through a matching response, a timeout, an encode failure, or the
//! teardown drain. Any settlement path first removes the entry, so a race
//! between two completion sources only drains the loser into a no-op.
//!
//! The table's mutex is the connection's only synchronization point; all
//! operations are atomic insert-if-absent / remove-if-present.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::{oneshot, watch};
use tracing::warn;

use crate::error::{Error, Result};
use crate::id::CorrelationId;
use crate::protocol::Response;

// ============================================================================
// Types
// ============================================================================

/// Settlement handle for one pending request.
pub(crate) type Waiter = oneshot::Sender<Result<Response>>;

// ============================================================================
// PendingTable
// ============================================================================

/// Outstanding request state keyed by correlation id.
///
/// Ids are assumed unique among currently-pending entries; the allocator's
/// wire-width wraparound makes a collision possible only past 2^30
/// concurrently pending requests, which is documented rather than detected.
pub(crate) struct PendingTable {
    /// Waiters by correlation id.
    entries: Mutex<FxHashMap<CorrelationId, Waiter>>,

    /// Live entry count, watched by graceful close to await drain.
    size_tx: watch::Sender<usize>,
}

impl PendingTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            size_tx: watch::channel(0).0,
        }
    }

    /// Registers a waiter under a freshly allocated id.
    pub fn register(&self, id: CorrelationId, waiter: Waiter) {
        let mut entries = self.entries.lock();
        entries.insert(id, waiter);
        self.size_tx.send_replace(entries.len());
    }

    /// Settles the waiter for `id` with a response.
    ///
    /// An unmatched id (already timed out, already drained, or a duplicate
    /// frame) is logged and dropped; it is never a connection-level error.
    pub fn resolve(&self, id: CorrelationId, response: Response) {
        match self.remove(id) {
            Some(waiter) => {
                let _ = waiter.send(Ok(response));
            }
            None => {
                warn!(%id, "no pending request for response, maybe it timed out");
            }
        }
    }

    /// Rejects the waiter for `id`, if it is still pending.
    ///
    /// No-op when the entry is already gone, which protects a
    /// timeout/late-success race from settling twice.
    pub fn fail(&self, id: CorrelationId, error: Error) {
        if let Some(waiter) = self.remove(id) {
            let _ = waiter.send(Err(error));
        }
    }

    /// Rejects every still-pending waiter with the supplied error.
    ///
    /// Invoked exactly once, by connection teardown.
    pub fn drain_all(&self, error: &Error) {
        let drained: Vec<Waiter> = {
            let mut entries = self.entries.lock();
            let drained = entries.drain().map(|(_, waiter)| waiter).collect();
            self.size_tx.send_replace(0);
            drained
        };
        for waiter in drained {
            let _ = waiter.send(Err(error.clone()));
        }
    }

    /// Returns the number of pending requests.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Resolves once the table is empty.
    ///
    /// Graceful close parks here so every in-flight request settles through
    /// its own path before the connection finalizes.
    pub async fn wait_empty(&self) {
        let mut size_rx = self.size_tx.subscribe();
        // sender lives in self, so wait_for cannot fail
        let _ = size_rx.wait_for(|size| *size == 0).await;
    }

    fn remove(&self, id: CorrelationId) -> Option<Waiter> {
        let mut entries = self.entries.lock();
        let waiter = entries.remove(&id);
        if waiter.is_some() {
            self.size_tx.send_replace(entries.len());
        }
        waiter
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    fn id(raw: u32) -> CorrelationId {
        CorrelationId::from_raw(raw)
    }

    #[tokio::test]
    async fn test_resolve_settles_waiter() {
        let table = PendingTable::new();
        let (tx, rx) = oneshot::channel();

        table.register(id(1), tx);
        assert_eq!(table.len(), 1);

        table.resolve(id(1), Response::new(json!("hello")));
        assert_eq!(table.len(), 0);

        let settled = rx.await.expect("waiter settled");
        assert_eq!(settled.expect("resolved").payload, json!("hello"));
    }

    #[tokio::test]
    async fn test_resolve_unknown_id_is_dropped() {
        let table = PendingTable::new();
        // must not panic, must not disturb the table
        table.resolve(id(42), Response::new(json!(null)));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_fail_then_resolve_settles_once() {
        let table = PendingTable::new();
        let (tx, rx) = oneshot::channel();

        table.register(id(7), tx);
        table.fail(id(7), Error::response_timeout(1, "127.0.0.1:12200"));
        // loser of the race drains into a no-op
        table.resolve(id(7), Response::new(json!("late")));

        let settled = rx.await.expect("waiter settled");
        let err = settled.expect_err("failed first");
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_fail_unknown_id_is_noop() {
        let table = PendingTable::new();
        table.fail(id(9), Error::socket_closed("127.0.0.1:12200"));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn test_drain_all_rejects_everything() {
        let table = PendingTable::new();
        let (tx1, rx1) = oneshot::channel();
        let (tx2, rx2) = oneshot::channel();

        table.register(id(1), tx1);
        table.register(id(2), tx2);

        table.drain_all(&Error::socket_closed("127.0.0.1:12200"));
        assert_eq!(table.len(), 0);

        for rx in [rx1, rx2] {
            let err = rx.await.expect("settled").expect_err("drained");
            assert_eq!(err.result_code(), Some("02"));
        }
    }

    #[tokio::test]
    async fn test_wait_empty_blocks_until_drained() {
        let table = PendingTable::new();
        let (tx, _rx) = oneshot::channel();
        table.register(id(1), tx);

        let mut waiting = task::spawn(table.wait_empty());
        assert_pending!(waiting.poll());

        table.fail(id(1), Error::socket_closed("127.0.0.1:12200"));
        assert!(waiting.is_woken());
        assert_ready!(waiting.poll());
    }

    #[tokio::test]
    async fn test_wait_empty_resolves_immediately_when_empty() {
        let table = PendingTable::new();
        let mut waiting = task::spawn(table.wait_empty());
        assert_ready!(waiting.poll());
    }
}
