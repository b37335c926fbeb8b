use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;

use crate::error::BridgeError;
use crate::protocol::CorrelationId;

type Completion<T> = oneshot::Sender<Result<T, BridgeError>>;

struct Entry<T> {
    tx: Completion<T>,
    created_at: Instant,
    op: &'static str,
}

/// Outstanding request ids and their completion handles.
///
/// Every entry is removed exactly once: on the matching response, on
/// cancellation after a timeout, or when the table is flushed after a fault.
pub struct CorrelationTable<T> {
    entries: Mutex<HashMap<CorrelationId, Entry<T>>>,
}

/// Receiving half of a registered request.
pub struct Pending<T> {
    pub id: CorrelationId,
    pub op: &'static str,
    rx: oneshot::Receiver<Result<T, BridgeError>>,
}

impl<T> Default for CorrelationTable<T> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<T> CorrelationTable<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<CorrelationId, Entry<T>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a fresh id for `op`.
    pub fn register(&self, op: &'static str) -> Pending<T> {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.lock();
        let mut id = CorrelationId::new();
        while entries.contains_key(&id) {
            id = CorrelationId::new();
        }
        entries.insert(
            id,
            Entry {
                tx,
                created_at: Instant::now(),
                op,
            },
        );
        Pending { id, op, rx }
    }

    /// Completes the entry for `id`. Returns `false` when no entry is live
    /// (already completed, timed out, or never issued).
    pub fn resolve(&self, id: &CorrelationId, value: T) -> bool {
        self.complete(id, Ok(value))
    }

    pub fn reject(&self, id: &CorrelationId, err: BridgeError) -> bool {
        self.complete(id, Err(err))
    }

    fn complete(&self, id: &CorrelationId, outcome: Result<T, BridgeError>) -> bool {
        let Some(entry) = self.lock().remove(id) else {
            return false;
        };
        log::trace!(
            "{} {} completed after {:?}",
            entry.op,
            id,
            entry.created_at.elapsed()
        );
        // The waiter may have gone away (dropped future); nothing to do then.
        let _ = entry.tx.send(outcome);
        true
    }

    /// Removes an entry without completing it.
    pub fn cancel(&self, id: &CorrelationId) -> bool {
        self.lock().remove(id).is_some()
    }

    /// Rejects every live entry with a copy of `err`. Returns how many were rejected.
    pub fn reject_all(&self, err: &BridgeError) -> usize {
        let drained: Vec<_> = self.lock().drain().collect();
        let count = drained.len();
        for (_, entry) in drained {
            let _ = entry.tx.send(Err(err.clone()));
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.lock().contains_key(id)
    }

    /// Awaits the outcome of `pending`, cancelling its entry if `deadline`
    /// passes first. `None` waits indefinitely.
    pub async fn wait(&self, pending: Pending<T>, deadline: Option<Duration>) -> Result<T, BridgeError> {
        let Pending { id, op, rx } = pending;
        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, rx).await {
                Ok(received) => received,
                Err(_) => {
                    self.cancel(&id);
                    log::debug!("{op} {id} timed out after {limit:?}");
                    return Err(BridgeError::Timeout { id, op });
                }
            },
            None => rx.await,
        };
        outcome.unwrap_or(Err(BridgeError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn resolve_delivers_once() {
        let table = CorrelationTable::<u32>::new();
        let pending = table.register("add_object");
        let id = pending.id;
        assert!(table.contains(&id));

        assert!(table.resolve(&id, 7));
        assert!(!table.resolve(&id, 8));
        assert_eq!(table.wait(pending, None).await, Ok(7));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn timeout_removes_the_entry() {
        let table = CorrelationTable::<()>::new();
        let pending = table.register("add_object");
        let id = pending.id;

        let err = table
            .wait(pending, Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::Timeout { id, op: "add_object" });
        assert!(table.is_empty());
        // A late response finds nothing to complete.
        assert!(!table.resolve(&id, ()));
    }

    #[tokio::test]
    async fn reject_all_fails_every_waiter() {
        let table = Arc::new(CorrelationTable::<()>::new());
        let a = table.register("add_object");
        let b = table.register("compute");
        assert_eq!(table.len(), 2);

        let fault = BridgeError::Transport("gone".into());
        assert_eq!(table.reject_all(&fault), 2);
        assert_eq!(table.wait(a, None).await, Err(fault.clone()));
        assert_eq!(table.wait(b, None).await, Err(fault));
    }

    #[tokio::test]
    async fn ids_are_unique_while_live() {
        let table = CorrelationTable::<()>::new();
        let ids: std::collections::HashSet<_> =
            (0..64).map(|_| table.register("x").id).collect();
        assert_eq!(ids.len(), 64);
        assert_eq!(table.len(), 64);
    }

    #[tokio::test]
    async fn dropped_table_entry_reports_disconnect() {
        let table = CorrelationTable::<()>::new();
        let pending = table.register("x");
        table.cancel(&pending.id);
        assert_eq!(table.wait(pending, None).await, Err(BridgeError::Disconnected));
    }
}
