//! The optimistic task snapshot and its reconciliation rules.
//!
//! Invariant: at any instant the snapshot is either the last server-confirmed
//! collection, or that collection plus a finite set of unconfirmed local
//! mutations, each reversible from retained pre-mutation state:
//!
//! - `update` keeps no point copy - on failure it resynchronizes with a full
//!   `fetch_all`, because after an unknown failure the optimistic copy alone
//!   cannot be trusted to reconstruct server state.
//! - `delete` retains the removed row and its position; a `NotFound` response
//!   confirms the removal instead of rolling it back.
//! - `delete_many` retains the entire pre-operation snapshot; a batch result
//!   is never decomposed per id.
//!
//! Snapshot mutations happen in call order under a lock that is never held
//! across an await. Network confirmations may land out of order; each one
//! touches only the row for its own id, last writer wins.

use std::sync::Mutex;

use pomokan_client::Gateway;
use pomokan_types::{ApiError, Todo, TodoDraft, TodoId, TodoPatch};
use tokio::sync::watch;

/// Optimistic cache over the user's task collection.
#[derive(Debug)]
pub struct TodoStore {
    gateway: Gateway,
    snapshot: Mutex<Vec<Todo>>,
    changes: watch::Sender<Vec<Todo>>,
}

impl TodoStore {
    #[must_use]
    pub fn new(gateway: Gateway) -> Self {
        let (changes, _) = watch::channel(Vec::new());
        Self {
            gateway,
            snapshot: Mutex::new(Vec::new()),
            changes,
        }
    }

    /// Current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Todo> {
        self.snapshot.lock().expect("snapshot mutex poisoned").clone()
    }

    /// Watch the snapshot; the receiver sees every optimistic mutation and
    /// every reconciliation.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Vec<Todo>> {
        self.changes.subscribe()
    }

    /// Mutate the snapshot synchronously and publish the result.
    fn apply<R>(&self, mutate: impl FnOnce(&mut Vec<Todo>) -> R) -> R {
        let mut snapshot = self.snapshot.lock().expect("snapshot mutex poisoned");
        let result = mutate(&mut snapshot);
        self.changes.send_replace(snapshot.clone());
        result
    }

    /// Replace the snapshot with the server's collection. Initial load, and
    /// the recovery path after a failed update.
    pub async fn fetch_all(&self) -> Result<(), ApiError> {
        let todos = self.gateway.list_todos().await?;
        self.apply(|snapshot| *snapshot = todos);
        Ok(())
    }

    /// Create a task. No optimistic insert: the id is server-assigned, so
    /// there is nothing to render before the response arrives.
    pub async fn create(&self, draft: TodoDraft) -> Result<Todo, ApiError> {
        let created = self.gateway.create_todo(&draft).await?;
        self.apply(|snapshot| snapshot.push(created.clone()));
        Ok(created)
    }

    /// Update a task optimistically, then reconcile with the canonical row.
    ///
    /// On failure the optimistic copy is discarded by resynchronizing the
    /// whole snapshot; the original error is surfaced either way.
    pub async fn update(&self, todo: Todo) -> Result<Todo, ApiError> {
        let id = todo.id;
        let patch = TodoPatch::from(&todo);
        self.apply(|snapshot| replace_row(snapshot, &todo));

        match self.gateway.patch_todo(id, &patch).await {
            Ok(canonical) => {
                self.apply(|snapshot| replace_row(snapshot, &canonical));
                Ok(canonical)
            }
            Err(err) => {
                tracing::warn!(%id, %err, "Update rejected; resynchronizing snapshot");
                if let Err(resync_err) = self.fetch_all().await {
                    tracing::warn!(%resync_err, "Resync after failed update also failed");
                }
                Err(err)
            }
        }
    }

    /// Delete a task optimistically.
    ///
    /// A `NotFound` from the server means the row was already gone: the
    /// removal is confirmed, not rolled back. Any other failure restores the
    /// row at its prior position.
    pub async fn delete(&self, id: TodoId) -> Result<(), ApiError> {
        let removed = self.apply(|snapshot| {
            let index = snapshot.iter().position(|todo| todo.id == id);
            index.map(|index| (index, snapshot.remove(index)))
        });

        match self.gateway.delete_todo(id).await {
            Ok(()) | Err(ApiError::NotFound) => Ok(()),
            Err(err) => {
                tracing::warn!(%id, %err, "Delete rejected; restoring row");
                if let Some((index, todo)) = removed {
                    self.apply(|snapshot| {
                        let index = index.min(snapshot.len());
                        snapshot.insert(index, todo);
                    });
                }
                Err(err)
            }
        }
    }

    /// Delete several tasks optimistically with one batched call.
    ///
    /// Any failure restores the entire pre-operation snapshot; a partial
    /// batch outcome is not trusted to be decomposed per id.
    pub async fn delete_many(&self, ids: &[TodoId]) -> Result<(), ApiError> {
        let previous = self.apply(|snapshot| {
            let previous = snapshot.clone();
            snapshot.retain(|todo| !ids.contains(&todo.id));
            previous
        });

        match self.gateway.delete_batch(ids).await {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(count = ids.len(), %err, "Batch delete rejected; restoring snapshot");
                self.apply(|snapshot| *snapshot = previous);
                Err(err)
            }
        }
    }

    /// Record a finished pomodoro on a task and reconcile the returned row.
    /// The call itself is retried with backoff by the gateway.
    pub async fn increment_pomodoro(&self, id: TodoId) -> Result<Todo, ApiError> {
        let updated = self.gateway.increment_pomodoro(id).await?;
        self.apply(|snapshot| replace_row(snapshot, &updated));
        Ok(updated)
    }
}

/// Replace the row matching `todo.id`, if the snapshot still has one.
fn replace_row(snapshot: &mut [Todo], todo: &Todo) {
    if let Some(row) = snapshot.iter_mut().find(|row| row.id == todo.id) {
        *row = todo.clone();
    }
}
