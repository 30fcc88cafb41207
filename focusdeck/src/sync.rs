//! Outbound write queue.
//!
//! The task store applies every change locally and pushes a [`WriteOp`] on
//! an unbounded channel. A single [`SyncWorker`] drains the channel in
//! order, retrying transient failures with exponential backoff, and reports
//! each outcome back as a [`SyncEvent`] so the store can swap provisional
//! ids and track which tasks have drifted from the remote copy.

use crate::remote::{NewTaskRow, RemoteError, RowStore, TaskPatch};
use focusdeck_ipc::{is_provisional, Task, TaskId};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Insert { provisional_id: TaskId, row: NewTaskRow },
    Update { id: TaskId, patch: TaskPatch },
    Delete { id: TaskId },
}

impl WriteOp {
    pub fn target(&self) -> TaskId {
        match self {
            WriteOp::Insert { provisional_id, .. } => *provisional_id,
            WriteOp::Update { id, .. } | WriteOp::Delete { id } => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// The remote accepted an insert; `row` carries the assigned id.
    Inserted { provisional_id: TaskId, row: Task },
    /// The write landed. `full` is set when it replaced the whole row (or
    /// removed it), which is the only outcome that clears a dirty task.
    Synced { id: TaskId, full: bool },
    /// The write was given up on. The task's remote copy is stale.
    Failed { id: TaskId, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based).
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }
}

async fn with_retry<T, F, Fut>(policy: &RetryPolicy, op: &str, mut call: F) -> Result<T, RemoteError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RemoteError>>,
{
    let mut attempt = 1;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(op, attempt, error = %e, delay_ms = delay.as_millis() as u64, "remote write failed, retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

pub struct SyncWorker {
    remote: Arc<dyn RowStore>,
    policy: RetryPolicy,
    confirmed_ids: HashMap<TaskId, TaskId>,
    events: UnboundedSender<SyncEvent>,
}

impl SyncWorker {
    pub fn new(
        remote: Arc<dyn RowStore>,
        policy: RetryPolicy,
        events: UnboundedSender<SyncEvent>,
    ) -> Self {
        Self {
            remote,
            policy,
            confirmed_ids: HashMap::new(),
            events,
        }
    }

    pub async fn run(mut self, mut ops: UnboundedReceiver<WriteOp>) {
        info!("sync worker started");
        while let Some(op) = ops.recv().await {
            let event = self.process(op).await;
            if self.events.send(event).is_err() {
                break;
            }
        }
        info!("sync worker stopped");
    }

    /// Server id for `id`, following a confirmed provisional insert.
    fn resolve(&self, id: TaskId) -> Option<TaskId> {
        if is_provisional(id) {
            self.confirmed_ids.get(&id).copied()
        } else {
            Some(id)
        }
    }

    pub async fn process(&mut self, op: WriteOp) -> SyncEvent {
        debug!(target_id = op.target(), "processing write");
        let remote = Arc::clone(&self.remote);
        match op {
            WriteOp::Insert { provisional_id, row } => {
                match with_retry(&self.policy, "insert", || remote.insert(&row)).await {
                    Ok(stored) => {
                        self.confirmed_ids.insert(provisional_id, stored.id);
                        info!(provisional_id, id = stored.id, "task inserted");
                        SyncEvent::Inserted {
                            provisional_id,
                            row: stored,
                        }
                    }
                    Err(e) => failed(provisional_id, "insert", e),
                }
            }
            WriteOp::Update { id, patch } => {
                let Some(server_id) = self.resolve(id) else {
                    return unconfirmed(id, "update");
                };
                match with_retry(&self.policy, "update", || remote.update(server_id, &patch)).await
                {
                    Ok(()) => SyncEvent::Synced {
                        id: server_id,
                        full: patch.is_full(),
                    },
                    Err(e) => failed(server_id, "update", e),
                }
            }
            WriteOp::Delete { id } => {
                // Never reached the remote, so there is nothing to delete.
                let Some(server_id) = self.resolve(id) else {
                    return SyncEvent::Synced { id, full: true };
                };
                match with_retry(&self.policy, "delete", || remote.delete(server_id)).await {
                    Ok(()) | Err(RemoteError::NotFound(_)) => SyncEvent::Synced {
                        id: server_id,
                        full: true,
                    },
                    Err(e) => failed(server_id, "delete", e),
                }
            }
        }
    }
}

fn failed(id: TaskId, op: &str, error: RemoteError) -> SyncEvent {
    warn!(id, op, error = %error, "giving up on remote write; task marked dirty");
    SyncEvent::Failed {
        id,
        reason: error.to_string(),
    }
}

fn unconfirmed(id: TaskId, op: &str) -> SyncEvent {
    warn!(id, op, "insert for this task was never confirmed; task marked dirty");
    SyncEvent::Failed {
        id,
        reason: "task has not been inserted remotely".into(),
    }
}
