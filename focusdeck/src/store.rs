//! Canonical in-memory task collection for the session.
//!
//! Every mutation is applied here first and then queued for the remote
//! store; callers never wait on the network. Sync outcomes flow back through
//! [`TaskStore::apply_sync`].

use crate::persistence::Snapshot;
use crate::remote::{NewTaskRow, RemoteError, RowStore, TaskPatch};
use crate::sync::{SyncEvent, WriteOp};
use chrono::{DateTime, Utc};
use focusdeck_ipc::{is_provisional, Task, TaskDraft, TaskId, TaskStatus};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

/// Where the collection came from at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Startup {
    /// Loaded from the remote; `replayed` unsynced local tasks were laid on top.
    Remote { loaded: usize, replayed: usize },
    /// The remote was unreachable and the snapshot was used instead.
    Snapshot { restored: usize },
    /// The remote was unreachable and there was no snapshot.
    Empty,
}

pub struct TaskStore {
    tasks: Vec<Task>,
    dirty: BTreeSet<TaskId>,
    /// Removed locally, delete not yet confirmed.
    deleted: BTreeSet<TaskId>,
    /// Writes handed to the queue that have not reported back.
    pending: HashMap<TaskId, usize>,
    next_provisional: TaskId,
    remote: Arc<dyn RowStore>,
    writes: UnboundedSender<WriteOp>,
}

fn newest_first(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
}

impl TaskStore {
    pub fn new(remote: Arc<dyn RowStore>, writes: UnboundedSender<WriteOp>) -> Self {
        Self {
            tasks: Vec::new(),
            dirty: BTreeSet::new(),
            deleted: BTreeSet::new(),
            pending: HashMap::new(),
            next_provisional: -1,
            remote,
            writes,
        }
    }

    /// Replaces the collection with the remote table, newest first.
    pub async fn load(&mut self) -> Result<&[Task], RemoteError> {
        let mut tasks = self.remote.fetch_all().await?;
        newest_first(&mut tasks);
        info!(count = tasks.len(), "loaded tasks from remote");
        self.tasks = tasks;
        self.dirty.clear();
        self.next_provisional = -1;
        Ok(&self.tasks)
    }

    /// Seeds the collection from a local snapshot when the remote is down.
    /// Tasks that never got a server id are always treated as dirty.
    pub fn restore(&mut self, mut tasks: Vec<Task>, dirty: Vec<TaskId>) {
        newest_first(&mut tasks);
        self.dirty = dirty
            .into_iter()
            .chain(tasks.iter().map(|t| t.id).filter(|id| is_provisional(*id)))
            .filter(|id| tasks.iter().any(|t| t.id == *id))
            .collect();
        info!(count = tasks.len(), dirty = self.dirty.len(), "restored tasks from snapshot");
        self.tasks = tasks;
        self.continue_provisional_ids();
    }

    /// Startup: load from the remote and lay the snapshot's unsynced work
    /// over it, or fall back to the snapshot alone. Unsynced tasks are
    /// queued again before returning.
    pub async fn bootstrap(&mut self, snapshot: Option<Snapshot>) -> Startup {
        let startup = match self.load().await.map(|tasks| tasks.len()) {
            Ok(loaded) => {
                let replayed = snapshot.map_or(0, |snapshot| self.overlay(snapshot));
                Startup::Remote { loaded, replayed }
            }
            Err(e) => {
                warn!(error = %e, "remote unreachable; falling back to local snapshot");
                match snapshot {
                    Some(snapshot) => {
                        let restored = snapshot.tasks.len();
                        self.restore(snapshot.tasks, snapshot.dirty);
                        self.deleted.extend(snapshot.deleted);
                        Startup::Snapshot { restored }
                    }
                    None => {
                        info!("no local snapshot; starting empty");
                        Startup::Empty
                    }
                }
            }
        };
        self.reconcile();
        startup
    }

    /// Replaces loaded rows with the snapshot's unsynced copies and replays
    /// deletes the remote never saw. Returns how many tasks were replayed.
    fn overlay(&mut self, snapshot: Snapshot) -> usize {
        let unsynced: BTreeSet<TaskId> = snapshot.dirty.into_iter().collect();
        let mut replayed = 0;
        for task in snapshot.tasks {
            let id = task.id;
            if !is_provisional(id) && !unsynced.contains(&id) {
                continue;
            }
            match self.tasks.iter_mut().find(|t| t.id == id) {
                Some(existing) => *existing = task,
                None => self.tasks.push(task),
            }
            self.dirty.insert(id);
            replayed += 1;
        }
        newest_first(&mut self.tasks);
        self.continue_provisional_ids();

        for id in snapshot.deleted {
            if self.remove(id).is_some() {
                replayed += 1;
            }
        }
        if replayed > 0 {
            info!(replayed, "replaying unsynced work from snapshot");
        }
        replayed
    }

    fn continue_provisional_ids(&mut self) {
        let lowest = self.tasks.iter().map(|t| t.id).min().unwrap_or(0);
        self.next_provisional = lowest.min(0) - 1;
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    pub fn focused(&self) -> Option<&Task> {
        self.tasks.iter().find(|t| t.is_focused())
    }

    /// Ids whose remote copy is known to be stale.
    pub fn dirty(&self) -> &BTreeSet<TaskId> {
        &self.dirty
    }

    /// Dirty tasks plus tasks with writes still in the queue. This is what
    /// must be pushed again if the session ends now.
    pub fn unsynced(&self) -> BTreeSet<TaskId> {
        let in_flight = self
            .pending
            .iter()
            .filter(|(id, count)| **count > 0 && self.get(**id).is_some())
            .map(|(id, _)| *id);
        self.dirty.iter().copied().chain(in_flight).collect()
    }

    /// Ids removed locally whose remote delete has not been confirmed.
    pub fn deleted(&self) -> &BTreeSet<TaskId> {
        &self.deleted
    }

    pub fn insert(&mut self, draft: TaskDraft, now: DateTime<Utc>) -> Task {
        let id = self.next_provisional;
        self.next_provisional -= 1;

        let task = Task {
            id,
            title: draft.title,
            description: draft.description,
            tags: draft.tags,
            quadrant: draft.quadrant,
            status: TaskStatus::Todo,
            created_at: now,
            start_time: None,
            completed_at: None,
            duration_seconds: 0,
        };
        self.tasks.insert(0, task.clone());
        self.enqueue(WriteOp::Insert {
            provisional_id: id,
            row: NewTaskRow::from(&task),
        });
        task
    }

    /// Applies `patch` locally and queues it. Returns the updated task.
    pub fn update(&mut self, id: TaskId, patch: TaskPatch) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        patch.apply(task);
        let updated = task.clone();
        if !patch.is_empty() {
            self.enqueue(WriteOp::Update { id, patch });
        }
        Some(updated)
    }

    pub fn remove(&mut self, id: TaskId) -> Option<Task> {
        let index = self.tasks.iter().position(|t| t.id == id)?;
        let task = self.tasks.remove(index);
        self.dirty.remove(&id);
        self.deleted.insert(id);
        self.enqueue(WriteOp::Delete { id });
        Some(task)
    }

    pub fn apply_sync(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Inserted { provisional_id, row } => {
                self.settle(provisional_id);
                // Writes queued against the provisional id report the server id.
                if let Some(count) = self.pending.remove(&provisional_id) {
                    *self.pending.entry(row.id).or_default() += count;
                }
                if self.deleted.remove(&provisional_id) {
                    self.deleted.insert(row.id);
                }
                // Deleted before the insert confirmed; the queued delete follows.
                let Some(task) = self.tasks.iter_mut().find(|t| t.id == provisional_id) else {
                    return;
                };
                debug!(provisional_id, id = row.id, "provisional id confirmed");
                task.id = row.id;
                task.created_at = row.created_at;
                // The insert carried the whole row as of when it was queued.
                self.dirty.remove(&provisional_id);
            }
            SyncEvent::Synced { id, full } => {
                self.settle(id);
                if full {
                    self.dirty.remove(&id);
                    // Only the last queued write for a removed task is its delete.
                    if self.get(id).is_none() && !self.pending.contains_key(&id) {
                        self.deleted.remove(&id);
                    }
                }
            }
            SyncEvent::Failed { id, reason } => {
                self.settle(id);
                if self.get(id).is_some() {
                    warn!(id, reason = %reason, "task diverged from remote");
                    self.dirty.insert(id);
                } else if self.deleted.contains(&id) {
                    warn!(id, reason = %reason, "delete did not reach remote; will retry");
                }
            }
        }
    }

    fn settle(&mut self, id: TaskId) {
        if let Some(count) = self.pending.get_mut(&id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.pending.remove(&id);
            }
        }
    }

    /// Re-pushes every dirty task in full and retries unconfirmed deletes.
    /// Returns how many writes were queued.
    pub fn reconcile(&mut self) -> usize {
        let dirty = std::mem::take(&mut self.dirty);
        let mut queued = 0;
        for id in dirty {
            let Some(task) = self.get(id) else {
                continue;
            };
            let op = if is_provisional(id) {
                WriteOp::Insert {
                    provisional_id: id,
                    row: NewTaskRow::from(task),
                }
            } else {
                WriteOp::Update {
                    id,
                    patch: TaskPatch::full(task),
                }
            };
            self.enqueue(op);
            queued += 1;
        }

        let stalled: Vec<TaskId> = self
            .deleted
            .iter()
            .copied()
            .filter(|id| !self.pending.contains_key(id))
            .collect();
        for id in stalled {
            self.enqueue(WriteOp::Delete { id });
            queued += 1;
        }

        if queued > 0 {
            info!(queued, "reconciling dirty tasks");
        }
        queued
    }

    fn enqueue(&mut self, op: WriteOp) {
        let id = op.target();
        if self.writes.send(op).is_err() {
            warn!(id, "write queue closed; task marked dirty");
            if self.get(id).is_some() {
                self.dirty.insert(id);
            }
            return;
        }
        *self.pending.entry(id).or_default() += 1;
    }
}
