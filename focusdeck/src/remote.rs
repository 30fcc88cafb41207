//! The remote row-store holding the durable copy of the task table.
//!
//! Only four operations are needed: fetch everything newest first, insert
//! one row, patch one row by id and delete one row by id. [`RestStore`]
//! talks to a PostgREST endpoint; [`MemoryStore`] keeps rows in process for
//! offline sessions and tests.

mod memory;
mod rest;

pub use memory::MemoryStore;
pub use rest::RestStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use focusdeck_ipc::{Quadrant, Task, TaskId, TaskStatus};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("remote returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("row {0} not found")]
    NotFound(TaskId),

    #[error("remote unavailable: {0}")]
    Unavailable(String),

    #[error("invalid remote configuration: {0}")]
    Config(String),
}

impl RemoteError {
    /// Whether retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Http(e) => !e.is_builder() && !e.is_decode(),
            RemoteError::Status { status, .. } => matches!(status, 408 | 429 | 500..=599),
            RemoteError::Unavailable(_) => true,
            RemoteError::Decode(_) | RemoteError::NotFound(_) | RemoteError::Config(_) => false,
        }
    }
}

/// Columns sent on insert. The server assigns `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewTaskRow {
    pub title: String,
    pub description: Option<String>,
    pub tags: Option<String>,
    pub quadrant: Quadrant,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub start_time: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: u64,
}

impl From<&Task> for NewTaskRow {
    fn from(task: &Task) -> Self {
        Self {
            title: task.title.clone(),
            description: task.description.clone(),
            tags: task.tags.clone(),
            quadrant: task.quadrant,
            status: task.status,
            created_at: task.created_at,
            start_time: task.start_time,
            completed_at: task.completed_at,
            duration_seconds: task.duration_seconds,
        }
    }
}

/// A partial update. Outer `None` leaves a column alone; `Some(None)` on a
/// nullable column writes `null`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quadrant: Option<Quadrant>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<u64>,
}

impl TaskPatch {
    /// Every mutable column, used to re-push a task that drifted.
    pub fn full(task: &Task) -> Self {
        Self {
            title: Some(task.title.clone()),
            description: Some(task.description.clone()),
            tags: Some(task.tags.clone()),
            quadrant: Some(task.quadrant),
            status: Some(task.status),
            start_time: Some(task.start_time),
            completed_at: Some(task.completed_at),
            duration_seconds: Some(task.duration_seconds),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// True when every column is set, so applying it overwrites the whole row.
    pub fn is_full(&self) -> bool {
        self.title.is_some()
            && self.description.is_some()
            && self.tags.is_some()
            && self.quadrant.is_some()
            && self.status.is_some()
            && self.start_time.is_some()
            && self.completed_at.is_some()
            && self.duration_seconds.is_some()
    }

    pub fn apply(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(tags) = &self.tags {
            task.tags = tags.clone();
        }
        if let Some(quadrant) = self.quadrant {
            task.quadrant = quadrant;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(start_time) = self.start_time {
            task.start_time = start_time;
        }
        if let Some(completed_at) = self.completed_at {
            task.completed_at = completed_at;
        }
        if let Some(duration) = self.duration_seconds {
            task.duration_seconds = duration;
        }
    }
}

#[async_trait]
pub trait RowStore: Send + Sync {
    /// All rows, ordered by `created_at` descending.
    async fn fetch_all(&self) -> Result<Vec<Task>, RemoteError>;

    /// Inserts one row and returns it as stored, with its assigned id.
    async fn insert(&self, row: &NewTaskRow) -> Result<Task, RemoteError>;

    async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<(), RemoteError>;

    async fn delete(&self, id: TaskId) -> Result<(), RemoteError>;
}
