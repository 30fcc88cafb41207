use super::{NewTaskRow, RemoteError, RowStore, TaskPatch};
use async_trait::async_trait;
use focusdeck_ipc::{Task, TaskId};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    rows: Vec<Task>,
    next_id: TaskId,
    failures_left: usize,
}

/// Rows kept in process. Ids are assigned sequentially from 1.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<Task>) -> Self {
        let next_id = rows.iter().map(|t| t.id).max().unwrap_or(0);
        Self {
            state: Mutex::new(State {
                rows,
                next_id,
                failures_left: 0,
            }),
        }
    }

    /// The next `count` calls fail with [`RemoteError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.lock().failures_left = count;
    }

    pub fn rows(&self) -> Vec<Task> {
        self.lock().rows.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Result<MutexGuard<'_, State>, RemoteError> {
        let mut state = self.lock();
        if state.failures_left > 0 {
            state.failures_left -= 1;
            return Err(RemoteError::Unavailable("injected failure".into()));
        }
        Ok(state)
    }
}

#[async_trait]
impl RowStore for MemoryStore {
    async fn fetch_all(&self) -> Result<Vec<Task>, RemoteError> {
        let mut rows = self.begin()?.rows.clone();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn insert(&self, row: &NewTaskRow) -> Result<Task, RemoteError> {
        let mut state = self.begin()?;
        state.next_id += 1;
        let task = Task {
            id: state.next_id,
            title: row.title.clone(),
            description: row.description.clone(),
            tags: row.tags.clone(),
            quadrant: row.quadrant,
            status: row.status,
            created_at: row.created_at,
            start_time: row.start_time,
            completed_at: row.completed_at,
            duration_seconds: row.duration_seconds,
        };
        state.rows.push(task.clone());
        Ok(task)
    }

    async fn update(&self, id: TaskId, patch: &TaskPatch) -> Result<(), RemoteError> {
        let mut state = self.begin()?;
        let row = state
            .rows
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or(RemoteError::NotFound(id))?;
        patch.apply(row);
        Ok(())
    }

    async fn delete(&self, id: TaskId) -> Result<(), RemoteError> {
        let mut state = self.begin()?;
        let before = state.rows.len();
        state.rows.retain(|t| t.id != id);
        if state.rows.len() == before {
            return Err(RemoteError::NotFound(id));
        }
        Ok(())
    }
}
