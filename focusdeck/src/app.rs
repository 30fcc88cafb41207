use crate::clock::Clock;
use crate::error::FocusError;
use crate::remote::TaskPatch;
use crate::store::TaskStore;
use chrono::{DateTime, Utc};
use focusdeck_ipc::{FocusStatus, Task, TaskDraft, TaskEdit, TaskId, TaskStatus};
use std::sync::Arc;
use tracing::info;

/// Drives tasks through todo -> focused -> todo/done and keeps at most one
/// task in focus.
pub struct App {
    store: TaskStore,
    clock: Arc<dyn Clock>,
    /// Free-form scratch note kept alongside the tasks.
    memo: String,
}

/// Whole seconds between `start` and `now`, never negative.
fn session_seconds(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
    start
        .map(|start| (now - start).num_seconds().max(0) as u64)
        .unwrap_or(0)
}

fn validate_title(title: &str) -> Result<String, FocusError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(FocusError::InvalidInput("title must not be empty".into()));
    }
    Ok(title.to_string())
}

impl App {
    pub fn new(store: TaskStore, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            memo: String::new(),
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut TaskStore {
        &mut self.store
    }

    pub fn tasks(&self) -> &[Task] {
        self.store.tasks()
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn task(&self, id: TaskId) -> Result<&Task, FocusError> {
        self.store.get(id).ok_or(FocusError::NotFound(id))
    }

    fn write(&mut self, id: TaskId, patch: TaskPatch) -> Result<Task, FocusError> {
        self.store.update(id, patch).ok_or(FocusError::NotFound(id))
    }

    pub fn add_task(&mut self, mut draft: TaskDraft) -> Result<Task, FocusError> {
        draft.title = validate_title(&draft.title)?;
        let task = self.store.insert(draft, self.clock.now());
        info!(id = task.id, quadrant = task.quadrant.number(), "task added");
        Ok(task)
    }

    /// Edits title, description, tags or quadrant. Lifecycle fields are untouched.
    pub fn edit_task(&mut self, id: TaskId, edit: TaskEdit) -> Result<Task, FocusError> {
        self.task(id)?;
        let title = edit.title.as_deref().map(validate_title).transpose()?;
        let patch = TaskPatch {
            title,
            description: edit.description.map(|d| Some(d).filter(|d| !d.trim().is_empty())),
            tags: edit.tags.map(|t| Some(t).filter(|t| !t.trim().is_empty())),
            quadrant: edit.quadrant,
            ..Default::default()
        };
        self.write(id, patch)
    }

    pub fn start_focus(&mut self, id: TaskId) -> Result<Task, FocusError> {
        if let Some(active) = self.store.focused() {
            return Err(FocusError::AlreadyFocused {
                id: active.id,
                title: active.title.clone(),
            });
        }
        if self.task(id)?.is_done() {
            return Err(FocusError::AlreadyDone(id));
        }

        let task = self.write(
            id,
            TaskPatch {
                status: Some(TaskStatus::Focused),
                start_time: Some(Some(self.clock.now())),
                ..Default::default()
            },
        )?;
        info!(id, "focus started");
        Ok(task)
    }

    pub fn pause(&mut self, id: TaskId) -> Result<Task, FocusError> {
        let task = self.task(id)?;
        if task.status != TaskStatus::Focused {
            return Err(FocusError::NotFocused(id));
        }
        let session = session_seconds(task.start_time, self.clock.now());
        let total = task.duration_seconds + session;

        let task = self.write(
            id,
            TaskPatch {
                status: Some(TaskStatus::Todo),
                start_time: Some(None),
                duration_seconds: Some(total),
                ..Default::default()
            },
        )?;
        info!(id, session, total, "focus paused");
        Ok(task)
    }

    /// Finishes a task. Works from `todo` too, adding no time.
    pub fn complete(&mut self, id: TaskId) -> Result<Task, FocusError> {
        let task = self.task(id)?;
        if task.is_done() {
            return Err(FocusError::AlreadyDone(id));
        }
        let now = self.clock.now();
        let session = session_seconds(task.start_time, now);
        let total = task.duration_seconds + session;

        let task = self.write(
            id,
            TaskPatch {
                status: Some(TaskStatus::Done),
                start_time: Some(None),
                completed_at: Some(Some(now)),
                duration_seconds: Some(total),
                ..Default::default()
            },
        )?;
        info!(id, session, total, "task completed");
        Ok(task)
    }

    pub fn delete(&mut self, id: TaskId) -> Result<Task, FocusError> {
        let task = self.store.remove(id).ok_or(FocusError::NotFound(id))?;
        info!(id, "task deleted");
        Ok(task)
    }

    pub fn focused_id(&self) -> Result<TaskId, FocusError> {
        self.store
            .focused()
            .map(|t| t.id)
            .ok_or(FocusError::NothingFocused)
    }

    /// Accumulated plus running time of the focused task.
    pub fn elapsed_display(&self) -> Option<u64> {
        let task = self.store.focused()?;
        Some(task.duration_seconds + session_seconds(task.start_time, self.clock.now()))
    }

    pub fn memo(&self) -> &str {
        &self.memo
    }

    pub fn set_memo(&mut self, memo: String) {
        self.memo = memo;
    }

    pub fn focus_status(&self) -> FocusStatus {
        FocusStatus {
            task: self.store.focused().cloned(),
            elapsed_seconds: self.elapsed_display().unwrap_or(0),
        }
    }
}
