//! Local snapshot of the session, used when the remote store cannot be
//! reached at startup.

use crate::app::App;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use directories::ProjectDirs;
use focusdeck_ipc::{is_provisional, Task, TaskId};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub saved_at: DateTime<Utc>,
    pub tasks: Vec<Task>,
    /// Tasks whose latest state may not have reached the remote.
    #[serde(default)]
    pub dirty: Vec<TaskId>,
    /// Tasks removed locally whose delete was not confirmed.
    #[serde(default)]
    pub deleted: Vec<TaskId>,
    #[serde(default)]
    pub memo: String,
}

impl Snapshot {
    pub fn capture(app: &App) -> Self {
        let store = app.store();
        Self {
            saved_at: app.now(),
            tasks: store.tasks().to_vec(),
            dirty: store.unsynced().into_iter().collect(),
            deleted: store.deleted().iter().copied().collect(),
            memo: app.memo().to_string(),
        }
    }

    /// Tasks that already have a server id.
    pub fn confirmed_rows(&self) -> Vec<Task> {
        self.tasks
            .iter()
            .filter(|t| !is_provisional(t.id))
            .cloned()
            .collect()
    }
}

pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("dev", "focusdeck", "focusdeck")
            .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
        Ok(Self::at(proj_dirs.data_dir().join("state.json")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, snapshot: &Snapshot) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create data directory {:?}", dir))?;
        }
        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).with_context(|| format!("Failed to write {:?}", tmp))?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace snapshot at {:?}", self.path))?;
        Ok(())
    }

    pub fn load(&self) -> Result<Option<Snapshot>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read snapshot at {:?}", self.path))?;
        let snapshot = serde_json::from_str(&json)
            .with_context(|| format!("Failed to parse snapshot at {:?}", self.path))?;
        Ok(Some(snapshot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_app;
    use crate::sync::SyncEvent;
    use focusdeck_ipc::{Quadrant, TaskDraft};

    #[test]
    fn missing_snapshot_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::at(dir.path().join("state.json"));
        assert!(persistence.load().unwrap().is_none());
    }

    #[test]
    fn round_trips_tasks_and_unsynced_work() {
        let dir = tempfile::tempdir().unwrap();
        let persistence = Persistence::at(dir.path().join("nested").join("state.json"));

        let (mut app, _clock, _rx) = test_app();
        let task = app.add_task(TaskDraft::new("offline", Quadrant::Urgent)).unwrap();
        let gone = app.add_task(TaskDraft::new("gone", Quadrant::Neither)).unwrap();
        app.store_mut().apply_sync(SyncEvent::Failed { id: task.id, reason: "down".into() });
        app.delete(gone.id).unwrap();
        app.set_memo("call the plumber".into());

        persistence.save(&Snapshot::capture(&app)).unwrap();
        let snapshot = persistence.load().unwrap().unwrap();
        assert_eq!(snapshot.saved_at, app.now());
        assert_eq!(snapshot.tasks, vec![task.clone()]);
        assert_eq!(snapshot.dirty, vec![task.id]);
        assert_eq!(snapshot.deleted, vec![gone.id]);
        assert_eq!(snapshot.memo, "call the plumber");
        assert!(snapshot.confirmed_rows().is_empty());
    }

    #[test]
    fn queued_writes_are_saved_as_dirty() {
        let (mut app, _clock, _rx) = test_app();
        let task = app.add_task(TaskDraft::new("still queued", Quadrant::Important)).unwrap();
        assert!(app.store().dirty().is_empty());
        assert_eq!(Snapshot::capture(&app).dirty, vec![task.id]);
    }

    #[test]
    fn older_snapshots_without_new_fields_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, r#"{"saved_at":"2024-03-15T09:00:00Z","tasks":[]}"#).unwrap();
        let snapshot = Persistence::at(path).load().unwrap().unwrap();
        assert!(snapshot.deleted.is_empty());
        assert!(snapshot.memo.is_empty());
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(Persistence::at(path).load().is_err());
    }
}
