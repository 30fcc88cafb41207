//! Domain types shared by the daemon and its clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Row identifier. Server ids are positive; ids handed out before the
/// remote insert confirms are negative.
pub type TaskId = i64;

pub fn is_provisional(id: TaskId) -> bool {
    id < 0
}

/// Eisenhower quadrant a task is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Quadrant {
    UrgentImportant = 1,
    Important = 2,
    Urgent = 3,
    Neither = 4,
}

impl Quadrant {
    pub const ALL: [Quadrant; 4] = [
        Quadrant::UrgentImportant,
        Quadrant::Important,
        Quadrant::Urgent,
        Quadrant::Neither,
    ];

    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Quadrant::UrgentImportant => "Urgent & Important",
            Quadrant::Important => "Important, Not Urgent",
            Quadrant::Urgent => "Urgent, Not Important",
            Quadrant::Neither => "Neither",
        }
    }
}

impl TryFrom<u8> for Quadrant {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Quadrant::UrgentImportant),
            2 => Ok(Quadrant::Important),
            3 => Ok(Quadrant::Urgent),
            4 => Ok(Quadrant::Neither),
            other => Err(format!("quadrant must be 1-4, got {other}")),
        }
    }
}

impl From<Quadrant> for u8 {
    fn from(q: Quadrant) -> Self {
        q.number()
    }
}

impl fmt::Display for Quadrant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Q{} {}", self.number(), self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    /// Stored as `in_basket` in the tasks table.
    #[serde(rename = "in_basket", alias = "focused")]
    Focused,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    pub quadrant: Quadrant,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "null_as_zero")]
    pub duration_seconds: u64,
}

impl Task {
    pub fn is_focused(&self) -> bool {
        self.status == TaskStatus::Focused
    }

    pub fn is_done(&self) -> bool {
        self.status == TaskStatus::Done
    }

    /// Labels from the comma-delimited `tags` column, trimmed, empties dropped.
    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .as_deref()
            .map(|tags| {
                tags.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn null_as_zero<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<u64>::deserialize(deserializer)?.unwrap_or(0))
}

/// User input for a new task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDraft {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    pub quadrant: Quadrant,
}

impl TaskDraft {
    pub fn new(title: impl Into<String>, quadrant: Quadrant) -> Self {
        Self {
            title: title.into(),
            description: None,
            tags: None,
            quadrant,
        }
    }
}

/// User edit of the non-lifecycle fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskEdit {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub quadrant: Option<Quadrant>,
}

/// The focused task, if any, with its live elapsed value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FocusStatus {
    pub task: Option<Task>,
    pub elapsed_seconds: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodStats {
    pub count: usize,
    pub duration_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsReport {
    pub today: PeriodStats,
    pub week: PeriodStats,
    /// Fraction of the daily goal reached, in `[0, 1]`.
    pub daily_progress: f64,
    pub daily_goal_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoardColumn {
    pub quadrant: Quadrant,
    pub tasks: Vec<Task>,
}
