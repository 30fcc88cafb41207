//! Inter-process communication between focusdeck and focusdeckctl
//!
//! Messages are newline-delimited JSON over a Unix domain socket. The
//! domain types live here too so both ends agree on the wire shape.

mod model;

pub use model::{
    is_provisional, BoardColumn, FocusStatus, PeriodStats, Quadrant, StatsReport, Task,
    TaskDraft, TaskEdit, TaskId, TaskStatus,
};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Commands that focusdeckctl can send to focusdeck
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    Add(TaskDraft),
    Edit { id: TaskId, edit: TaskEdit },
    Focus { id: TaskId },
    /// Pauses the given task, or the focused one.
    Pause { id: Option<TaskId> },
    /// Completes the given task, or the focused one.
    Complete { id: Option<TaskId> },
    Delete { id: TaskId },
    List { quadrant: Option<Quadrant> },
    Board,
    Status,
    Stats,
    Recent { limit: usize },
    History { date: NaiveDate },
    ActiveDays { year: i32, month: u32 },
    Reconcile,
    Memo,
    /// Replaces the scratch note.
    SetMemo { text: String },
    /// Streams `Response::Tick` once per second until the client hangs up.
    Watch,
}

/// Responses from focusdeck back to focusdeckctl
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    Ok,
    Task(Task),
    Tasks(Vec<Task>),
    Board(Vec<BoardColumn>),
    Status(FocusStatus),
    Stats(StatsReport),
    Days(Vec<NaiveDate>),
    Reconciled(usize),
    Memo(String),
    /// The command was refused and nothing changed.
    Rejected(String),
    Error(String),
    Tick(FocusStatus),
}

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Connection closed by peer")]
    Closed,
}

pub const SOCKET_NAME: &str = "focusdeck.sock";

/// How many completions `Recent` shows when no limit is given.
pub const DEFAULT_RECENT_LIMIT: usize = 5;

/// `$XDG_RUNTIME_DIR/focusdeck.sock`, falling back to `/tmp`.
pub fn default_socket_path() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(SOCKET_NAME)
}

/// Writes one message followed by a newline.
pub async fn write_message<W, T>(writer: &mut W, message: &T) -> Result<(), IpcError>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut buf = serde_json::to_vec(message)?;
    buf.push(b'\n');
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one newline-terminated message.
pub async fn read_message<R, T>(reader: &mut R) -> Result<T, IpcError>
where
    R: AsyncBufRead + Unpin,
    T: DeserializeOwned,
{
    let mut line = String::new();
    if reader.read_line(&mut line).await? == 0 {
        return Err(IpcError::Closed);
    }
    Ok(serde_json::from_str(line.trim_end())?)
}

/// `HH:MM:SS`; hours are not wrapped at 24.
pub fn format_duration(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    format!("{h:02}:{m:02}:{s:02}")
}

/// Hours with one decimal, e.g. `1.5`.
pub fn format_hours(seconds: u64) -> String {
    format!("{:.1}", seconds as f64 / 3600.0)
}
