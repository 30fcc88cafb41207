//! Unix domain socket server for IPC

use crate::app::App;
use crate::error::FocusError;
use crate::stats;
use anyhow::{Context, Result};
use chrono::{Local, Weekday};
use focusdeck_ipc::{
    read_message, write_message, BoardColumn, Command, FocusStatus, IpcError, Quadrant, Response,
    Task,
};
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// Reporting knobs that come from configuration.
#[derive(Debug, Clone, Copy)]
pub struct ReportSettings {
    pub daily_goal_seconds: u64,
    pub week_start: Weekday,
}

pub fn bind(path: &Path) -> Result<UnixListener> {
    // Remove old socket if it exists
    let _ = std::fs::remove_file(path);
    let listener =
        UnixListener::bind(path).with_context(|| format!("Failed to bind socket {:?}", path))?;
    info!(path = %path.display(), "IPC server listening");
    Ok(listener)
}

pub async fn serve(
    listener: UnixListener,
    app: Arc<Mutex<App>>,
    ticks: watch::Receiver<FocusStatus>,
    settings: ReportSettings,
) -> Result<()> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                let app = app.clone();
                let ticks = ticks.clone();
                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, app, ticks, settings).await {
                        error!("Error handling client: {}", e);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {}", e);
            }
        }
    }
}

async fn handle_client(
    stream: UnixStream,
    app: Arc<Mutex<App>>,
    mut ticks: watch::Receiver<FocusStatus>,
    settings: ReportSettings,
) -> Result<(), IpcError> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    loop {
        let command: Command = match read_message(&mut reader).await {
            Ok(command) => command,
            Err(IpcError::Closed) => return Ok(()),
            Err(IpcError::Serialization(e)) => {
                warn!(error = %e, "malformed command");
                write_message(&mut writer, &Response::Error(format!("malformed command: {e}")))
                    .await?;
                continue;
            }
            Err(e) => return Err(e),
        };
        debug!(?command, "received command");

        if command == Command::Watch {
            return stream_ticks(&mut reader, &mut writer, &mut ticks).await;
        }

        let response = {
            let mut app = app.lock().await;
            dispatch(&mut app, command, settings)
        };
        write_message(&mut writer, &response).await?;
    }
}

/// Sends a tick whenever the status changes until the watcher hangs up.
/// Input on a watch connection is ignored; end of stream ends the watch.
async fn stream_ticks<R, W>(
    reader: &mut R,
    writer: &mut W,
    ticks: &mut watch::Receiver<FocusStatus>,
) -> Result<(), IpcError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut discard = [0u8; 256];
    ticks.mark_changed();
    loop {
        tokio::select! {
            changed = ticks.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let status = ticks.borrow_and_update().clone();
                if write_message(&mut *writer, &Response::Tick(status)).await.is_err() {
                    return Ok(());
                }
            }
            read = reader.read(&mut discard) => {
                if matches!(read, Ok(0) | Err(_)) {
                    debug!("watcher disconnected");
                    return Ok(());
                }
            }
        }
    }
}

fn rejected(e: FocusError) -> Response {
    info!(reason = %e, "command rejected");
    Response::Rejected(e.to_string())
}

fn from_result(result: Result<Task, FocusError>) -> Response {
    match result {
        Ok(task) => Response::Task(task),
        Err(e) => rejected(e),
    }
}

pub fn dispatch(app: &mut App, command: Command, settings: ReportSettings) -> Response {
    let now = app.now().with_timezone(&Local);
    match command {
        Command::Add(draft) => from_result(app.add_task(draft)),
        Command::Edit { id, edit } => from_result(app.edit_task(id, edit)),
        Command::Focus { id } => from_result(app.start_focus(id)),
        Command::Pause { id } => {
            from_result(id.map_or_else(|| app.focused_id(), Ok).and_then(|id| app.pause(id)))
        }
        Command::Complete { id } => {
            from_result(id.map_or_else(|| app.focused_id(), Ok).and_then(|id| app.complete(id)))
        }
        Command::Delete { id } => match app.delete(id) {
            Ok(_) => Response::Ok,
            Err(e) => rejected(e),
        },
        Command::List { quadrant } => Response::Tasks(
            app.tasks()
                .iter()
                .filter(|t| quadrant.map_or(true, |q| t.quadrant == q))
                .cloned()
                .collect(),
        ),
        Command::Board => Response::Board(
            Quadrant::ALL
                .iter()
                .map(|&quadrant| BoardColumn {
                    quadrant,
                    tasks: stats::by_quadrant(app.tasks(), quadrant).into_iter().cloned().collect(),
                })
                .collect(),
        ),
        Command::Status => Response::Status(app.focus_status()),
        Command::Stats => Response::Stats(stats::report(
            app.tasks(),
            &now,
            settings.week_start,
            settings.daily_goal_seconds,
        )),
        Command::Recent { limit } => Response::Tasks(
            stats::recent_completions(app.tasks(), limit).into_iter().cloned().collect(),
        ),
        Command::History { date } => Response::Tasks(
            stats::completions_on(app.tasks(), date, &Local).into_iter().cloned().collect(),
        ),
        Command::ActiveDays { year, month } => {
            Response::Days(stats::active_days(app.tasks(), year, month, &Local))
        }
        Command::Reconcile => Response::Reconciled(app.store_mut().reconcile()),
        Command::Memo => Response::Memo(app.memo().to_string()),
        Command::SetMemo { text } => {
            app.set_memo(text);
            Response::Ok
        }
        Command::Watch => Response::Error("watch is only available as a stream".into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::tests::test_app;
    use crate::sync::SyncEvent;
    use focusdeck_ipc::{PeriodStats, TaskDraft, TaskStatus};
    use tokio::io::{AsyncWriteExt, BufReader};

    fn settings() -> ReportSettings {
        ReportSettings {
            daily_goal_seconds: 28_800,
            week_start: Weekday::Sun,
        }
    }

    fn add(app: &mut App, title: &str, quadrant: Quadrant) -> i64 {
        match dispatch(app, Command::Add(TaskDraft::new(title, quadrant)), settings()) {
            Response::Task(task) => task.id,
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn rejections_are_reported_not_raised() {
        let (mut app, _clock, _rx) = test_app();
        let a = add(&mut app, "A", Quadrant::UrgentImportant);
        let b = add(&mut app, "B", Quadrant::Urgent);

        assert!(matches!(dispatch(&mut app, Command::Focus { id: a }, settings()), Response::Task(_)));
        match dispatch(&mut app, Command::Focus { id: b }, settings()) {
            Response::Rejected(reason) => assert!(reason.contains("already in focus")),
            other => panic!("unexpected response: {other:?}"),
        }
        let empty = dispatch(&mut app, Command::Add(TaskDraft::new("", Quadrant::Neither)), settings());
        assert!(matches!(empty, Response::Rejected(_)));
    }

    #[test]
    fn pause_and_complete_default_to_focused_task() {
        let (mut app, clock, _rx) = test_app();
        let id = add(&mut app, "Solo", Quadrant::Important);

        assert!(matches!(
            dispatch(&mut app, Command::Pause { id: None }, settings()),
            Response::Rejected(_)
        ));
        dispatch(&mut app, Command::Focus { id }, settings());
        clock.advance(90);
        match dispatch(&mut app, Command::Complete { id: None }, settings()) {
            Response::Task(task) => {
                assert_eq!(task.id, id);
                assert_eq!(task.status, TaskStatus::Done);
                assert_eq!(task.duration_seconds, 90);
            }
            other => panic!("unexpected response: {other:?}"),
        }

        match dispatch(&mut app, Command::Stats, settings()) {
            Response::Stats(report) => {
                assert_eq!(report.today, PeriodStats { count: 1, duration_seconds: 90 });
                assert_eq!(report.week.count, 1);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        match dispatch(&mut app, Command::Recent { limit: 5 }, settings()) {
            Response::Tasks(tasks) => assert_eq!(tasks.len(), 1),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn board_groups_waiting_tasks_by_quadrant() {
        let (mut app, _clock, _rx) = test_app();
        add(&mut app, "fire", Quadrant::UrgentImportant);
        add(&mut app, "plan", Quadrant::Important);
        let focus = add(&mut app, "now", Quadrant::Important);
        dispatch(&mut app, Command::Focus { id: focus }, settings());

        match dispatch(&mut app, Command::Board, settings()) {
            Response::Board(columns) => {
                assert_eq!(columns.len(), 4);
                assert_eq!(columns[0].tasks.len(), 1);
                assert_eq!(columns[1].tasks.len(), 1);
                assert_eq!(columns[1].tasks[0].title, "plan");
                assert!(columns[3].tasks.is_empty());
            }
            other => panic!("unexpected response: {other:?}"),
        }
        match dispatch(&mut app, Command::List { quadrant: Some(Quadrant::Important) }, settings()) {
            Response::Tasks(tasks) => assert_eq!(tasks.len(), 2),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[test]
    fn reconcile_reports_requeued_count() {
        let (mut app, _clock, _rx) = test_app();
        let id = add(&mut app, "flaky", Quadrant::Neither);
        app.store_mut().apply_sync(SyncEvent::Failed { id, reason: "timeout".into() });
        assert_eq!(dispatch(&mut app, Command::Reconcile, settings()), Response::Reconciled(1));
        assert_eq!(dispatch(&mut app, Command::Reconcile, settings()), Response::Reconciled(0));
    }

    #[tokio::test]
    async fn serves_commands_over_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("focusdeck.sock");
        let listener = bind(&path).unwrap();

        let (app, _clock, _rx) = test_app();
        let app = Arc::new(Mutex::new(app));
        let (_tick_tx, ticks) = watch::channel(FocusStatus::default());
        let server = tokio::spawn(serve(listener, app.clone(), ticks, settings()));

        let stream = UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        write_message(&mut writer, &Command::Add(TaskDraft::new("Socket", Quadrant::Urgent)))
            .await
            .unwrap();
        let response: Response = read_message(&mut reader).await.unwrap();
        assert!(matches!(response, Response::Task(ref t) if t.title == "Socket"));

        writer.write_all(b"not json\n").await.unwrap();
        let response: Response = read_message(&mut reader).await.unwrap();
        assert!(matches!(response, Response::Error(_)));

        write_message(&mut writer, &Command::Status).await.unwrap();
        let response: Response = read_message(&mut reader).await.unwrap();
        assert_eq!(response, Response::Status(FocusStatus::default()));

        assert_eq!(app.lock().await.tasks().len(), 1);
        server.abort();
    }

    #[tokio::test]
    async fn watch_streams_ticks() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watch.sock");
        let listener = bind(&path).unwrap();

        let (app, _clock, _rx) = test_app();
        let (tick_tx, ticks) = watch::channel(FocusStatus::default());
        let server = tokio::spawn(serve(listener, Arc::new(Mutex::new(app)), ticks, settings()));

        let stream = UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        write_message(&mut writer, &Command::Watch).await.unwrap();

        let first: Response = read_message(&mut reader).await.unwrap();
        assert_eq!(first, Response::Tick(FocusStatus::default()));

        tick_tx.send_replace(FocusStatus { task: None, elapsed_seconds: 7 });
        let next: Response = read_message(&mut reader).await.unwrap();
        assert_eq!(next, Response::Tick(FocusStatus { task: None, elapsed_seconds: 7 }));
        server.abort();
    }

    #[tokio::test]
    async fn idle_watch_ends_when_client_hangs_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("idle.sock");
        let listener = bind(&path).unwrap();

        let (app, _clock, _rx) = test_app();
        let (tick_tx, ticks) = watch::channel(FocusStatus::default());
        let server = tokio::spawn(serve(listener, Arc::new(Mutex::new(app)), ticks, settings()));

        let stream = UnixStream::connect(&path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);
        write_message(&mut writer, &Command::Watch).await.unwrap();
        let _first: Response = read_message(&mut reader).await.unwrap();
        // serve() plus the watching handler.
        assert_eq!(tick_tx.receiver_count(), 2);

        drop(reader);
        drop(writer);
        tokio::time::timeout(std::time::Duration::from_secs(2), async {
            while tick_tx.receiver_count() > 1 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("handler kept waiting on an idle ticker");
        server.abort();
    }

    #[test]
    fn memo_is_stored_and_returned() {
        let (mut app, _clock, _rx) = test_app();
        assert_eq!(dispatch(&mut app, Command::Memo, settings()), Response::Memo(String::new()));
        let set = Command::SetMemo { text: "buy stamps".into() };
        assert_eq!(dispatch(&mut app, set, settings()), Response::Ok);
        assert_eq!(
            dispatch(&mut app, Command::Memo, settings()),
            Response::Memo("buy stamps".into())
        );
    }
}
