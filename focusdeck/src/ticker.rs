//! Once-a-second republish of the focused task's elapsed time.
//!
//! The tick only reads: it recomputes [`App::focus_status`] and hands it to
//! watchers. Durable fields are written by lifecycle transitions alone.

use crate::app::App;
use focusdeck_ipc::FocusStatus;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

pub fn spawn(app: Arc<Mutex<App>>, period: Duration) -> (watch::Receiver<FocusStatus>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(FocusStatus::default());
    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let status = app.lock().await.focus_status();
            tx.send_if_modified(|current| {
                if *current == status {
                    return false;
                }
                *current = status;
                true
            });
        }
    });
    (rx, handle)
}
