use anyhow::{Context, Result};
use focusdeck::clock::SystemClock;
use focusdeck::config::{self, Config};
use focusdeck::ipc::server::{self, ReportSettings};
use focusdeck::persistence::{Persistence, Snapshot};
use focusdeck::remote::{MemoryStore, RestStore, RowStore};
use focusdeck::store::TaskStore;
use focusdeck::sync::SyncWorker;
use focusdeck::{ticker, App};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn remote_store(config: &Config, snapshot: Option<&Snapshot>) -> Result<Arc<dyn RowStore>> {
    match (&config.remote.url, &config.remote.api_key) {
        (Some(url), Some(key)) => {
            let store = RestStore::new(
                url,
                key,
                &config.remote.table,
                Duration::from_secs(config.remote.timeout_secs),
            )
            .context("Failed to build remote client")?;
            info!(url = %url, table = %config.remote.table, "using remote row-store");
            Ok(Arc::new(store))
        }
        _ => {
            warn!("no remote configured; tasks live only in this session and its snapshot");
            let rows = snapshot.map(Snapshot::confirmed_rows).unwrap_or_default();
            Ok(Arc::new(MemoryStore::with_rows(rows)))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("focusdeck=info")),
        )
        .init();

    let config = config::load_config()?;
    let persistence = Persistence::new()?;
    let snapshot = persistence.load().unwrap_or_else(|e| {
        warn!(error = %e, "ignoring unreadable snapshot");
        None
    });
    let remote = remote_store(&config, snapshot.as_ref())?;
    let memo = snapshot.as_ref().map(|s| s.memo.clone()).unwrap_or_default();

    let (write_tx, write_rx) = mpsc::unbounded_channel();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    tokio::spawn(
        SyncWorker::new(remote.clone(), config.sync.retry_policy(), event_tx).run(write_rx),
    );

    let mut store = TaskStore::new(remote, write_tx);
    let startup = store.bootstrap(snapshot).await;
    info!(?startup, "task store ready");

    let mut app = App::new(store, Arc::new(SystemClock));
    app.set_memo(memo);
    let app = Arc::new(Mutex::new(app));

    // Sync outcomes
    {
        let app = app.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                app.lock().await.store_mut().apply_sync(event);
            }
        });
    }

    // Periodic reconciliation of dirty tasks
    {
        let app = app.clone();
        let every = Duration::from_secs(config.sync.reconcile_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            interval.tick().await;
            loop {
                interval.tick().await;
                app.lock().await.store_mut().reconcile();
            }
        });
    }

    // Snapshot every few seconds
    {
        let app = app.clone();
        let persistence = Persistence::at(persistence.path());
        let every = Duration::from_secs(config.sync.snapshot_interval_secs.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                let snapshot = Snapshot::capture(&*app.lock().await);
                if let Err(e) = persistence.save(&snapshot) {
                    warn!(error = %e, "failed to save snapshot");
                }
            }
        });
    }

    let (ticks, _ticker) = ticker::spawn(app.clone(), Duration::from_secs(1));

    let settings = ReportSettings {
        daily_goal_seconds: config.goals.daily_seconds,
        week_start: config.goals.week_starts_on.into(),
    };
    let socket_path = config.ipc.socket_path.clone();
    let listener = server::bind(&socket_path)?;

    tokio::select! {
        res = server::serve(listener, app.clone(), ticks, settings) => res?,
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
    }

    {
        let snapshot = Snapshot::capture(&*app.lock().await);
        persistence.save(&snapshot)?;
        if !snapshot.dirty.is_empty() || !snapshot.deleted.is_empty() {
            warn!(
                unsynced = snapshot.dirty.len(),
                deletes = snapshot.deleted.len(),
                "exiting with unsynced work; kept in snapshot"
            );
        }
    }
    let _ = std::fs::remove_file(&socket_path);

    Ok(())
}
