// Background sync worker: one pass per configured project on every tick.
// Ticks come from a fixed interval or a cron schedule (UTC). Projects run one after
// another, so a project never has two passes in flight.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use crate::sync::{
    CheckpointStore, ProjectConfigSource, StatsSource, SyncError, SyncOrchestrator, SyncReport,
};

/// Config for the sync worker.
#[derive(Debug, Clone)]
pub struct SyncWorkerConfig {
    pub interval_secs: u64,
    /// Optional cron expression; takes precedence over `interval_secs`.
    pub schedule: Option<String>,
    pub projects: Vec<String>,
}

/// Spawns the sync worker. It exits when `shutdown` flips to true.
pub fn spawn<C, S, P>(
    orchestrator: Arc<SyncOrchestrator<C, S, P>>,
    config: SyncWorkerConfig,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()>
where
    C: CheckpointStore + 'static,
    S: StatsSource + 'static,
    P: ProjectConfigSource + 'static,
{
    tokio::spawn(async move {
        run(orchestrator, config, shutdown).await;
    })
}

#[instrument(skip(orchestrator, shutdown), fields(interval_secs = config.interval_secs))]
async fn run<C, S, P>(
    orchestrator: Arc<SyncOrchestrator<C, S, P>>,
    config: SyncWorkerConfig,
    mut shutdown: watch::Receiver<bool>,
) where
    C: CheckpointStore + 'static,
    S: StatsSource + 'static,
    P: ProjectConfigSource + 'static,
{
    let (tick_tx, mut tick_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(tick_scheduler(config.clone(), tick_tx));

    loop {
        tokio::select! {
            tick = tick_rx.recv() => {
                if tick.is_none() {
                    warn!("sync scheduler stopped; worker exiting");
                    break;
                }
                let failures = run_one_tick(&orchestrator, &config.projects, &shutdown).await
                    .iter()
                    .filter(|(_, r)| r.is_err())
                    .count();
                if failures > 0 {
                    warn!(failures, projects = config.projects.len(), "sync tick finished with failures");
                }
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("sync worker shutting down");
                    break;
                }
            }
        }
    }
}

/// Sends a message on `tx` at each sync time (cron or fixed interval). Cron is evaluated in UTC.
/// A full channel drops the tick, so a slow pass is never queued behind itself.
/// Exits as soon as the receiving worker is gone.
async fn tick_scheduler(config: SyncWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid sync schedule; sync will not run");
            return;
        };
        loop {
            let now = chrono::Utc::now();
            let delay = match schedule.after(&now).next() {
                Some(next) => (next - now).to_std().unwrap_or(Duration::from_secs(1)),
                None => {
                    tokio::select! {
                        _ = tx.closed() => break,
                        _ = tokio::time::sleep(Duration::from_secs(3600)) => {}
                    }
                    continue;
                }
            };
            tokio::select! {
                _ = tx.closed() => break,
                _ = tokio::time::sleep(delay) => {}
            }
            let _ = tx.try_send(());
        }
    } else {
        let mut interval = tokio::time::interval(Duration::from_secs(config.interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tx.closed() => break,
                _ = interval.tick() => {}
            }
            let _ = tx.try_send(());
        }
    }
}

/// Runs one pass for each project in order. Used by the worker loop and the `sync` command.
/// A failing project is logged and does not stop the rest; cancellation stops the tick.
pub async fn run_one_tick<C, S, P>(
    orchestrator: &SyncOrchestrator<C, S, P>,
    projects: &[String],
    shutdown: &watch::Receiver<bool>,
) -> Vec<(String, Result<SyncReport, SyncError>)>
where
    C: CheckpointStore,
    S: StatsSource,
    P: ProjectConfigSource,
{
    let mut results = Vec::with_capacity(projects.len());
    for project_id in projects {
        let result = orchestrator.run(project_id, shutdown).await;
        let cancelled = matches!(result, Err(SyncError::Cancelled));
        if let Err(ref e) = result {
            warn!(project_id = %project_id, error = %e, cause = ?std::error::Error::source(e).map(|s| s.to_string()), "sync failed");
        }
        results.push((project_id.clone(), result));
        if cancelled {
            break;
        }
    }
    results
}
