// One sync pass for one project. The checkpoint write at the end is the commit point:
// any earlier failure leaves it untouched and the same window is redone next pass.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

use super::{
    CheckpointStore, GeneratorDispatcher, GeneratorTables, IgnoreMatcher, ProjectConfigSource,
    StatsSource, SyncError, SyncWindow, build_daily, compute_range, filter_units,
};
use crate::config::SyncConfig;

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    pub max_window: Duration,
    /// How far back a project with no checkpoint starts.
    pub default_backfill: Duration,
}

impl From<&SyncConfig> for SyncSettings {
    fn from(config: &SyncConfig) -> Self {
        Self {
            max_window: config.max_window(),
            default_backfill: config.default_backfill(),
        }
    }
}

/// Outcome of a successful pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub project_id: String,
    pub window: SyncWindow,
    pub units_fetched: usize,
    pub units_processed: usize,
    pub hourly_calls: usize,
    pub daily_calls: usize,
}

pub struct SyncOrchestrator<C, S, P> {
    checkpoints: Arc<C>,
    source: Arc<S>,
    projects: Arc<P>,
    generators: GeneratorTables,
    settings: SyncSettings,
}

impl<C, S, P> SyncOrchestrator<C, S, P>
where
    C: CheckpointStore,
    S: StatsSource,
    P: ProjectConfigSource,
{
    pub fn new(
        checkpoints: Arc<C>,
        source: Arc<S>,
        projects: Arc<P>,
        generators: GeneratorTables,
        settings: SyncSettings,
    ) -> Self {
        Self {
            checkpoints,
            source,
            projects,
            generators,
            settings,
        }
    }

    pub fn settings(&self) -> SyncSettings {
        self.settings
    }

    /// Runs one pass with the current time as both window end bound and job time.
    pub async fn run(
        &self,
        project_id: &str,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<SyncReport, SyncError> {
        self.run_at(project_id, Utc::now(), shutdown).await
    }

    #[instrument(skip_all, fields(job = "sync", project_id = %project_id))]
    pub async fn run_at(
        &self,
        project_id: &str,
        now: DateTime<Utc>,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<SyncReport, SyncError> {
        let job_time = now;

        let last_processed = match self
            .checkpoints
            .get_checkpoint(project_id)
            .await
            .map_err(SyncError::Checkpoint)?
        {
            Some(checkpoint) => checkpoint.processed_until,
            None => backfill_start(now, self.settings.default_backfill),
        };

        let patterns = self
            .projects
            .ignore_patterns(project_id)
            .await
            .map_err(SyncError::ProjectConfig)?;
        let matcher = IgnoreMatcher::compile(&patterns)?;

        let window = compute_range(last_processed, now, self.settings.max_window);
        info!(
            sync_from = %window.from,
            sync_to = %window.to,
            ignore_patterns = matcher.len(),
            "running sync"
        );
        check_shutdown(shutdown)?;

        let units = match self
            .source
            .fetch_units(project_id, window.from, window.to)
            .await
        {
            Ok(units) => units,
            Err(e) => {
                warn!(error = %e, sync_from = %window.from, sync_to = %window.to, "fetch failed");
                return Err(SyncError::Fetch(e));
            }
        };
        let units_fetched = units.len();
        let units = filter_units(units, &matcher);

        let dispatcher = GeneratorDispatcher::new(&self.generators, job_time, shutdown);
        let hourly_calls = dispatcher.run_hourly(&units).await?;
        check_shutdown(shutdown)?;

        let daily = build_daily(&units);
        let daily_calls = dispatcher.run_daily(project_id, &daily).await?;
        check_shutdown(shutdown)?;

        self.checkpoints
            .set_checkpoint(project_id, job_time, window.to)
            .await
            .map_err(SyncError::CheckpointUpdate)?;

        let report = SyncReport {
            project_id: project_id.to_string(),
            window,
            units_fetched,
            units_processed: units.len(),
            hourly_calls,
            daily_calls,
        };
        info!(
            units_fetched = report.units_fetched,
            units_processed = report.units_processed,
            hourly_calls = report.hourly_calls,
            daily_calls = report.daily_calls,
            "sync complete"
        );
        Ok(report)
    }
}

/// Where a project with no checkpoint starts. Clamps to the earliest representable time.
fn backfill_start(now: DateTime<Utc>, backfill: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(backfill).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

fn check_shutdown(shutdown: &watch::Receiver<bool>) -> Result<(), SyncError> {
    if *shutdown.borrow() {
        return Err(SyncError::Cancelled);
    }
    Ok(())
}
