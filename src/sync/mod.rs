// Incremental historical stats sync: checkpoint -> window -> fetch -> filter ->
// hourly generators -> daily rollup -> daily generators -> checkpoint.

mod dispatch;
mod ignore;
mod orchestrator;
mod rollup;
mod window;

use std::future::Future;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use dispatch::{GenerateRequest, GeneratorDispatcher, GeneratorFn, GeneratorTables, Stage};
pub use ignore::IgnoreMatcher;
pub use orchestrator::{SyncOrchestrator, SyncReport, SyncSettings};
pub use rollup::{DailyRollup, build_daily, filter_units};
pub use window::{SyncWindow, compute_range};

use crate::models::{StatsUnit, SyncCheckpoint};

/// Why a pass stopped. In every case the checkpoint is left where it was.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("error retrieving last sync date")]
    Checkpoint(#[source] anyhow::Error),
    #[error("error retrieving project settings")]
    ProjectConfig(#[source] anyhow::Error),
    #[error("could not compile ignore pattern")]
    Config(#[from] regex::Error),
    #[error("error finding tasks to update")]
    Fetch(#[source] anyhow::Error),
    #[error("could not sync {stage} stats ({name}) for {project_id} at {period}")]
    Generator {
        stage: Stage,
        name: String,
        project_id: String,
        period: DateTime<Utc>,
        #[source]
        source: anyhow::Error,
    },
    #[error("error updating last synced date")]
    CheckpointUpdate(#[source] anyhow::Error),
    #[error("sync cancelled")]
    Cancelled,
}

/// Where each project's sync progress is stored.
pub trait CheckpointStore: Send + Sync {
    fn get_checkpoint(
        &self,
        project_id: &str,
    ) -> impl Future<Output = anyhow::Result<Option<SyncCheckpoint>>> + Send;

    fn set_checkpoint(
        &self,
        project_id: &str,
        job_time: DateTime<Utc>,
        processed_until: DateTime<Utc>,
    ) -> impl Future<Output = anyhow::Result<()>> + Send;
}

/// Raw results grouped into hourly units for `[from, to)`.
pub trait StatsSource: Send + Sync {
    fn fetch_units(
        &self,
        project_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = anyhow::Result<Vec<StatsUnit>>> + Send;
}

pub trait ProjectConfigSource: Send + Sync {
    fn ignore_patterns(
        &self,
        project_id: &str,
    ) -> impl Future<Output = anyhow::Result<Vec<String>>> + Send;
}
