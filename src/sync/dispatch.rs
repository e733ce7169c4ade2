// Generator dispatch: named hourly and daily generator tables, run fail-fast.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, NaiveTime, Utc};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::watch;
use tracing::{debug, warn};

use super::{DailyRollup, SyncError};
use crate::models::StatsUnit;

/// Arguments for one generator call: one period of one requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerateRequest {
    pub project_id: String,
    pub requester: String,
    pub period_start: DateTime<Utc>,
    pub tasks: Vec<String>,
    pub job_time: DateTime<Utc>,
}

/// Persists one aggregate. Must be safe to call again for a period it already wrote.
pub type GeneratorFn =
    Arc<dyn Fn(GenerateRequest) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Hourly,
    Daily,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Hourly => f.write_str("hourly"),
            Stage::Daily => f.write_str("daily"),
        }
    }
}

/// Caller-supplied generator tables. Names are scoped per stage and run in name order.
#[derive(Clone, Default)]
pub struct GeneratorTables {
    hourly: BTreeMap<String, GeneratorFn>,
    daily: BTreeMap<String, GeneratorFn>,
}

impl GeneratorTables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hourly<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(GenerateRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.hourly.insert(name.into(), boxed(f));
        self
    }

    pub fn daily<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(GenerateRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.daily.insert(name.into(), boxed(f));
        self
    }

    pub fn hourly_names(&self) -> impl Iterator<Item = &str> {
        self.hourly.keys().map(String::as_str)
    }

    pub fn daily_names(&self) -> impl Iterator<Item = &str> {
        self.daily.keys().map(String::as_str)
    }
}

impl fmt::Debug for GeneratorTables {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratorTables")
            .field("hourly", &self.hourly.keys().collect::<Vec<_>>())
            .field("daily", &self.daily.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn boxed<F, Fut>(f: F) -> GeneratorFn
where
    F: Fn(GenerateRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |req| f(req).boxed())
}

/// Runs the generator tables for one pass. Every call uses the same `job_time`.
pub struct GeneratorDispatcher<'a> {
    tables: &'a GeneratorTables,
    job_time: DateTime<Utc>,
    shutdown: &'a watch::Receiver<bool>,
}

impl<'a> GeneratorDispatcher<'a> {
    pub fn new(
        tables: &'a GeneratorTables,
        job_time: DateTime<Utc>,
        shutdown: &'a watch::Receiver<bool>,
    ) -> Self {
        Self {
            tables,
            job_time,
            shutdown,
        }
    }

    /// Every hourly generator over every non-empty unit. Returns the number of calls made.
    pub async fn run_hourly(&self, units: &[StatsUnit]) -> Result<usize, SyncError> {
        let mut calls = 0;
        for (name, generate) in &self.tables.hourly {
            for unit in units.iter().filter(|u| !u.tasks.is_empty()) {
                let req = GenerateRequest {
                    project_id: unit.project_id.clone(),
                    requester: unit.requester.clone(),
                    period_start: unit.hour,
                    tasks: unit.tasks.clone(),
                    job_time: self.job_time,
                };
                self.call(Stage::Hourly, name, generate, req).await?;
                calls += 1;
            }
        }
        Ok(calls)
    }

    /// Every daily generator over every non-empty bucket; the period starts at 00:00 UTC.
    pub async fn run_daily(
        &self,
        project_id: &str,
        buckets: &DailyRollup,
    ) -> Result<usize, SyncError> {
        let mut calls = 0;
        for (name, generate) in &self.tables.daily {
            for (key, tasks) in buckets.iter().filter(|(_, t)| !t.is_empty()) {
                let req = GenerateRequest {
                    project_id: project_id.to_string(),
                    requester: key.requester.clone(),
                    period_start: key.day.and_time(NaiveTime::MIN).and_utc(),
                    tasks: tasks.clone(),
                    job_time: self.job_time,
                };
                self.call(Stage::Daily, name, generate, req).await?;
                calls += 1;
            }
        }
        Ok(calls)
    }

    async fn call(
        &self,
        stage: Stage,
        name: &str,
        generate: &GeneratorFn,
        req: GenerateRequest,
    ) -> Result<(), SyncError> {
        if *self.shutdown.borrow() {
            return Err(SyncError::Cancelled);
        }
        let project_id = req.project_id.clone();
        let period = req.period_start;
        let tasks = req.tasks.len();
        if let Err(e) = generate(req).await {
            warn!(
                project_id = %project_id,
                sync_date = %period,
                job_time = %self.job_time,
                stage = %stage,
                generator = name,
                error = %e,
                "could not sync stats"
            );
            return Err(SyncError::Generator {
                stage,
                name: name.to_string(),
                project_id,
                period,
                source: e,
            });
        }
        debug!(stage = %stage, generator = name, sync_date = %period, tasks, "stats synced");
        Ok(())
    }
}
