// Shared test helpers

#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use statsync::config::{ModuleConfig, ProjectConfig, ProjectRegistry};
use statsync::models::{StatsUnit, SyncCheckpoint};
use statsync::sync::{CheckpointStore, ProjectConfigSource, StatsSource};
use std::collections::HashMap;
use std::sync::Mutex;

pub fn ts(month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, month, day, hour, 0, 0).unwrap()
}

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

pub fn unit(project: &str, requester: &str, hour: DateTime<Utc>, tasks: &[&str]) -> StatsUnit {
    StatsUnit {
        project_id: project.into(),
        requester: requester.into(),
        hour,
        tasks: tasks.iter().map(|t| t.to_string()).collect(),
    }
}

pub fn project(id: &str, ignored: &[&str]) -> ProjectConfig {
    ProjectConfig {
        id: id.into(),
        branch: "main".into(),
        ignored_tasks: ignored.iter().map(|p| p.to_string()).collect(),
        modules: vec![],
    }
}

pub fn project_with_modules(id: &str, modules: &[(&str, &str, &str)]) -> ProjectConfig {
    ProjectConfig {
        id: id.into(),
        branch: "main".into(),
        ignored_tasks: vec![],
        modules: modules
            .iter()
            .map(|(name, owner, repo)| ModuleConfig {
                name: name.to_string(),
                owner: owner.to_string(),
                repo: repo.to_string(),
                branch: "main".into(),
            })
            .collect(),
    }
}

pub fn registry(projects: Vec<ProjectConfig>) -> ProjectRegistry {
    ProjectRegistry::new(projects)
}

/// In-memory checkpoint store + stats source with call recording and injectable failures.
#[derive(Default)]
pub struct MemoryBackend {
    pub checkpoints: Mutex<HashMap<String, SyncCheckpoint>>,
    pub units: Mutex<Vec<StatsUnit>>,
    pub fetches: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
    pub fail_fetch: bool,
    pub fail_checkpoint_read: bool,
}

impl MemoryBackend {
    pub fn with_checkpoint(project_id: &str, processed_until: DateTime<Utc>) -> Self {
        let backend = Self::default();
        backend.checkpoints.lock().unwrap().insert(
            project_id.to_string(),
            SyncCheckpoint {
                project_id: project_id.to_string(),
                processed_until,
                last_job_run: processed_until,
            },
        );
        backend
    }

    pub fn processed_until(&self, project_id: &str) -> Option<DateTime<Utc>> {
        self.checkpoints
            .lock()
            .unwrap()
            .get(project_id)
            .map(|c| c.processed_until)
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }
}

impl CheckpointStore for MemoryBackend {
    async fn get_checkpoint(&self, project_id: &str) -> anyhow::Result<Option<SyncCheckpoint>> {
        if self.fail_checkpoint_read {
            anyhow::bail!("checkpoint store unavailable");
        }
        Ok(self.checkpoints.lock().unwrap().get(project_id).cloned())
    }

    async fn set_checkpoint(
        &self,
        project_id: &str,
        job_time: DateTime<Utc>,
        processed_until: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        self.checkpoints.lock().unwrap().insert(
            project_id.to_string(),
            SyncCheckpoint {
                project_id: project_id.to_string(),
                processed_until,
                last_job_run: job_time,
            },
        );
        Ok(())
    }
}

impl StatsSource for MemoryBackend {
    async fn fetch_units(
        &self,
        project_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<StatsUnit>> {
        self.fetches
            .lock()
            .unwrap()
            .push((project_id.to_string(), from, to));
        if self.fail_fetch {
            anyhow::bail!("stats source unavailable");
        }
        Ok(self
            .units
            .lock()
            .unwrap()
            .iter()
            .filter(|u| u.project_id == project_id && u.hour >= from && u.hour < to)
            .cloned()
            .collect())
    }
}

/// Project source that always fails, for config-load error paths.
pub struct BrokenProjects;

impl ProjectConfigSource for BrokenProjects {
    async fn ignore_patterns(&self, _project_id: &str) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("project settings unavailable")
    }
}
