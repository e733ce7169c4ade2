use serde::Deserialize;

use crate::sync::ProjectConfigSource;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub projects: Vec<ProjectConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// Seconds between sync passes when `schedule` is not set.
    pub interval_secs: u64,
    /// Optional cron expression (UTC), e.g. "0 */15 * * * *". Takes precedence over interval_secs.
    pub schedule: Option<String>,
    /// Upper bound on how far one pass advances a project's checkpoint.
    #[serde(default = "default_max_window_hours")]
    pub max_window_hours: u32,
    /// Starting point for projects that have never been synced.
    #[serde(default = "default_backfill_days")]
    pub default_backfill_days: u32,
}

fn default_max_window_hours() -> u32 {
    24 * 7
}

fn default_backfill_days() -> u32 {
    28
}

/// Upper bound on configured sync spans: ten years.
const MAX_SYNC_SPAN_DAYS: u32 = 3650;

impl SyncConfig {
    pub fn max_window(&self) -> chrono::Duration {
        chrono::Duration::hours(self.max_window_hours as i64)
    }

    pub fn default_backfill(&self) -> chrono::Duration {
        chrono::Duration::days(self.default_backfill_days as i64)
    }
}

/// Upstream source-control API used to pin module revisions in manifests.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_url")]
    pub base_url: String,
    pub token: Option<String>,
    #[serde(default = "default_upstream_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_upstream_url(),
            token: None,
            timeout_secs: default_upstream_timeout_secs(),
        }
    }
}

fn default_upstream_url() -> String {
    "https://api.github.com".into()
}

fn default_upstream_timeout_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub id: String,
    pub branch: String,
    /// Regex patterns for task names that never recur and should not be tracked.
    #[serde(default)]
    pub ignored_tasks: Vec<String>,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub owner: String,
    pub repo: String,
    pub branch: String,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        Self::load_from_path(&path)
    }

    pub fn load_from_path(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("read config {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn project_ids(&self) -> Vec<String> {
        self.projects.iter().map(|p| p.id.clone()).collect()
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.sync.interval_secs > 0,
            "sync.interval_secs must be > 0, got {}",
            self.sync.interval_secs
        );
        anyhow::ensure!(
            self.sync.max_window_hours > 0 && self.sync.max_window_hours <= MAX_SYNC_SPAN_DAYS * 24,
            "sync.max_window_hours must be between 1 and {}, got {}",
            MAX_SYNC_SPAN_DAYS * 24,
            self.sync.max_window_hours
        );
        anyhow::ensure!(
            self.sync.default_backfill_days <= MAX_SYNC_SPAN_DAYS,
            "sync.default_backfill_days must be at most {}, got {}",
            MAX_SYNC_SPAN_DAYS,
            self.sync.default_backfill_days
        );
        if let Some(ref schedule) = self.sync.schedule {
            anyhow::ensure!(
                <cron::Schedule as std::str::FromStr>::from_str(schedule).is_ok(),
                "sync.schedule is not a valid cron expression: {}",
                schedule
            );
        }
        anyhow::ensure!(
            self.upstream.timeout_secs > 0,
            "upstream.timeout_secs must be > 0, got {}",
            self.upstream.timeout_secs
        );
        let mut seen = std::collections::HashSet::new();
        for p in &self.projects {
            anyhow::ensure!(!p.id.is_empty(), "projects.id must be non-empty");
            anyhow::ensure!(seen.insert(&p.id), "duplicate project id: {}", p.id);
        }
        Ok(())
    }
}

/// Project settings keyed by id. Backs ignore-pattern lookups and manifest module lists.
#[derive(Debug, Clone, Default)]
pub struct ProjectRegistry {
    projects: Vec<ProjectConfig>,
}

impl ProjectRegistry {
    pub fn new(projects: Vec<ProjectConfig>) -> Self {
        Self { projects }
    }

    pub fn get(&self, project_id: &str) -> Option<&ProjectConfig> {
        self.projects.iter().find(|p| p.id == project_id)
    }
}

impl ProjectConfigSource for ProjectRegistry {
    async fn ignore_patterns(&self, project_id: &str) -> anyhow::Result<Vec<String>> {
        let project = self
            .get(project_id)
            .ok_or_else(|| anyhow::anyhow!("project ref not found: {}", project_id))?;
        Ok(project.ignored_tasks.clone())
    }
}
