// Build manifests: pinned module revisions per build version, created on first request.

mod service;
mod upstream;

pub use service::{ManifestError, ManifestService};
pub use upstream::{BranchSource, GithubClient};

use crate::models::{Manifest, TaskRef};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::instrument;

/// Manifest and task lookup storage. Manifests are stored as JSON keyed by version id.
pub struct ManifestRepo {
    pool: SqlitePool,
}

impl ManifestRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS manifests (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                data TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tasks (
                id TEXT PRIMARY KEY,
                project_id TEXT NOT NULL,
                version TEXT NOT NULL,
                revision TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn upsert_task(&self, task: &TaskRef) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO tasks (id, project_id, version, revision) VALUES ($1, $2, $3, $4)
            ON CONFLICT(id) DO UPDATE SET
                project_id = excluded.project_id,
                version = excluded.version,
                revision = excluded.revision
            "#,
        )
        .bind(&task.id)
        .bind(&task.project_id)
        .bind(&task.version)
        .bind(&task.revision)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn find_task(&self, task_id: &str) -> anyhow::Result<Option<TaskRef>> {
        let row = sqlx::query("SELECT project_id, version, revision FROM tasks WHERE id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(TaskRef {
            id: task_id.to_string(),
            project_id: row.try_get("project_id")?,
            version: row.try_get("version")?,
            revision: row.try_get("revision")?,
        }))
    }

    #[instrument(skip(self), fields(repo = "manifest", operation = "find_manifest"))]
    pub async fn find_manifest(&self, version: &str) -> anyhow::Result<Option<Manifest>> {
        let row = sqlx::query("SELECT data FROM manifests WHERE id = $1")
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let data: String = row.try_get("data")?;
        let manifest = serde_json::from_str(&data)
            .map_err(|e| anyhow::anyhow!("decode manifest {}: {}", version, e))?;
        Ok(Some(manifest))
    }

    /// Inserts unless a manifest for the version already exists. Returns true on conflict.
    #[instrument(skip(self, manifest), fields(repo = "manifest", operation = "try_insert", version = %manifest.id))]
    pub async fn try_insert(&self, manifest: &Manifest) -> anyhow::Result<bool> {
        let data = serde_json::to_string(manifest)?;
        let r = sqlx::query(
            "INSERT INTO manifests (id, project_id, data) VALUES ($1, $2, $3) ON CONFLICT(id) DO NOTHING",
        )
        .bind(&manifest.id)
        .bind(&manifest.project_name)
        .bind(&data)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected() == 0)
    }
}
