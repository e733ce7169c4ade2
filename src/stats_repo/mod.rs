// SQLite stats storage: raw task results, per-project sync checkpoints, and the
// hourly/daily aggregate tables written by the reference generators.

pub mod generators;

use crate::db::{from_ms, to_ms};
use crate::models::{DailyTaskStat, HourlyTaskStat, StatsUnit, SyncCheckpoint, TaskResult};
use crate::sync::{CheckpointStore, StatsSource};
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use std::collections::BTreeMap;
use tracing::instrument;

const MS_PER_HOUR: i64 = 3_600_000;

pub struct StatsRepo {
    pool: SqlitePool,
}

impl StatsRepo {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_results (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                project_id TEXT NOT NULL,
                requester TEXT NOT NULL,
                task_name TEXT NOT NULL,
                finished_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_task_results_project_finished ON task_results(project_id, finished_at)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stats_status (
                project_id TEXT PRIMARY KEY,
                last_job_run INTEGER NOT NULL,
                processed_tasks_until INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        generators::init_aggregate_tables(&self.pool).await?;

        Ok(())
    }

    #[instrument(skip(self, results), fields(repo = "stats", operation = "insert_task_results", results_count = results.len()))]
    pub async fn insert_task_results(&self, results: &[TaskResult]) -> anyhow::Result<()> {
        if results.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for r in results {
            sqlx::query(
                "INSERT INTO task_results (project_id, requester, task_name, finished_at) VALUES ($1, $2, $3, $4)",
            )
            .bind(&r.project_id)
            .bind(&r.requester)
            .bind(&r.task_name)
            .bind(to_ms(r.finished_at))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "stats", operation = "get_checkpoint"))]
    pub async fn get_checkpoint(&self, project_id: &str) -> anyhow::Result<Option<SyncCheckpoint>> {
        let row = sqlx::query(
            "SELECT last_job_run, processed_tasks_until FROM stats_status WHERE project_id = $1",
        )
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let last_job_run: i64 = row.try_get("last_job_run")?;
        let processed_until: i64 = row.try_get("processed_tasks_until")?;
        Ok(Some(SyncCheckpoint {
            project_id: project_id.to_string(),
            processed_until: from_ms(processed_until)?,
            last_job_run: from_ms(last_job_run)?,
        }))
    }

    #[instrument(skip(self), fields(repo = "stats", operation = "set_checkpoint"))]
    pub async fn set_checkpoint(
        &self,
        project_id: &str,
        job_time: DateTime<Utc>,
        processed_until: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO stats_status (project_id, last_job_run, processed_tasks_until)
            VALUES ($1, $2, $3)
            ON CONFLICT(project_id) DO UPDATE SET
                last_job_run = excluded.last_job_run,
                processed_tasks_until = excluded.processed_tasks_until
            "#,
        )
        .bind(project_id)
        .bind(to_ms(job_time))
        .bind(to_ms(processed_until))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Task results finished in [from, to), grouped into (hour, requester) units.
    /// Units are ordered by hour then requester; a task name appears once per unit,
    /// in first-seen order.
    #[instrument(skip(self), fields(repo = "stats", operation = "fetch_units"))]
    pub async fn fetch_units(
        &self,
        project_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<StatsUnit>> {
        let rows = sqlx::query(
            "SELECT requester, task_name, finished_at FROM task_results
             WHERE project_id = $1 AND finished_at >= $2 AND finished_at < $3
             ORDER BY finished_at ASC, id ASC",
        )
        .bind(project_id)
        .bind(to_ms(from))
        .bind(to_ms(to))
        .fetch_all(&self.pool)
        .await?;

        let mut grouped: BTreeMap<(i64, String), Vec<String>> = BTreeMap::new();
        for row in rows {
            let requester: String = row.try_get("requester")?;
            let task_name: String = row.try_get("task_name")?;
            let finished_at: i64 = row.try_get("finished_at")?;
            let hour = finished_at.div_euclid(MS_PER_HOUR) * MS_PER_HOUR;
            let tasks = grouped.entry((hour, requester)).or_default();
            if !tasks.contains(&task_name) {
                tasks.push(task_name);
            }
        }

        let mut out = Vec::with_capacity(grouped.len());
        for ((hour, requester), tasks) in grouped {
            out.push(StatsUnit {
                project_id: project_id.to_string(),
                requester,
                hour: from_ms(hour)?,
                tasks,
            });
        }
        Ok(out)
    }

    /// Hourly aggregate rows for a project, ordered by hour, requester, task.
    pub async fn get_hourly_task_stats(
        &self,
        project_id: &str,
    ) -> anyhow::Result<Vec<HourlyTaskStat>> {
        let rows = sqlx::query(
            "SELECT requester, task_name, hour, num_runs FROM hourly_task_stats
             WHERE project_id = $1 ORDER BY hour ASC, requester ASC, task_name ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let hour: i64 = row.try_get("hour")?;
            out.push(HourlyTaskStat {
                project_id: project_id.to_string(),
                requester: row.try_get("requester")?,
                task_name: row.try_get("task_name")?,
                hour: from_ms(hour)?,
                num_runs: row.try_get("num_runs")?,
            });
        }
        Ok(out)
    }

    /// Daily aggregate rows for a project, ordered by day, requester, task.
    pub async fn get_daily_task_stats(
        &self,
        project_id: &str,
    ) -> anyhow::Result<Vec<DailyTaskStat>> {
        let rows = sqlx::query(
            "SELECT requester, task_name, day, num_runs FROM daily_task_stats
             WHERE project_id = $1 ORDER BY day ASC, requester ASC, task_name ASC",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let day: i64 = row.try_get("day")?;
            out.push(DailyTaskStat {
                project_id: project_id.to_string(),
                requester: row.try_get("requester")?,
                task_name: row.try_get("task_name")?,
                day: from_ms(day)?.date_naive(),
                num_runs: row.try_get("num_runs")?,
            });
        }
        Ok(out)
    }
}

impl CheckpointStore for StatsRepo {
    async fn get_checkpoint(&self, project_id: &str) -> anyhow::Result<Option<SyncCheckpoint>> {
        StatsRepo::get_checkpoint(self, project_id).await
    }

    async fn set_checkpoint(
        &self,
        project_id: &str,
        job_time: DateTime<Utc>,
        processed_until: DateTime<Utc>,
    ) -> anyhow::Result<()> {
        StatsRepo::set_checkpoint(self, project_id, job_time, processed_until).await
    }
}

impl StatsSource for StatsRepo {
    async fn fetch_units(
        &self,
        project_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> anyhow::Result<Vec<StatsUnit>> {
        StatsRepo::fetch_units(self, project_id, from, to).await
    }
}
