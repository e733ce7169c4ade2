// Reference aggregate generators over the SQLite stats tables.
// Every write is an upsert keyed by period, so re-running a window overwrites rather
// than double counts.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::Duration;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;
use tracing::instrument;

use super::{MS_PER_HOUR, StatsRepo};
use crate::db::to_ms;
use crate::sync::{GenerateRequest, GeneratorTables};

pub const HOURLY_TASK_STATS: &str = "task";
pub const DAILY_TASK_STATS: &str = "task";
pub const DAILY_REQUESTER_STATS: &str = "requester";

pub(super) async fn init_aggregate_tables(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS hourly_task_stats (
            project_id TEXT NOT NULL,
            requester TEXT NOT NULL,
            task_name TEXT NOT NULL,
            hour INTEGER NOT NULL,
            num_runs INTEGER NOT NULL,
            last_update INTEGER NOT NULL,
            PRIMARY KEY (project_id, requester, task_name, hour)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_task_stats (
            project_id TEXT NOT NULL,
            requester TEXT NOT NULL,
            task_name TEXT NOT NULL,
            day INTEGER NOT NULL,
            num_runs INTEGER NOT NULL,
            last_update INTEGER NOT NULL,
            PRIMARY KEY (project_id, requester, task_name, day)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS daily_requester_stats (
            project_id TEXT NOT NULL,
            requester TEXT NOT NULL,
            day INTEGER NOT NULL,
            num_tasks INTEGER NOT NULL,
            num_runs INTEGER NOT NULL,
            last_update INTEGER NOT NULL,
            PRIMARY KEY (project_id, requester, day)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Hourly: "task". Daily: "requester", "task". Daily ones read the hourly table, so they
/// rely on the hourly stage having committed first.
pub fn reference_generators(repo: Arc<StatsRepo>) -> GeneratorTables {
    let hourly = repo.clone();
    let daily_task = repo.clone();
    let daily_requester = repo;
    GeneratorTables::new()
        .hourly(HOURLY_TASK_STATS, move |req| {
            let repo = hourly.clone();
            async move { repo.generate_hourly_task_stats(&req).await }
        })
        .daily(DAILY_TASK_STATS, move |req| {
            let repo = daily_task.clone();
            async move { repo.generate_daily_task_stats(&req).await }
        })
        .daily(DAILY_REQUESTER_STATS, move |req| {
            let repo = daily_requester.clone();
            async move { repo.generate_daily_requester_stats(&req).await }
        })
}

impl StatsRepo {
    /// Counts raw runs of the listed tasks in the hour starting at `period_start`.
    #[instrument(skip(self, req), fields(repo = "stats", operation = "generate_hourly_task_stats", requester = %req.requester, hour = %req.period_start))]
    pub async fn generate_hourly_task_stats(&self, req: &GenerateRequest) -> anyhow::Result<()> {
        let wanted: BTreeSet<&str> = req.tasks.iter().map(String::as_str).collect();
        let start = to_ms(req.period_start);
        let rows = sqlx::query(
            "SELECT task_name, COUNT(*) AS num_runs FROM task_results
             WHERE project_id = $1 AND requester = $2 AND finished_at >= $3 AND finished_at < $4
             GROUP BY task_name",
        )
        .bind(&req.project_id)
        .bind(&req.requester)
        .bind(start)
        .bind(start + MS_PER_HOUR)
        .fetch_all(&self.pool)
        .await?;

        let mut counts = Vec::with_capacity(rows.len());
        for row in rows {
            let task_name: String = row.try_get("task_name")?;
            let num_runs: i64 = row.try_get("num_runs")?;
            if wanted.contains(task_name.as_str()) {
                counts.push((task_name, num_runs));
            }
        }

        let mut tx = self.pool.begin().await?;
        for (task_name, num_runs) in counts {
            sqlx::query(
                r#"
                INSERT INTO hourly_task_stats (project_id, requester, task_name, hour, num_runs, last_update)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT(project_id, requester, task_name, hour) DO UPDATE SET
                    num_runs = excluded.num_runs,
                    last_update = excluded.last_update
                "#,
            )
            .bind(&req.project_id)
            .bind(&req.requester)
            .bind(&task_name)
            .bind(start)
            .bind(num_runs)
            .bind(to_ms(req.job_time))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Sums the day's hourly rows per listed task. Duplicate names in the list are harmless.
    #[instrument(skip(self, req), fields(repo = "stats", operation = "generate_daily_task_stats", requester = %req.requester, day = %req.period_start))]
    pub async fn generate_daily_task_stats(&self, req: &GenerateRequest) -> anyhow::Result<()> {
        let hourly = self.hourly_runs_for_day(req).await?;
        let day = to_ms(req.period_start);
        let wanted: BTreeSet<&str> = req.tasks.iter().map(String::as_str).collect();

        let mut tx = self.pool.begin().await?;
        for task_name in wanted {
            let Some(num_runs) = hourly.get(task_name) else {
                continue;
            };
            sqlx::query(
                r#"
                INSERT INTO daily_task_stats (project_id, requester, task_name, day, num_runs, last_update)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT(project_id, requester, task_name, day) DO UPDATE SET
                    num_runs = excluded.num_runs,
                    last_update = excluded.last_update
                "#,
            )
            .bind(&req.project_id)
            .bind(&req.requester)
            .bind(task_name)
            .bind(day)
            .bind(*num_runs)
            .bind(to_ms(req.job_time))
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// Distinct tasks and total runs for the requester on that day.
    #[instrument(skip(self, req), fields(repo = "stats", operation = "generate_daily_requester_stats", requester = %req.requester, day = %req.period_start))]
    pub async fn generate_daily_requester_stats(
        &self,
        req: &GenerateRequest,
    ) -> anyhow::Result<()> {
        let hourly = self.hourly_runs_for_day(req).await?;
        let wanted: BTreeSet<&str> = req.tasks.iter().map(String::as_str).collect();
        let (num_tasks, num_runs) = wanted
            .iter()
            .filter_map(|t| hourly.get(*t))
            .fold((0i64, 0i64), |(tasks, runs), n| (tasks + 1, runs + n));

        sqlx::query(
            r#"
            INSERT INTO daily_requester_stats (project_id, requester, day, num_tasks, num_runs, last_update)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT(project_id, requester, day) DO UPDATE SET
                num_tasks = excluded.num_tasks,
                num_runs = excluded.num_runs,
                last_update = excluded.last_update
            "#,
        )
        .bind(&req.project_id)
        .bind(&req.requester)
        .bind(to_ms(req.period_start))
        .bind(num_tasks)
        .bind(num_runs)
        .bind(to_ms(req.job_time))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// (num_tasks, num_runs) written by the daily requester generator, if any.
    pub async fn get_daily_requester_stats(
        &self,
        project_id: &str,
        requester: &str,
        day: chrono::NaiveDate,
    ) -> anyhow::Result<Option<(i64, i64)>> {
        let day_ms = to_ms(day.and_time(chrono::NaiveTime::MIN).and_utc());
        let row = sqlx::query(
            "SELECT num_tasks, num_runs FROM daily_requester_stats
             WHERE project_id = $1 AND requester = $2 AND day = $3",
        )
        .bind(project_id)
        .bind(requester)
        .bind(day_ms)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some((row.try_get("num_tasks")?, row.try_get("num_runs")?)))
    }

    async fn hourly_runs_for_day(&self, req: &GenerateRequest) -> anyhow::Result<HashMap<String, i64>> {
        let start = to_ms(req.period_start);
        let end = to_ms(req.period_start + Duration::days(1));
        let rows = sqlx::query(
            "SELECT task_name, SUM(num_runs) AS num_runs FROM hourly_task_stats
             WHERE project_id = $1 AND requester = $2 AND hour >= $3 AND hour < $4
             GROUP BY task_name",
        )
        .bind(&req.project_id)
        .bind(&req.requester)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for row in rows {
            let task_name: String = row.try_get("task_name")?;
            let num_runs: i64 = row.try_get("num_runs")?;
            out.insert(task_name, num_runs);
        }
        Ok(out)
    }
}
