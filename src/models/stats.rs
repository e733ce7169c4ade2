// Sync checkpoint and hourly stats unit models

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Per-project progress marker. Everything before `processed_until` has been synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCheckpoint {
    pub project_id: String,
    pub processed_until: DateTime<Utc>,
    pub last_job_run: DateTime<Utc>,
}

/// One hour of task names for a (project, requester) pair, as reported by the stats source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsUnit {
    pub project_id: String,
    pub requester: String,
    /// Hour-aligned start of the period.
    pub hour: DateTime<Utc>,
    pub tasks: Vec<String>,
}

impl StatsUnit {
    /// UTC calendar day this unit folds into.
    pub fn day(&self) -> NaiveDate {
        self.hour.date_naive()
    }
}

/// Composite key of a daily bucket. Ordering is (day, requester).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyKey {
    pub day: NaiveDate,
    pub requester: String,
}

/// One raw task run. Input to the stats source; written by ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResult {
    pub project_id: String,
    pub requester: String,
    pub task_name: String,
    pub finished_at: DateTime<Utc>,
}

/// Hourly per-task aggregate row (reference generators).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HourlyTaskStat {
    pub project_id: String,
    pub requester: String,
    pub task_name: String,
    pub hour: DateTime<Utc>,
    pub num_runs: i64,
}

/// Daily per-task aggregate row (reference generators).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyTaskStat {
    pub project_id: String,
    pub requester: String,
    pub task_name: String,
    pub day: NaiveDate,
    pub num_runs: i64,
}
