// Domain models

mod manifest;
mod stats;

pub use manifest::{BranchHead, Manifest, ManifestModule, TaskRef};
pub use stats::{DailyKey, DailyTaskStat, HourlyTaskStat, StatsUnit, SyncCheckpoint, TaskResult};
