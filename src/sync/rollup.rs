// Filtering of hourly units and the hourly -> daily fold.

use std::collections::BTreeMap;

use super::IgnoreMatcher;
use crate::models::{DailyKey, StatsUnit};

/// Daily buckets in (day, requester) order.
pub type DailyRollup = BTreeMap<DailyKey, Vec<String>>;

/// Drops ignored task names; units left with no tasks are dropped entirely.
pub fn filter_units(units: Vec<StatsUnit>, matcher: &IgnoreMatcher) -> Vec<StatsUnit> {
    units
        .into_iter()
        .filter_map(|mut unit| {
            if !matcher.is_empty() {
                unit.tasks.retain(|task| !matcher.matches(task));
            }
            (!unit.tasks.is_empty()).then_some(unit)
        })
        .collect()
}

/// Groups units by UTC day and requester. Task lists are concatenated in input order
/// and not deduplicated; generators see every occurrence.
pub fn build_daily(units: &[StatsUnit]) -> DailyRollup {
    let mut rollup = DailyRollup::new();
    for unit in units {
        let key = DailyKey {
            day: unit.day(),
            requester: unit.requester.clone(),
        };
        rollup
            .entry(key)
            .or_default()
            .extend(unit.tasks.iter().cloned());
    }
    rollup
}
