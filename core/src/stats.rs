use std::sync::Arc;

use serde::Serialize;

use crate::store::{KeyValueStore, StoreError};

pub const TOTAL_CONVERSIONS_KEY: &str = "totalConversions";
pub const FILES_PROCESSED_KEY: &str = "filesProcessed";
pub const TIME_SAVED_KEY: &str = "timeSavedEstimate";

/// Cumulative usage counters. They only ever grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsCounters {
    pub total_conversions: u64,
    pub files_processed: u64,
    pub time_saved_estimate: u64,
}

pub struct StatsAggregator {
    store: Arc<dyn KeyValueStore>,
}

impl StatsAggregator {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn counters(&self) -> Result<StatsCounters, StoreError> {
        Ok(StatsCounters {
            total_conversions: self.read(TOTAL_CONVERSIONS_KEY)?,
            files_processed: self.read(FILES_PROCESSED_KEY)?,
            time_saved_estimate: self.read(TIME_SAVED_KEY)?,
        })
    }

    /// Account for one batch of `attempted` files, successful or not.
    pub fn increment(&self, attempted: u64) -> Result<StatsCounters, StoreError> {
        let current = self.counters()?;
        let next = StatsCounters {
            total_conversions: current.total_conversions.saturating_add(1),
            files_processed: current.files_processed.saturating_add(attempted),
            // ceil(attempted * 0.5)
            time_saved_estimate: current
                .time_saved_estimate
                .saturating_add(attempted.div_ceil(2)),
        };

        let total = next.total_conversions.to_string();
        let processed = next.files_processed.to_string();
        let saved = next.time_saved_estimate.to_string();
        self.store.set_many(&[
            (TOTAL_CONVERSIONS_KEY, total.as_str()),
            (FILES_PROCESSED_KEY, processed.as_str()),
            (TIME_SAVED_KEY, saved.as_str()),
        ])?;
        Ok(next)
    }

    fn read(&self, key: &str) -> Result<u64, StoreError> {
        let value = self.store.get(key)?;
        Ok(match value.as_deref().map(str::trim) {
            None | Some("") => 0,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                log::warn!("Counter {} has unreadable value {:?}, treating as 0", key, raw);
                0
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JsonFileStore, MemoryStore};

    #[test]
    fn test_zero_state() {
        let stats = StatsAggregator::new(Arc::new(MemoryStore::new()));
        assert_eq!(stats.counters().unwrap(), StatsCounters::default());
    }

    #[test]
    fn test_increment() {
        let stats = StatsAggregator::new(Arc::new(MemoryStore::new()));
        stats.increment(3).unwrap();
        let counters = stats.increment(4).unwrap();
        assert_eq!(
            counters,
            StatsCounters {
                total_conversions: 2,
                files_processed: 7,
                time_saved_estimate: 2 + 2,
            }
        );
        assert_eq!(stats.counters().unwrap(), counters);
    }

    #[test]
    fn test_time_saved_rounds_up() {
        let stats = StatsAggregator::new(Arc::new(MemoryStore::new()));
        assert_eq!(stats.increment(1).unwrap().time_saved_estimate, 1);
        assert_eq!(stats.increment(0).unwrap().time_saved_estimate, 1);
    }

    #[test]
    fn test_survives_new_aggregator() {
        let store: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        StatsAggregator::new(store.clone()).increment(5).unwrap();
        let counters = StatsAggregator::new(store).counters().unwrap();
        assert_eq!(counters.files_processed, 5);
        assert_eq!(counters.time_saved_estimate, 3);
    }

    #[test]
    fn test_unreadable_counter_reads_zero() {
        let store = Arc::new(MemoryStore::new());
        store.set(FILES_PROCESSED_KEY, "lots").unwrap();
        let stats = StatsAggregator::new(store);
        assert_eq!(stats.counters().unwrap().files_processed, 0);
    }

    #[test]
    fn test_failed_write_keeps_counters_consistent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let stats = StatsAggregator::new(Arc::new(JsonFileStore::open(&path).unwrap()));
        let before = stats.increment(2).unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        assert!(stats.increment(3).is_err());
        assert_eq!(stats.counters().unwrap(), before);
        assert_eq!(
            before,
            StatsCounters {
                total_conversions: 1,
                files_processed: 2,
                time_saved_estimate: 1,
            }
        );
    }
}
