use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::store::{KeyValueStore, StoreError};

pub const HISTORY_KEY: &str = "conversionHistory";
pub const DEFAULT_HISTORY_LIMIT: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub original_name: String,
    pub format: String,
    pub timestamp_millis: i64,
}

impl HistoryRecord {
    /// Record stamped with the current wall-clock time.
    pub fn now(original_name: impl Into<String>, format: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            format: format.into(),
            timestamp_millis: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Capped, most-recent-first log of past conversions.
pub struct HistoryStore {
    store: Arc<dyn KeyValueStore>,
    limit: usize,
}

impl HistoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, limit: usize) -> Self {
        Self { store, limit }
    }

    /// Missing, empty or unreadable values read as an empty history.
    pub fn records(&self) -> Result<Vec<HistoryRecord>, StoreError> {
        let Some(raw) = self.store.get(HISTORY_KEY)? else {
            return Ok(Vec::new());
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        match serde_json::from_str(&raw) {
            Ok(records) => Ok(records),
            Err(e) => {
                log::warn!("Discarding unreadable conversion history: {}", e);
                Ok(Vec::new())
            }
        }
    }

    /// Prepend, keep the newest `limit` entries, persist.
    pub fn add(&self, record: HistoryRecord) -> Result<(), StoreError> {
        let mut records = self.records()?;
        records.insert(0, record);
        records.truncate(self.limit);
        self.store.set(HISTORY_KEY, &serde_json::to_string(&records)?)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(HISTORY_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn history() -> (HistoryStore, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (HistoryStore::new(store.clone(), DEFAULT_HISTORY_LIMIT), store)
    }

    fn record(i: usize) -> HistoryRecord {
        HistoryRecord {
            original_name: format!("file{i}.png"),
            format: "jpeg".into(),
            timestamp_millis: i as i64,
        }
    }

    #[test]
    fn test_most_recent_first() {
        let (history, _) = history();
        history.add(record(1)).unwrap();
        history.add(record(2)).unwrap();
        let records = history.records().unwrap();
        assert_eq!(records[0], record(2));
        assert_eq!(records[1], record(1));
    }

    #[test]
    fn test_cap_evicts_oldest() {
        let (history, _) = history();
        for i in 1..=21 {
            history.add(record(i)).unwrap();
        }
        let records = history.records().unwrap();
        assert_eq!(records.len(), 20);
        assert_eq!(records[0], record(21));
        assert!(!records.contains(&record(1)));
    }

    #[test]
    fn test_clear_returns_empty_default() {
        let (history, _) = history();
        history.add(record(1)).unwrap();
        history.clear().unwrap();
        assert!(history.records().unwrap().is_empty());
    }

    #[test]
    fn test_persisted_shape() {
        let (history, store) = history();
        history.add(record(7)).unwrap();
        let raw = store.get(HISTORY_KEY).unwrap().unwrap();
        assert_eq!(
            raw,
            r#"[{"originalName":"file7.png","format":"jpeg","timestampMillis":7}]"#
        );
    }

    #[test]
    fn test_tolerates_bad_values() {
        let (history, store) = history();
        store.set(HISTORY_KEY, "").unwrap();
        assert!(history.records().unwrap().is_empty());
        store.set(HISTORY_KEY, "{oops").unwrap();
        assert!(history.records().unwrap().is_empty());
        history.add(record(1)).unwrap();
        assert_eq!(history.records().unwrap().len(), 1);
    }

    #[test]
    fn test_now_stamps_time() {
        let r = HistoryRecord::now("a.png", "gif");
        assert!(r.timestamp_millis > 0);
    }
}
