//! Append-only record history
//!
//! Every record a tracer captures lands here, in capture order. Entries are only
//! ever removed all at once, by [`History::clear`].

use crate::record::ErrorRecord;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

/// Thread-safe, cloneable handle to a tracer's captured records
///
/// Clones share the same underlying storage.
#[derive(Debug, Clone, Default)]
pub struct History {
    records: Arc<Mutex<Vec<ErrorRecord>>>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<ErrorRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a record
    pub fn append(&self, record: ErrorRecord) {
        self.lock().push(record);
    }

    /// Copy of all records in capture order
    pub fn records(&self) -> Vec<ErrorRecord> {
        self.lock().clone()
    }

    /// Look up a record by its error id
    pub fn find(&self, error_id: &Uuid) -> Option<ErrorRecord> {
        self.lock().iter().find(|r| &r.error_id == error_id).cloned()
    }

    /// Count records matching filters
    ///
    /// # Arguments
    ///
    /// * `start_time` - Include records with timestamp >= start_time (ms)
    /// * `end_time` - Include records with timestamp <= end_time (ms)
    /// * `filter_func` - Custom filter function to apply to records
    pub fn count_records(
        &self,
        start_time: Option<i64>,
        end_time: Option<i64>,
        filter_func: Option<&dyn Fn(&ErrorRecord) -> bool>,
    ) -> usize {
        self.lock()
            .iter()
            .filter(|r| start_time.map_or(true, |start| r.timestamp >= start))
            .filter(|r| end_time.map_or(true, |end| r.timestamp <= end))
            .filter(|r| filter_func.map_or(true, |filter| filter(*r)))
            .count()
    }

    /// Get the last N record summaries
    pub fn last_n_summaries(&self, n: usize) -> Vec<String> {
        let records = self.lock();
        let start_idx = records.len().saturating_sub(n);
        records[start_idx..].iter().map(ErrorRecord::printable_summary).collect()
    }

    /// Remove every record
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
