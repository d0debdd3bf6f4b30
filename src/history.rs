//! Bounded parse history owned by the caller.
//!
//! Nothing here is global: a UI or batch driver keeps one [`ParseHistory`]
//! and hands it to [`crate::convert::convert_with_history`], which appends a
//! record per request.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default number of records kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 5;

/// One finished request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub filename: String,
    /// Method identifier, the error kind for a failed cascade, or `none`
    /// when the request failed before extraction.
    pub method: String,
    pub success: bool,
    pub elapsed_secs: f64,
}

/// Most-recent-last log that evicts its oldest record when full.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseHistory {
    capacity: usize,
    records: VecDeque<HistoryRecord>,
}

impl Default for ParseHistory {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }
}

impl ParseHistory {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, record: HistoryRecord) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&HistoryRecord> {
        self.records.back()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}
