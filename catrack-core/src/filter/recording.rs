//! Sink for candidate samples written by recording filters.

use serde::Serialize;
use std::sync::{Arc, Mutex, PoisonError};

/// One scored candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Candidate kind.
    pub kind: &'static str,
    /// Feature names.
    pub feature_names: &'static [&'static str],
    /// Feature values.
    pub features: Vec<f64>,
    /// Monte Carlo truth, if known.
    pub truth: Option<bool>,
    /// Weight of the inner filter, `None` if it rejected.
    pub weight: Option<f64>,
}

/// Thread-safe, cloneable collection of records shared by all events.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Recorder {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a record.
    pub fn record(&self, record: Record) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record);
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns true if no record is held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Removes and returns all records.
    #[must_use]
    pub fn drain(&self) -> Vec<Record> {
        std::mem::take(&mut *self.records.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
