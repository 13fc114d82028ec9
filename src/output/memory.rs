//! In-memory and composite sinks

use crate::output::traits::{OutputError, OutputResult, RecordSink};
use crate::record::ProductRecord;
use std::sync::Mutex;

/// Collects records in memory
///
/// Used for dry runs and tests.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<ProductRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record emitted so far, in emit order
    pub fn records(&self) -> Vec<ProductRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RecordSink for MemorySink {
    fn emit(&self, record: &ProductRecord) -> OutputResult<bool> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| OutputError::Write(format!("Failed to lock memory sink: {}", e)))?;
        records.push(record.clone());
        Ok(true)
    }

    fn name(&self) -> &str {
        "memory"
    }
}

/// Emits to a primary sink and then to secondary sinks
///
/// The primary decides the outcome: its error is returned, and a record it
/// reports as already present is not forwarded. Secondary failures are
/// logged and otherwise ignored.
pub struct FanoutSink {
    primary: Box<dyn RecordSink>,
    secondaries: Vec<Box<dyn RecordSink>>,
}

impl FanoutSink {
    pub fn new(primary: Box<dyn RecordSink>) -> Self {
        Self {
            primary,
            secondaries: Vec::new(),
        }
    }

    pub fn with_secondary(mut self, sink: Box<dyn RecordSink>) -> Self {
        self.secondaries.push(sink);
        self
    }
}

impl RecordSink for FanoutSink {
    fn emit(&self, record: &ProductRecord) -> OutputResult<bool> {
        if !self.primary.emit(record)? {
            return Ok(false);
        }

        for sink in &self.secondaries {
            if let Err(e) = sink.emit(record) {
                tracing::warn!(
                    "Secondary sink {} failed for {}: {}",
                    sink.name(),
                    record.source_url,
                    e
                );
            }
        }

        Ok(true)
    }

    fn name(&self) -> &str {
        self.primary.name()
    }
}
