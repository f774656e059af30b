//! Activation timing records, for checking consistency guarantees

use crate::cluster::MachineId;
use crate::graph::VertexId;
use parking_lot::Mutex;
use std::time::Instant;

/// Wall-clock span during which an activation held its locks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActivationRecord {
    pub vertex: VertexId,
    pub machine: MachineId,
    pub started: Instant,
    pub finished: Instant,
}

impl ActivationRecord {
    pub fn overlaps(&self, other: &ActivationRecord) -> bool {
        self.started < other.finished && other.started < self.finished
    }
}

#[derive(Debug, Default)]
pub struct ActivationLog {
    records: Mutex<Vec<ActivationRecord>>,
}

impl ActivationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: ActivationRecord) {
        self.records.lock().push(record);
    }

    pub fn take(&self) -> Vec<ActivationRecord> {
        std::mem::take(&mut *self.records.lock())
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
