/// In-memory sink that keeps an owned copy of every delivered batch.
use super::Sink;
use crate::record::Record;
use serde::Serialize;
use std::convert::Infallible;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveredBatch<R> {
    pub digitizer_id: u32,
    pub window_timestamp: u64,
    pub records: Vec<R>,
}

#[derive(Debug, Clone)]
pub struct MemorySink<R> {
    batches: Vec<DeliveredBatch<R>>,
}

impl<R: Record> MemorySink<R> {
    pub fn new() -> Self {
        Self {
            batches: Vec::new(),
        }
    }

    pub fn batches(&self) -> &[DeliveredBatch<R>] {
        &self.batches
    }

    pub fn into_batches(self) -> Vec<DeliveredBatch<R>> {
        self.batches
    }

    /// Total number of records across all batches
    pub fn record_count(&self) -> usize {
        self.batches.iter().map(|b| b.records.len()).sum()
    }

    /// Batches that actually carried records
    pub fn non_empty(&self) -> impl Iterator<Item = &DeliveredBatch<R>> {
        self.batches.iter().filter(|b| !b.records.is_empty())
    }
}

impl<R: Record> Default for MemorySink<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> Sink<R> for MemorySink<R> {
    type Error = Infallible;

    fn write(
        &mut self,
        batch: &[R],
        digitizer_id: u32,
        window_timestamp: u64,
    ) -> Result<(), Self::Error> {
        self.batches.push(DeliveredBatch {
            digitizer_id,
            window_timestamp,
            records: batch.to_vec(),
        });
        Ok(())
    }

    fn format_name(&self) -> &str {
        "memory"
    }
}
