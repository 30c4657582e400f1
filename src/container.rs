// Bounded containers for windowed event records
//
// A container never grows past the capacity it was created with: `insert`
// hands the record back as `CapacityExceeded` instead, and the caller decides
// how to make room. Both implementations are backed by a `Vec` reserved up
// front, so a window's memory footprint is fixed for the whole session.

use crate::error::CapacityExceeded;
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Storage capability the windowing engine needs from a window container.
pub trait Container<R: Record> {
    /// Admit a record, or give it back when the container is full.
    fn insert(&mut self, record: R) -> Result<(), CapacityExceeded<R>>;

    fn clear(&mut self);

    fn len(&self) -> usize;

    fn capacity(&self) -> usize;

    /// Borrowed view of the stored records in container order.
    fn records(&self) -> &[R];

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn is_full(&self) -> bool {
        self.len() >= self.capacity()
    }
}

/// Container that keeps records in insertion order.
#[derive(Debug, Clone)]
pub struct BoundedVec<R> {
    items: Vec<R>,
    capacity: usize,
}

impl<R: Record> BoundedVec<R> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }
}

impl<R: Record> Container<R> for BoundedVec<R> {
    fn insert(&mut self, record: R) -> Result<(), CapacityExceeded<R>> {
        if self.items.len() >= self.capacity {
            return Err(CapacityExceeded {
                record,
                capacity: self.capacity,
            });
        }
        self.items.push(record);
        Ok(())
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn records(&self) -> &[R] {
        &self.items
    }
}

/// Container that keeps records ordered by `(local_time, channel)`.
///
/// Records with equal keys stay in arrival order and are all retained, so
/// a retransmitted event is stored twice rather than collapsed.
///
/// Storage is one contiguous `Vec`. A record at or past the last key is
/// appended in O(1); any other record shifts every later element, so an
/// insert costs O(k) for a record landing k places from the end. Streams
/// whose channels drift far apart inside one window approach O(n^2) per fill
/// and are better served by [`BoundedVec`] plus sorting on the sink side.
#[derive(Debug, Clone)]
pub struct SortedBuffer<R> {
    items: Vec<R>,
    capacity: usize,
}

impl<R: Record> SortedBuffer<R> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
            capacity,
        }
    }
}

impl<R: Record> Container<R> for SortedBuffer<R> {
    fn insert(&mut self, record: R) -> Result<(), CapacityExceeded<R>> {
        if self.items.len() >= self.capacity {
            return Err(CapacityExceeded {
                record,
                capacity: self.capacity,
            });
        }
        let key = (record.local_time(), record.channel());
        if self
            .items
            .last()
            .map_or(true, |last| (last.local_time(), last.channel()) <= key)
        {
            self.items.push(record);
            return Ok(());
        }
        let pos = self
            .items
            .partition_point(|r| (r.local_time(), r.channel()) <= key);
        self.items.insert(pos, record);
        Ok(())
    }

    fn clear(&mut self) {
        self.items.clear();
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn records(&self) -> &[R] {
        &self.items
    }
}

impl<R: Record> Container<R> for Box<dyn Container<R> + Send> {
    fn insert(&mut self, record: R) -> Result<(), CapacityExceeded<R>> {
        (**self).insert(record)
    }

    fn clear(&mut self) {
        (**self).clear()
    }

    fn len(&self) -> usize {
        (**self).len()
    }

    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn records(&self) -> &[R] {
        (**self).records()
    }
}

/// Container implementation selected from configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerKind {
    /// Insertion order
    #[default]
    Vector,
    /// Ordered by local time, then channel; out-of-order inserts shift the tail
    Sorted,
}

impl ContainerKind {
    pub fn create<R: Record>(self, capacity: usize) -> Box<dyn Container<R> + Send> {
        match self {
            ContainerKind::Vector => Box::new(BoundedVec::new(capacity)),
            ContainerKind::Sorted => Box::new(SortedBuffer::new(capacity)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContainerKind::Vector => "vector",
            ContainerKind::Sorted => "sorted",
        }
    }
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContainerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vector" | "vec" => Ok(ContainerKind::Vector),
            "sorted" | "set" => Ok(ContainerKind::Sorted),
            other => Err(format!(
                "Unknown container kind '{}': expected 'vector' or 'sorted'",
                other
            )),
        }
    }
}
