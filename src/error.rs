use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    #[error("Container capacity must be at least 1")]
    ZeroCapacity,

    #[error("Channel count must be at least 1")]
    ZeroChannels,
}

/// Returned by [`crate::Container::insert`] when the container is full.
///
/// The rejected record travels back to the caller so it can be retried
/// after the container has been flushed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Container capacity of {capacity} records exceeded")]
pub struct CapacityExceeded<R> {
    pub record: R,
    pub capacity: usize,
}

impl<R> CapacityExceeded<R> {
    pub fn into_record(self) -> R {
        self.record
    }
}

/// Failure while classifying records or delivering a window.
#[derive(Error, Debug)]
pub enum ProcessError<E> {
    #[error("Sink error: {0}")]
    Sink(#[source] E),

    #[error("Container refused a record after being flushed (capacity {capacity})")]
    Readmission { capacity: usize },
}

impl<E> ProcessError<E> {
    pub fn into_sink_error(self) -> Option<E> {
        match self {
            ProcessError::Sink(e) => Some(e),
            ProcessError::Readmission { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
