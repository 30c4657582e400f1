/// Persistence sinks
///
/// A sink receives one finished batch per call: the records of a window, the
/// digitizer they came from and the wall-clock timestamp of the epoch. The
/// batch is a borrowed slice of engine-owned storage that is cleared as soon
/// as `write` returns, so a sink keeps only what it copies.
///
/// Batches may be empty (terminal flush, swaps of an idle window); every
/// sink must accept them. A sink blocks for as long as its I/O takes, which
/// is how a slow disk throttles ingestion.
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

#[cfg(feature = "hdf5-support")]
pub mod hdf5_sink;
pub mod jsonl;
pub mod memory;

#[cfg(feature = "hdf5-support")]
pub use hdf5_sink::Hdf5Sink;
pub use jsonl::JsonLinesSink;
pub use memory::{DeliveredBatch, MemorySink};

pub type SinkResult<T> = Result<T, SinkError>;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Write error: {0}")]
    Write(String),
}

/// Trait that all persistence sinks implement
pub trait Sink<R: Record> {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist one batch
    ///
    /// # Arguments
    /// * `batch` - Records of one window delivery, possibly empty
    /// * `digitizer_id` - Identity passed through unchanged from the engine
    /// * `window_timestamp` - Epoch wall-clock time in ms, 0 if never observed
    fn write(
        &mut self,
        batch: &[R],
        digitizer_id: u32,
        window_timestamp: u64,
    ) -> Result<(), Self::Error>;

    /// Short format name used in log lines
    fn format_name(&self) -> &str;
}

impl<R: Record, S: Sink<R> + ?Sized> Sink<R> for Box<S> {
    type Error = S::Error;

    fn write(
        &mut self,
        batch: &[R],
        digitizer_id: u32,
        window_timestamp: u64,
    ) -> Result<(), Self::Error> {
        (**self).write(batch, digitizer_id, window_timestamp)
    }

    fn format_name(&self) -> &str {
        (**self).format_name()
    }
}

/// On-disk output formats supported by the daemon
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkFormat {
    #[default]
    Jsonl,
    Hdf5,
}

impl SinkFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            SinkFormat::Jsonl => "jsonl",
            SinkFormat::Hdf5 => "h5",
        }
    }

    pub fn is_available(&self) -> bool {
        match self {
            SinkFormat::Jsonl => true,
            SinkFormat::Hdf5 => cfg!(feature = "hdf5-support"),
        }
    }

    /// File that stores the batches of one digitizer
    pub fn output_path(&self, dir: &Path, digitizer_id: u32) -> std::path::PathBuf {
        dir.join(format!("digitizer_{}.{}", digitizer_id, self.extension()))
    }
}

impl fmt::Display for SinkFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for SinkFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jsonl" | "json" => Ok(SinkFormat::Jsonl),
            "hdf5" | "h5" => Ok(SinkFormat::Hdf5),
            other => Err(format!(
                "Unknown output format '{}': expected 'jsonl' or 'hdf5'",
                other
            )),
        }
    }
}

/// Sink type the daemon writes [`crate::ListElement422`] batches through
pub type BoxedSink = Box<dyn Sink<crate::ListElement422, Error = SinkError> + Send>;

/// Factory for the daemon's per-digitizer sinks
pub struct SinkFactory;

impl SinkFactory {
    /// Open the output file of `digitizer_id` inside `dir`
    pub fn create(format: SinkFormat, dir: &Path, digitizer_id: u32) -> SinkResult<BoxedSink> {
        let path = format.output_path(dir, digitizer_id);
        match format {
            SinkFormat::Jsonl => Ok(Box::new(JsonLinesSink::create(&path)?)),
            #[cfg(feature = "hdf5-support")]
            SinkFormat::Hdf5 => Ok(Box::new(Hdf5Sink::create(&path)?)),
            #[cfg(not(feature = "hdf5-support"))]
            SinkFormat::Hdf5 => Err(SinkError::UnsupportedFormat(
                "HDF5 support not enabled. Rebuild with --features hdf5-support".to_string(),
            )),
        }
    }
}
