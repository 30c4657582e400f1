//! Epoch windowing for multi-channel digitizer readout.
//!
//! Digitizer channels stamp events with free-running local clocks that
//! restart at every acquisition epoch. [`WindowEngine`] separates the epochs
//! without being told when a restart happens: it keeps a `current` and a
//! `next` window, routes each event by comparing its local time with the
//! per-channel high-water mark of the current epoch, and hands finished
//! windows to a [`Sink`].
//!
//! The [`listener`] and [`ingest`] modules wrap the engine into the
//! `daq-writer` daemon: packets arrive over UDP (or from a replay file), one
//! worker thread per digitizer drives its engine, and every window lands in
//! `digitizer_<id>.<ext>` under the output directory.

pub mod clock;
pub mod config;
pub mod container;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod listener;
pub mod record;
pub mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, WriterConfig};
pub use container::{BoundedVec, Container, ContainerKind, SortedBuffer};
pub use engine::{EngineStats, Window, WindowEngine};
pub use error::{CapacityExceeded, EngineError, ProcessError, Result};
pub use ingest::{
    run_ingest_loop, DispatchConfig, DispatchReport, Dispatcher, IngestError, IngestResult,
    IngestSummary,
};
pub use listener::{EventPacket, PacketSource, ReplaySource, UdpListener};
pub use record::{ListElement422, ListElement8222, Record};
pub use sink::{
    BoxedSink, DeliveredBatch, JsonLinesSink, MemorySink, Sink, SinkError, SinkFactory, SinkFormat,
};
