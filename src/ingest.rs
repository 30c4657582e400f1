// Ingestion loop and per-digitizer dispatch
//
// Each digitizer gets a dedicated OS thread that owns its WindowEngine. The
// thread pulls event batches from a bounded channel, calls `process` once per
// batch and checks the cancellation token in between. On cancellation it
// keeps taking batches until its queue is closed, then performs the terminal
// flush exactly once.
//
// The Dispatcher sits between a PacketSource and the workers: it reads
// packets, starts a worker the first time a digitizer id shows up, and routes
// the events to it. Every queue is bounded, so a slow sink stalls its worker,
// then the dispatcher, then the source.

use crate::clock::Clock;
use crate::container::Container;
use crate::engine::{EngineStats, WindowEngine};
use crate::listener::EventPacket;
use crate::record::Record;
use crate::sink::Sink;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::thread::JoinHandle;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub type IngestResult<T> = Result<T, IngestError>;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Sink failed for digitizer {digitizer_id}: {source}")]
    Sink {
        digitizer_id: u32,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Engine setup failed for digitizer {digitizer_id}: {message}")]
    Setup { digitizer_id: u32, message: String },

    #[error("Worker thread for digitizer {0} panicked")]
    WorkerPanicked(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What one worker did over its lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub digitizer_id: u32,
    pub batches_received: u64,
    pub events_processed: u64,
    pub engine: EngineStats,
}

/// Drive `engine` from `receiver` until cancelled or disconnected
///
/// After the token fires, batches keep being processed until every sender is
/// dropped, so the caller must close the channel to end the loop. Then
/// `flush` runs once, also when `process` failed, so buffered records get a
/// last chance.
pub fn run_ingest_loop<R, C, S, K>(
    engine: &mut WindowEngine<R, C, S, K>,
    receiver: &Receiver<Vec<R>>,
    token: &CancellationToken,
    poll: Duration,
) -> IngestResult<IngestSummary>
where
    R: Record,
    C: Container<R>,
    S: Sink<R>,
    K: Clock,
{
    let digitizer_id = engine.digitizer_id();
    let mut summary = IngestSummary {
        digitizer_id,
        batches_received: 0,
        events_processed: 0,
        engine: EngineStats::default(),
    };
    let mut failure = None;

    while !token.is_cancelled() {
        match receiver.recv_timeout(poll) {
            Ok(events) => {
                if let Err(e) = process_batch(engine, events, &mut summary) {
                    failure = Some(e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                log::debug!("Digitizer {}: ingest channel closed", digitizer_id);
                break;
            }
        }
    }

    if failure.is_none() && token.is_cancelled() {
        // An idle queue is not a closed one: the dispatcher may be stalled on
        // another digitizer while still holding packets for this one.
        while let Ok(events) = receiver.recv() {
            if let Err(e) = process_batch(engine, events, &mut summary) {
                failure = Some(e);
                break;
            }
        }
    }

    let flushed = engine.flush().map_err(|e| IngestError::Sink {
        digitizer_id,
        source: Box::new(e),
    });
    summary.engine = engine.stats();

    if let Some(e) = failure {
        return Err(e);
    }
    flushed?;

    log::info!(
        "Digitizer {}: ingest finished, {} events in {} batches",
        digitizer_id,
        summary.events_processed,
        summary.engine.batches_delivered
    );
    Ok(summary)
}

fn process_batch<R, C, S, K>(
    engine: &mut WindowEngine<R, C, S, K>,
    events: Vec<R>,
    summary: &mut IngestSummary,
) -> IngestResult<()>
where
    R: Record,
    C: Container<R>,
    S: Sink<R>,
    K: Clock,
{
    summary.batches_received += 1;
    match engine.process(events) {
        Ok(n) => {
            summary.events_processed += n as u64;
            Ok(())
        }
        Err(e) => {
            log::error!("Digitizer {}: {}", engine.digitizer_id(), e);
            Err(IngestError::Sink {
                digitizer_id: engine.digitizer_id(),
                source: Box::new(e),
            })
        }
    }
}

/// Queue sizes and timing shared by every worker
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    /// Batches buffered per digitizer before the dispatcher blocks
    pub queue_depth: usize,
    /// How often idle loops re-check cancellation
    pub poll_interval: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_depth: 1024,
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Outcome of a dispatcher run
#[derive(Debug, Default)]
pub struct DispatchReport {
    pub packets_routed: u64,
    pub packets_dropped: u64,
    pub workers: Vec<(u32, IngestResult<IngestSummary>)>,
}

impl DispatchReport {
    pub fn is_success(&self) -> bool {
        self.workers.iter().all(|(_, r)| r.is_ok())
    }

    pub fn events_processed(&self) -> u64 {
        self.workers
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .map(|s| s.events_processed)
            .sum()
    }
}

struct Worker<R> {
    sender: Sender<Vec<R>>,
    handle: JoinHandle<IngestResult<IngestSummary>>,
}

/// Routes packets to one engine thread per digitizer
pub struct Dispatcher<R, F> {
    factory: F,
    config: DispatchConfig,
    token: CancellationToken,
    workers: HashMap<u32, Worker<R>>,
    failed: HashSet<u32>,
    report: DispatchReport,
}

impl<R, C, S, K, F> Dispatcher<R, F>
where
    R: Record,
    C: Container<R> + Send + 'static,
    S: Sink<R> + Send + 'static,
    K: Clock + Send + 'static,
    F: FnMut(u32) -> IngestResult<WindowEngine<R, C, S, K>>,
{
    /// `factory` builds the engine for a digitizer id on its first packet
    pub fn new(factory: F, config: DispatchConfig, token: CancellationToken) -> Self {
        Self {
            factory,
            config,
            token,
            workers: HashMap::new(),
            failed: HashSet::new(),
            report: DispatchReport::default(),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Route packets until cancelled or the source hangs up, then shut down
    pub fn run(mut self, packets: Receiver<EventPacket<R>>) -> DispatchReport {
        while !self.token.is_cancelled() {
            match packets.recv_timeout(self.config.poll_interval) {
                Ok(packet) => self.route(packet),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::info!("Packet source closed, shutting down dispatcher");
                    break;
                }
            }
        }

        // Whatever the source already queued still belongs to the session.
        // Worker queues stay open until `shutdown`, so none of it is dropped
        // while routing waits on a slow digitizer.
        for packet in packets.try_iter() {
            self.route(packet);
        }

        self.shutdown()
    }

    /// Send one packet to its digitizer's worker, starting it if needed
    pub fn route(&mut self, packet: EventPacket<R>) {
        let digitizer_id = packet.digitizer_id;
        if self.failed.contains(&digitizer_id) {
            self.report.packets_dropped += 1;
            return;
        }

        if !self.workers.contains_key(&digitizer_id) {
            match self.spawn_worker(digitizer_id) {
                Ok(worker) => {
                    self.workers.insert(digitizer_id, worker);
                }
                Err(e) => {
                    log::error!("{}", e);
                    self.failed.insert(digitizer_id);
                    self.report.workers.push((digitizer_id, Err(e)));
                    self.report.packets_dropped += 1;
                    return;
                }
            }
        }

        let Some(worker) = self.workers.get(&digitizer_id) else {
            return;
        };
        if worker.sender.send(packet.events).is_err() {
            log::error!("Digitizer {}: worker stopped, dropping packet", digitizer_id);
            self.report.packets_dropped += 1;
            return;
        }
        self.report.packets_routed += 1;
    }

    fn spawn_worker(&mut self, digitizer_id: u32) -> IngestResult<Worker<R>> {
        let mut engine = (self.factory)(digitizer_id)?;
        let (sender, receiver) = channel::bounded(self.config.queue_depth);
        let token = self.token.clone();
        let poll = self.config.poll_interval;

        let handle = std::thread::Builder::new()
            .name(format!("digitizer-{}", digitizer_id))
            .spawn(move || run_ingest_loop(&mut engine, &receiver, &token, poll))?;

        log::info!("Started writer thread for digitizer {}", digitizer_id);
        Ok(Worker { sender, handle })
    }

    /// Close every worker queue and wait for the terminal flushes
    pub fn shutdown(mut self) -> DispatchReport {
        let mut workers: Vec<(u32, Worker<R>)> = self.workers.drain().collect();
        workers.sort_by_key(|(id, _)| *id);

        for (digitizer_id, worker) in workers {
            drop(worker.sender);
            let result = worker
                .handle
                .join()
                .unwrap_or(Err(IngestError::WorkerPanicked(digitizer_id)));
            self.report.workers.push((digitizer_id, result));
        }

        self.report.workers.sort_by_key(|(id, _)| *id);
        self.report
    }
}
