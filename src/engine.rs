// Two-window epoch engine
//
// Digitizer channels run free local clocks that restart at every acquisition
// epoch, and the hardware does not announce the restart. The engine keeps two
// windows, `current` and `next`. A record whose local time is above the
// current window's high-water mark for its channel extends the current epoch;
// anything else (including an equal value) is taken as a clock restart and
// goes to `next`. Once a call has routed anything to `next`, the current
// window is delivered and the two windows trade roles.
//
// A full container is delivered and cleared on the spot, then the record is
// inserted again, so memory stays at one container per window.

use crate::clock::{Clock, SystemClock};
use crate::container::Container;
use crate::error::{EngineError, ProcessError, Result};
use crate::record::Record;
use crate::sink::Sink;
use serde::{Deserialize, Serialize};

/// One accumulation epoch in progress
#[derive(Debug)]
pub struct Window<R: Record, C> {
    container: C,
    high_water: Vec<R::Time>,
    timestamp: u64,
}

impl<R: Record, C: Container<R>> Window<R, C> {
    fn new(container: C, channels: usize) -> Self {
        Self {
            container,
            high_water: vec![R::Time::default(); channels],
            timestamp: 0,
        }
    }

    pub fn container(&self) -> &C {
        &self.container
    }

    pub fn records(&self) -> &[R] {
        self.container.records()
    }

    pub fn len(&self) -> usize {
        self.container.len()
    }

    pub fn is_empty(&self) -> bool {
        self.container.is_empty()
    }

    /// Highest local time seen per channel in this epoch
    pub fn high_water_marks(&self) -> &[R::Time] {
        &self.high_water
    }

    /// Wall-clock ms at which this epoch was first observed, 0 if not yet
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Clear the records, the high-water marks and the timestamp
    fn reset(&mut self) {
        self.container.clear();
        self.high_water.fill(R::Time::default());
        self.timestamp = 0;
    }
}

/// Counters describing what an engine has done so far
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    pub events_processed: u64,
    pub events_rejected: u64,
    pub batches_delivered: u64,
    pub overflow_flushes: u64,
    pub swaps: u64,
}

/// Windowing engine for one digitizer.
///
/// Not thread-safe by itself: drive it from a single thread, calling
/// [`WindowEngine::process`] repeatedly and [`WindowEngine::flush`] once at
/// shutdown.
pub struct WindowEngine<R: Record, C, S, K = SystemClock> {
    current: Window<R, C>,
    next: Window<R, C>,
    sink: S,
    clock: K,
    digitizer_id: u32,
    channels: usize,
    stats: EngineStats,
}

impl<R, C, S> WindowEngine<R, C, S, SystemClock>
where
    R: Record,
    C: Container<R>,
    S: Sink<R>,
{
    /// Create an engine stamping new epochs with the system clock
    ///
    /// # Arguments
    /// * `sink` - Receives every finished batch
    /// * `digitizer_id` - Passed through unchanged to the sink
    /// * `channels` - Number of channels; records must have `channel < channels`
    /// * `make_container` - Called twice, once per window
    pub fn new<F>(sink: S, digitizer_id: u32, channels: usize, make_container: F) -> Result<Self>
    where
        F: FnMut() -> C,
    {
        Self::with_clock(sink, digitizer_id, channels, make_container, SystemClock)
    }
}

impl<R, C, S, K> WindowEngine<R, C, S, K>
where
    R: Record,
    C: Container<R>,
    S: Sink<R>,
    K: Clock,
{
    pub fn with_clock<F>(
        sink: S,
        digitizer_id: u32,
        channels: usize,
        mut make_container: F,
        clock: K,
    ) -> Result<Self>
    where
        F: FnMut() -> C,
    {
        if channels == 0 {
            return Err(EngineError::ZeroChannels);
        }

        let current = make_container();
        let next = make_container();
        for container in [&current, &next] {
            if container.capacity() == 0 {
                return Err(EngineError::ZeroCapacity);
            }
            if !container.is_empty() {
                return Err(EngineError::InvalidConfig(format!(
                    "window container must start empty, found {} records",
                    container.len()
                )));
            }
        }

        Ok(Self {
            current: Window::new(current, channels),
            next: Window::new(next, channels),
            sink,
            clock,
            digitizer_id,
            channels,
            stats: EngineStats::default(),
        })
    }

    /// Classify one batch of records and deliver whatever it completes
    ///
    /// Returns the number of records consumed. Records with an out-of-range
    /// channel are skipped and counted in [`EngineStats::events_rejected`].
    /// A sink error stops the batch immediately; the window being delivered
    /// keeps its records so a later call can retry.
    pub fn process<I>(&mut self, events: I) -> std::result::Result<usize, ProcessError<S::Error>>
    where
        I: IntoIterator<Item = R>,
    {
        let mut processed = 0;

        for record in events {
            let channel = record.channel();
            if channel >= self.channels {
                log::warn!(
                    "Digitizer {}: dropping event on channel {} (only {} channels)",
                    self.digitizer_id,
                    channel,
                    self.channels
                );
                self.stats.events_rejected += 1;
                continue;
            }

            let local_time = record.local_time();
            let window = if local_time > self.current.high_water[channel] {
                &mut self.current
            } else {
                if self.next.timestamp == 0 {
                    self.next.timestamp = self.clock.now_millis();
                }
                &mut self.next
            };
            window.high_water[channel] = local_time;

            admit(
                window,
                record,
                &mut self.sink,
                self.digitizer_id,
                &mut self.stats,
            )?;
            processed += 1;
            self.stats.events_processed += 1;
        }

        if !self.next.is_empty() {
            deliver(&self.current, &mut self.sink, self.digitizer_id, &mut self.stats)
                .map_err(ProcessError::Sink)?;
            self.current.reset();
            std::mem::swap(&mut self.current, &mut self.next);
            self.stats.swaps += 1;
            log::debug!(
                "Digitizer {}: clock reset detected, epoch {} now current with {} events",
                self.digitizer_id,
                self.current.timestamp,
                self.current.len()
            );
        }

        Ok(processed)
    }

    /// Deliver both windows and reset them, current first
    ///
    /// The sink is called twice even when both windows are empty.
    pub fn flush(&mut self) -> std::result::Result<(), S::Error> {
        deliver(&self.current, &mut self.sink, self.digitizer_id, &mut self.stats)?;
        self.current.reset();
        deliver(&self.next, &mut self.sink, self.digitizer_id, &mut self.stats)?;
        self.next.reset();
        log::debug!("Digitizer {}: flushed both windows", self.digitizer_id);
        Ok(())
    }

    pub fn current(&self) -> &Window<R, C> {
        &self.current
    }

    pub fn next(&self) -> &Window<R, C> {
        &self.next
    }

    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    pub fn digitizer_id(&self) -> u32 {
        self.digitizer_id
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Hand back the sink. Call [`WindowEngine::flush`] first or buffered
    /// records are dropped with the engine.
    pub fn into_sink(self) -> S {
        self.sink
    }
}

fn deliver<R, C, S>(
    window: &Window<R, C>,
    sink: &mut S,
    digitizer_id: u32,
    stats: &mut EngineStats,
) -> std::result::Result<(), S::Error>
where
    R: Record,
    C: Container<R>,
    S: Sink<R>,
{
    log::trace!(
        "Digitizer {}: delivering {} events (epoch {}) to {} sink",
        digitizer_id,
        window.len(),
        window.timestamp,
        sink.format_name()
    );
    sink.write(window.records(), digitizer_id, window.timestamp)?;
    stats.batches_delivered += 1;
    Ok(())
}

fn admit<R, C, S>(
    window: &mut Window<R, C>,
    record: R,
    sink: &mut S,
    digitizer_id: u32,
    stats: &mut EngineStats,
) -> std::result::Result<(), ProcessError<S::Error>>
where
    R: Record,
    C: Container<R>,
    S: Sink<R>,
{
    let rejected = match window.container.insert(record) {
        Ok(()) => return Ok(()),
        Err(full) => full,
    };

    log::debug!(
        "Digitizer {}: window {} full at {} events, flushing",
        digitizer_id,
        window.timestamp,
        rejected.capacity
    );
    deliver(window, sink, digitizer_id, stats).map_err(ProcessError::Sink)?;
    // High-water marks and timestamp survive: the epoch continues.
    window.container.clear();
    stats.overflow_flushes += 1;

    window
        .container
        .insert(rejected.into_record())
        .map_err(|e| ProcessError::Readmission {
            capacity: e.capacity,
        })
}
