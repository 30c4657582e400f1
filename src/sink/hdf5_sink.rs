/// HDF5 sink
///
/// Layout: one group per digitizer (`/digitizer_<id>`), one dataset per
/// delivered batch named after the epoch timestamp. An epoch split by a
/// capacity flush gets `<timestamp>_<n>` for the follow-up deliveries.
/// Each dataset is an `N x 3` u64 table of channel, local time and charge.
///
/// NOTE: requires the `hdf5-support` feature and a compatible HDF5 library.
use super::{Sink, SinkError, SinkResult};
use crate::record::ListElement422;
use hdf5::{File as H5File, Group};
use std::collections::HashMap;
use std::path::Path;

const COLUMNS: usize = 3;

/// A digitizer delivers into at most two epochs at a time: `current` and
/// the `next` window that overflowed before the swap.
const LIVE_EPOCHS: usize = 2;

/// Per-digitizer delivery counters for the epochs still receiving batches
///
/// Once a third timestamp shows up the oldest one has been swapped out and
/// its counter is dropped.
#[derive(Debug, Default)]
struct EpochCounters {
    live: HashMap<u32, Vec<(u64, u32)>>,
}

impl EpochCounters {
    /// Returns how many batches of this epoch were counted before, then counts one more
    fn bump(&mut self, digitizer_id: u32, window_timestamp: u64) -> u32 {
        let epochs = self.live.entry(digitizer_id).or_default();
        if let Some((_, seen)) = epochs.iter_mut().find(|(ts, _)| *ts == window_timestamp) {
            *seen += 1;
            return *seen - 1;
        }
        if epochs.len() == LIVE_EPOCHS {
            epochs.remove(0);
        }
        epochs.push((window_timestamp, 1));
        0
    }

    fn tracked(&self) -> usize {
        self.live.values().map(Vec::len).sum()
    }
}

pub struct Hdf5Sink {
    file: H5File,
    deliveries: EpochCounters,
}

impl Hdf5Sink {
    pub fn create(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = H5File::append(path)
            .map_err(|e| SinkError::Write(format!("Failed to open HDF5 file: {}", e)))?;
        log::info!("Writing HDF5 batches to {}", path.display());
        Ok(Self {
            file,
            deliveries: EpochCounters::default(),
        })
    }

    /// Next free dataset name for an epoch, also across appended runs
    fn dataset_name(&mut self, group: &Group, digitizer_id: u32, window_timestamp: u64) -> String {
        loop {
            let name = match self.deliveries.bump(digitizer_id, window_timestamp) {
                0 => window_timestamp.to_string(),
                n => format!("{}_{}", window_timestamp, n),
            };
            if !group.link_exists(&name) {
                return name;
            }
        }
    }
}

impl Sink<ListElement422> for Hdf5Sink {
    type Error = SinkError;

    fn write(
        &mut self,
        batch: &[ListElement422],
        digitizer_id: u32,
        window_timestamp: u64,
    ) -> Result<(), Self::Error> {
        if batch.is_empty() {
            return Ok(());
        }

        let group_name = format!("digitizer_{}", digitizer_id);
        let group = match self.file.group(&group_name) {
            Ok(group) => group,
            Err(_) => self
                .file
                .create_group(&group_name)
                .map_err(|e| SinkError::Write(format!("Failed to create {}: {}", group_name, e)))?,
        };

        let name = self.dataset_name(&group, digitizer_id, window_timestamp);
        let table: Vec<u64> = batch
            .iter()
            .flat_map(|e| [e.channel as u64, e.local_time as u64, e.charge as u64])
            .collect();

        let dataset = group
            .new_dataset::<u64>()
            .shape([batch.len(), COLUMNS])
            .create(name.as_str())
            .map_err(|e| SinkError::Write(format!("Failed to create dataset {}: {}", name, e)))?;

        dataset
            .write_raw(&table)
            .map_err(|e| SinkError::Write(format!("Failed to write dataset {}: {}", name, e)))?;

        dataset
            .new_attr::<u64>()
            .create("window_timestamp")
            .and_then(|attr| attr.write_scalar(&window_timestamp))
            .map_err(|e| SinkError::Write(format!("Failed to write timestamp: {}", e)))?;

        self.file
            .flush()
            .map_err(|e| SinkError::Write(format!("Failed to flush HDF5 file: {}", e)))?;

        Ok(())
    }

    fn format_name(&self) -> &str {
        "hdf5"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_number_split_epochs() {
        let mut counters = EpochCounters::default();
        assert_eq!(counters.bump(1, 100), 0);
        assert_eq!(counters.bump(1, 100), 1);
        assert_eq!(counters.bump(1, 100), 2);
        assert_eq!(counters.bump(2, 100), 0);
    }

    #[test]
    fn test_counters_survive_overflow_of_next_before_swap() {
        let mut counters = EpochCounters::default();
        assert_eq!(counters.bump(1, 100), 0);
        // `next` overflows, then the swap delivers the rest of `current`.
        assert_eq!(counters.bump(1, 200), 0);
        assert_eq!(counters.bump(1, 100), 1);
        assert_eq!(counters.bump(1, 200), 1);
    }

    #[test]
    fn test_counters_forget_swapped_out_epochs() {
        let mut counters = EpochCounters::default();
        for epoch in 0..1_000u64 {
            counters.bump(1, epoch);
            counters.bump(1, epoch);
            counters.bump(3, epoch);
        }
        assert_eq!(counters.tracked(), 2 * LIVE_EPOCHS);
        assert_eq!(counters.bump(1, 999), 2);
    }

    #[test]
    fn test_appended_file_gets_fresh_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("digitizer_1.h5");
        let batch = [ListElement422::new(0, 5, 9)];

        for _ in 0..2 {
            let mut sink = Hdf5Sink::create(&path).unwrap();
            sink.write(&batch, 1, 0).unwrap();
        }

        let file = H5File::open(&path).unwrap();
        let group = file.group("digitizer_1").unwrap();
        assert!(group.link_exists("0"));
        assert!(group.link_exists("0_1"));
    }
}
