/// JSON Lines sink
///
/// Writes one JSON object per delivered batch:
/// `{"digitizer":137,"timestamp":1700000000000,"count":2,"events":[...]}`.
/// The writer is flushed after every batch so the sink blocks on the disk
/// rather than on an in-process buffer.
use super::{Sink, SinkError, SinkResult};
use crate::record::Record;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;

#[derive(Serialize)]
struct BatchLine<'a, R> {
    digitizer: u32,
    timestamp: u64,
    count: usize,
    events: &'a [R],
}

pub struct JsonLinesSink<W: Write> {
    writer: W,
    lines_written: u64,
}

impl JsonLinesSink<BufWriter<File>> {
    /// Open `path` for appending, creating it if needed
    pub fn create(path: &Path) -> SinkResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        log::info!("Writing JSON lines batches to {}", path.display());
        Ok(Self::new(BufWriter::new(file)))
    }
}

impl<W: Write> JsonLinesSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            lines_written: 0,
        }
    }

    pub fn lines_written(&self) -> u64 {
        self.lines_written
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<R, W> Sink<R> for JsonLinesSink<W>
where
    R: Record + Serialize,
    W: Write,
{
    type Error = SinkError;

    fn write(
        &mut self,
        batch: &[R],
        digitizer_id: u32,
        window_timestamp: u64,
    ) -> Result<(), Self::Error> {
        let line = BatchLine {
            digitizer: digitizer_id,
            timestamp: window_timestamp,
            count: batch.len(),
            events: batch,
        };
        serde_json::to_writer(&mut self.writer, &line)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.lines_written += 1;
        Ok(())
    }

    fn format_name(&self) -> &str {
        "jsonl"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ListElement422;
    use tempfile::TempDir;

    #[test]
    fn test_one_line_per_batch() {
        let mut sink = JsonLinesSink::new(Vec::new());
        let batch = [ListElement422::new(1, 10, 3), ListElement422::new(2, 11, 4)];
        Sink::<ListElement422>::write(&mut sink, &batch, 137, 1_700_000_000_000).unwrap();
        Sink::<ListElement422>::write(&mut sink, &[], 137, 0).unwrap();
        assert_eq!(sink.lines_written(), 2);

        let text = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first["digitizer"], 137);
        assert_eq!(first["timestamp"], 1_700_000_000_000u64);
        assert_eq!(first["count"], 2);
        assert_eq!(first["events"][1]["channel"], 2);

        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["count"], 0);
        assert!(second["events"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_create_appends() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("out.jsonl");

        for _ in 0..2 {
            let mut sink = JsonLinesSink::create(&path).unwrap();
            Sink::<ListElement422>::write(&mut sink, &[ListElement422::new(0, 1, 1)], 1, 5)
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
