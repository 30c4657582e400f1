// File-based packet source
//
// Replays a recorded session: each non-empty line of the file is one
// JSON-encoded EventPacket. Useful for:
// - Offline re-processing of captured readouts
// - Testing the writer without a digitizer on the network

use super::{forward, EventPacket, ListenError, ListenResult, PacketSource, SourceStats};
use async_trait::async_trait;
use crossbeam::channel::Sender;
use std::path::PathBuf;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader, Lines};
use tokio_util::sync::CancellationToken;

pub struct ReplaySource {
    path: PathBuf,
    lines: Option<Lines<BufReader<File>>>,
}

impl ReplaySource {
    pub fn new(path: PathBuf) -> Self {
        Self { path, lines: None }
    }
}

#[async_trait]
impl PacketSource for ReplaySource {
    async fn connect(&mut self) -> ListenResult<()> {
        if self.lines.is_some() {
            return Ok(());
        }

        log::info!("Opening replay file: {}", self.path.display());
        let file = File::open(&self.path).await?;
        self.lines = Some(BufReader::new(file).lines());
        Ok(())
    }

    async fn run(
        &mut self,
        sender: Sender<EventPacket>,
        token: CancellationToken,
    ) -> ListenResult<SourceStats> {
        if self.lines.is_none() {
            self.connect().await?;
        }
        let lines = self.lines.as_mut().ok_or(ListenError::NotConnected)?;

        let mut stats = SourceStats::default();
        let mut line_no = 0u64;

        loop {
            let line = tokio::select! {
                biased;

                _ = token.cancelled() => {
                    log::info!("Replay cancelled after {} lines", line_no);
                    break;
                }

                line = lines.next_line() => line?,
            };

            let Some(line) = line else {
                log::info!("Replay of {} finished", self.path.display());
                break;
            };
            line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            let packet = match EventPacket::decode(line.as_bytes()) {
                Ok(packet) => packet,
                Err(e) => {
                    log::error!("{}:{}: {}", self.path.display(), line_no, e);
                    stats.packets_malformed += 1;
                    continue;
                }
            };

            let events = packet.events.len() as u64;
            if !forward(&sender, packet).await {
                log::warn!("Ingest queue closed, stopping replay");
                break;
            }
            stats.packets_forwarded += 1;
            stats.events_forwarded += events;
        }

        Ok(stats)
    }

    fn is_connected(&self) -> bool {
        self.lines.is_some()
    }

    fn describe(&self) -> String {
        format!("file://{}", self.path.display())
    }
}
