// Event packet sources feeding the ingestion pipeline
//
// A source produces `EventPacket`s (one digitizer, one readout) and forwards
// them into a bounded crossbeam channel. When the channel is full the source
// waits, so a slow sink propagates back to the network socket.
//
// Current implementations:
// - UDP: one JSON-encoded packet per datagram
// - Replay: JSON lines file of packets, for offline runs and tests

mod replay;
mod udp;

use crate::record::ListElement422;
use async_trait::async_trait;
use crossbeam::channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub use replay::ReplaySource;
pub use udp::UdpListener;

/// Result type for listener operations
pub type ListenResult<T> = Result<T, ListenError>;

#[derive(Debug, Error)]
pub enum ListenError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Not connected")]
    NotConnected,
}

/// Events read out from one digitizer in one go
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventPacket<R = ListElement422> {
    pub digitizer_id: u32,
    #[serde(default)]
    pub events: Vec<R>,
}

impl EventPacket<ListElement422> {
    pub fn decode(data: &[u8]) -> ListenResult<Self> {
        serde_json::from_slice(data).map_err(|e| ListenError::Parse(format!("Invalid packet: {}", e)))
    }
}

/// Counters reported by a source when it stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceStats {
    pub packets_forwarded: u64,
    pub events_forwarded: u64,
    pub packets_malformed: u64,
}

/// Trait for packet sources
#[async_trait]
pub trait PacketSource: Send {
    /// Bind or open the underlying resource
    async fn connect(&mut self) -> ListenResult<()>;

    /// Forward packets until the token is cancelled, the input ends or the
    /// receiving side of `sender` is dropped
    async fn run(
        &mut self,
        sender: Sender<EventPacket>,
        token: CancellationToken,
    ) -> ListenResult<SourceStats>;

    fn is_connected(&self) -> bool;

    /// Human-readable location of the source for log lines
    fn describe(&self) -> String;
}

/// Push a packet into the pipeline, waiting on a blocking thread if full.
///
/// Returns `false` once the receiver is gone.
pub(crate) async fn forward(sender: &Sender<EventPacket>, packet: EventPacket) -> bool {
    match sender.try_send(packet) {
        Ok(()) => true,
        Err(TrySendError::Disconnected(_)) => false,
        Err(TrySendError::Full(packet)) => {
            log::debug!("Ingest queue full, waiting for the writer");
            let sender = sender.clone();
            matches!(
                tokio::task::spawn_blocking(move || sender.send(packet)).await,
                Ok(Ok(()))
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_packet() {
        let data = br#"{"digitizer_id":137,"events":[{"local_time":5,"channel":2,"charge":40}]}"#;
        let packet = EventPacket::decode(data).unwrap();
        assert_eq!(packet.digitizer_id, 137);
        assert_eq!(packet.events, vec![ListElement422::new(2, 5, 40)]);
    }

    #[test]
    fn test_decode_packet_without_events() {
        let packet = EventPacket::decode(br#"{"digitizer_id":1}"#).unwrap();
        assert!(packet.events.is_empty());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            EventPacket::decode(b"\x00\x01"),
            Err(ListenError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_forward_waits_for_room() {
        let (tx, rx) = crossbeam::channel::bounded(1);
        let packet = EventPacket {
            digitizer_id: 1,
            events: vec![],
        };
        assert!(forward(&tx, packet.clone()).await);

        let drain = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            let first = rx.recv().unwrap();
            let second = rx.recv().unwrap();
            (first, second)
        });
        assert!(forward(&tx, packet.clone()).await);
        let (first, second) = drain.join().unwrap();
        assert_eq!(first, packet);
        assert_eq!(second, packet);
    }

    #[tokio::test]
    async fn test_forward_reports_disconnect() {
        let (tx, rx) = crossbeam::channel::bounded::<EventPacket>(1);
        drop(rx);
        let packet = EventPacket {
            digitizer_id: 1,
            events: vec![],
        };
        assert!(!forward(&tx, packet).await);
    }
}
