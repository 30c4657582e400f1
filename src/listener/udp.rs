// UDP packet listener
//
// Binds a UDP socket and decodes each datagram as one JSON-encoded
// EventPacket. Datagrams that fail to decode are logged and skipped.

use super::{forward, EventPacket, ListenError, ListenResult, PacketSource, SourceStats};
use async_trait::async_trait;
use crossbeam::channel::Sender;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;

pub struct UdpListener {
    bind_addr: String,
    buffer_size: usize,
    socket: Option<UdpSocket>,
}

impl UdpListener {
    pub fn new(bind_addr: String, buffer_size: usize) -> Self {
        Self {
            bind_addr,
            buffer_size,
            socket: None,
        }
    }

    /// Address actually bound, useful when binding port 0
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }
}

#[async_trait]
impl PacketSource for UdpListener {
    async fn connect(&mut self) -> ListenResult<()> {
        if self.socket.is_some() {
            return Ok(());
        }

        log::info!("Binding UDP socket: {}", self.bind_addr);

        let socket = UdpSocket::bind(&self.bind_addr)
            .await
            .map_err(|e| ListenError::Network(format!("UDP bind failed: {}", e)))?;

        self.socket = Some(socket);
        Ok(())
    }

    async fn run(
        &mut self,
        sender: Sender<EventPacket>,
        token: CancellationToken,
    ) -> ListenResult<SourceStats> {
        if self.socket.is_none() {
            self.connect().await?;
        }
        let socket = self.socket.as_ref().ok_or(ListenError::NotConnected)?;

        log::info!("UDP listener started on {}", self.bind_addr);

        let mut stats = SourceStats::default();
        let mut buffer = vec![0u8; self.buffer_size];

        loop {
            let len = tokio::select! {
                biased;

                _ = token.cancelled() => {
                    log::info!("UDP listener cancelled");
                    break;
                }

                received = socket.recv(&mut buffer) => {
                    received.map_err(|e| ListenError::Network(format!("UDP receive failed: {}", e)))?
                }
            };

            let packet = match EventPacket::decode(&buffer[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    log::error!("Failed to decode UDP datagram: {}", e);
                    stats.packets_malformed += 1;
                    continue;
                }
            };

            let events = packet.events.len() as u64;
            if !forward(&sender, packet).await {
                log::warn!("Ingest queue closed, stopping UDP listener");
                break;
            }
            stats.packets_forwarded += 1;
            stats.events_forwarded += events;
        }

        Ok(stats)
    }

    fn is_connected(&self) -> bool {
        self.socket.is_some()
    }

    fn describe(&self) -> String {
        format!("udp://{}", self.bind_addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::ListElement422;
    use std::time::Duration;

    #[tokio::test]
    async fn test_udp_listener_forwards_packets() {
        let mut listener = UdpListener::new("127.0.0.1:0".to_string(), 8192);
        listener.connect().await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (tx, rx) = crossbeam::channel::bounded(16);
        let token = CancellationToken::new();
        let run_token = token.clone();
        let task = tokio::spawn(async move { listener.run(tx, run_token).await });

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"not json", addr).await.unwrap();
        client
            .send_to(
                br#"{"digitizer_id":3,"events":[{"local_time":9,"channel":1,"charge":2}]}"#,
                addr,
            )
            .await
            .unwrap();

        let packet = tokio::task::spawn_blocking(move || rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(packet.digitizer_id, 3);
        assert_eq!(packet.events, vec![ListElement422::new(1, 9, 2)]);

        token.cancel();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.packets_forwarded, 1);
        assert_eq!(stats.packets_malformed, 1);
    }
}
