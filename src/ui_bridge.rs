//! UDP JSON bridge to the presentation process.
//!
//! The presentation layer runs as a separate process and renders as a pure
//! function of the published state snapshots. Inbound datagrams are user
//! events; malformed JSON is logged and dropped.

use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::mpsc;

use crate::config::Config;
use crate::protocol::{UiRequest, UiUpdate};
use crate::state::SessionState;

/// Chunk size for illustration transfers, well under the ~64 KiB datagram
/// ceiling with JSON framing included.
const ILLUSTRATION_CHUNK_BYTES: usize = 48 * 1024;

pub struct UiBridge {
    socket: Arc<UdpSocket>,
    target_addr: String,
    buffer_size: usize,
    tx: mpsc::Sender<UiRequest>,
}

impl UiBridge {
    pub async fn new(config: &Config, tx: mpsc::Sender<UiRequest>) -> anyhow::Result<Self> {
        let socket = UdpSocket::bind(format!("0.0.0.0:{}", config.ui_local_port)).await?;
        let target_addr = format!("127.0.0.1:{}", config.ui_remote_port);

        Ok(Self {
            socket: Arc::new(socket),
            target_addr,
            buffer_size: config.ui_buffer_size,
            tx,
        })
    }

    pub async fn run(&self) -> anyhow::Result<()> {
        let mut buf = vec![0u8; self.buffer_size];
        loop {
            let (len, _) = self.socket.recv_from(&mut buf).await?;
            if len == 0 {
                continue;
            }
            match serde_json::from_slice::<UiRequest>(&buf[..len]) {
                Ok(request) => {
                    if self.tx.send(request).await.is_err() {
                        log::error!("UI request channel closed, stopping bridge");
                        break;
                    }
                }
                Err(e) => {
                    log::warn!("Dropping malformed UI datagram: {}", e);
                }
            }
        }
        Ok(())
    }

    pub async fn send_snapshot(&self, state: &SessionState) -> anyhow::Result<()> {
        self.send_update(&UiUpdate::Snapshot { state }).await
    }

    /// Deliver a generated illustration as a sequence of datagram-sized
    /// chunks. Base64 is ASCII, so byte-wise chunking stays valid UTF-8.
    pub async fn send_illustration(&self, image: &str) -> anyhow::Result<()> {
        let bytes = image.as_bytes();
        let chunks = bytes.chunks(ILLUSTRATION_CHUNK_BYTES).count();
        for (chunk, part) in bytes.chunks(ILLUSTRATION_CHUNK_BYTES).enumerate() {
            self.send_update(&UiUpdate::Illustration {
                chunk,
                chunks,
                data: std::str::from_utf8(part)?.to_string(),
            })
            .await?;
        }
        Ok(())
    }

    pub async fn send_diagnostic(&self, message: &str) -> anyhow::Result<()> {
        self.send_update(&UiUpdate::Diagnostic {
            message: message.to_string(),
        })
        .await
    }

    async fn send_update(&self, update: &UiUpdate<'_>) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(update)?;
        self.socket.send_to(&payload, &self.target_addr).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Language;

    fn test_config(remote_port: u16) -> Config {
        Config {
            ui_local_port: 0,
            ui_remote_port: remote_port,
            ui_buffer_size: 65536,
            api_key: String::new(),
            api_base_url: "http://127.0.0.1:1".into(),
            solve_model: "solve".into(),
            transcribe_model: "stt".into(),
            tts_model: "tts".into(),
            image_model: "image".into(),
            capture_device: "default".into(),
            playback_device: "default".into(),
            capture_sample_rate: 16000,
            capture_channels: 1,
            tts_sample_rate: 24000,
            tts_channels: 1,
            default_language: Language::En,
        }
    }

    #[tokio::test]
    async fn large_illustration_travels_chunked_and_snapshots_stay_small() {
        let peer = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let remote_port = peer.local_addr().unwrap().port();
        let (tx, _rx) = mpsc::channel(8);
        let bridge = UiBridge::new(&test_config(remote_port), tx).await.unwrap();

        // Comparable to a real generated PNG after base64 inflation.
        let image = "A".repeat(160 * 1024);
        let mut state = SessionState::new(Language::En);
        state.illustration = Some(image.clone());

        bridge.send_snapshot(&state).await.unwrap();
        let mut buf = vec![0u8; 65536];
        let (len, _) = peer.recv_from(&mut buf).await.unwrap();
        assert!(len < 65_507, "snapshot must fit one datagram, got {}", len);
        let snapshot: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(snapshot["type"], "snapshot");
        assert_eq!(snapshot["state"]["illustrationReady"], true);

        bridge.send_illustration(&image).await.unwrap();
        let mut assembled = String::new();
        let mut expected = usize::MAX;
        let mut seen = 0;
        while seen < expected {
            let (len, _) = peer.recv_from(&mut buf).await.unwrap();
            assert!(len < 65_507);
            let msg: serde_json::Value = serde_json::from_slice(&buf[..len]).unwrap();
            assert_eq!(msg["type"], "illustration");
            assert_eq!(msg["chunk"].as_u64().unwrap() as usize, seen);
            expected = msg["chunks"].as_u64().unwrap() as usize;
            assembled.push_str(msg["data"].as_str().unwrap());
            seen += 1;
        }
        assert_eq!(assembled, image);
    }
}
