//! One-shot narration playback on a dedicated thread.
//!
//! The decoded sample buffer is re-quantized to interleaved i16 and written
//! to the ALSA playback device; a `PlaybackFinished` event is posted when
//! the buffer has been fully written (or on unrecoverable error), so the
//! controller can clear the playing flag either way.

use std::thread;

use anyhow::Result;
use tokio::sync::mpsc;

use crate::audio::alsa_device;
use crate::audio::pcm::{self, SampleBuffer};
use crate::state::Event;

const MAX_RECOVERY_RETRIES: u32 = 3;

/// Spawn the playback thread for one decoded buffer.
pub fn play(device: String, buffer: SampleBuffer, done_tx: mpsc::Sender<Event>) -> Result<()> {
    thread::Builder::new().name("narration-play".into()).spawn(move || {
        if let Err(e) = play_buffer(&device, &buffer) {
            log::error!("Narration playback error: {}", e);
        }
        if done_tx.blocking_send(Event::PlaybackFinished).is_err() {
            log::warn!("Playback finished but the event loop is gone");
        }
        // buffer dropped here: discarded after playback ends
    })?;
    Ok(())
}

fn play_buffer(device: &str, buffer: &SampleBuffer) -> Result<()> {
    let channels = buffer.channel_count().max(1) as u32;
    let (pcm_dev, params) = alsa_device::open_playback(device, buffer.sample_rate, channels)?;

    if params.channels != channels {
        anyhow::bail!(
            "Playback device negotiated {} channels, buffer has {}",
            params.channels,
            channels
        );
    }

    let samples = pcm::interleave_i16(buffer);
    let io = pcm_dev.io_i16()?;

    let total_frames = samples.len() / channels as usize;
    let mut frames_written = 0;
    let mut retry_count = 0u32;

    while frames_written < total_frames {
        let offset = frames_written * channels as usize;
        match io.writei(&samples[offset..]) {
            Ok(n) => {
                frames_written += n;
                retry_count = 0;
            }
            Err(e) => {
                log::warn!("ALSA XRUN or error: {}, recovering...", e);
                retry_count += 1;
                if let Err(e2) = pcm_dev.prepare() {
                    anyhow::bail!("Failed to recover PCM playback: {}", e2);
                }
                if retry_count >= MAX_RECOVERY_RETRIES {
                    anyhow::bail!(
                        "Dropping {} unwritten frames after {} recovery attempts",
                        total_frames - frames_written,
                        retry_count
                    );
                }
            }
        }
    }

    // Let the device play out buffered frames before releasing it
    let _ = pcm_dev.drain();
    Ok(())
}
