//! Media capture adapter: the microphone recording lifecycle.
//!
//! Uses a dedicated std::thread (NOT a tokio task) for the real-time read
//! loop, matching the rest of the audio path. The thread owns the PCM
//! handle, so the device is released on every exit path, including errors.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};

use crate::audio::alsa_device;
use crate::audio::clip::{self, AudioClip};
use crate::error::TutorError;

/// Recording lifecycle. Only one recording may hold the device at a time;
/// Finalizing persists until the transcription outcome has been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
    Finalizing,
}

pub struct Recorder {
    device: String,
    sample_rate: u32,
    channels: u32,
    state: CaptureState,
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<Vec<i16>>>,
}

impl Recorder {
    pub fn new(device: String, sample_rate: u32, channels: u32) -> Self {
        Self {
            device,
            sample_rate,
            channels,
            state: CaptureState::Idle,
            running: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    pub fn state(&self) -> CaptureState {
        self.state
    }

    /// Idle -> Recording. A no-op while a recording or finalization is
    /// already in progress. `DeviceUnavailable` leaves the recorder Idle
    /// with no recorded data.
    ///
    /// Blocks the caller until the open outcome is known: one device-open
    /// attempt, a bounded stall acceptable on the event loop.
    pub fn start(&mut self) -> Result<(), TutorError> {
        if self.state != CaptureState::Idle {
            log::debug!("Recorder start ignored in state {:?}", self.state);
            return Ok(());
        }

        let running = Arc::new(AtomicBool::new(true));
        let thread_running = running.clone();
        let device = self.device.clone();
        let sample_rate = self.sample_rate;
        let channels_wanted = self.channels;

        // The capture thread owns the PCM handle so the device is released
        // on every exit path; the open outcome is reported back so a denied
        // or missing device surfaces here, before the state changes.
        let (open_tx, open_rx) = std::sync::mpsc::channel::<Result<(), String>>();

        let handle = thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let mut captured: Vec<i16> = Vec::new();

                let (pcm, params) =
                    match alsa_device::open_capture(&device, sample_rate, channels_wanted) {
                        Ok(opened) => {
                            let _ = open_tx.send(Ok(()));
                            opened
                        }
                        Err(e) => {
                            let _ = open_tx.send(Err(e.to_string()));
                            return captured;
                        }
                    };

                let channels = params.channels as usize;
                let mut read_buf = vec![0i16; params.period_size * channels];

                let io = match pcm.io_i16() {
                    Ok(io) => io,
                    Err(e) => {
                        log::error!("Capture I/O setup failed: {}", e);
                        return captured;
                    }
                };

                log::info!(
                    "Recording started: rate={}, ch={}, period={}",
                    params.sample_rate,
                    params.channels,
                    params.period_size,
                );

                while thread_running.load(Ordering::Relaxed) {
                    match io.readi(&mut read_buf) {
                        Ok(frames) => {
                            captured.extend_from_slice(&read_buf[..frames * channels]);
                        }
                        Err(e) => {
                            log::warn!("ALSA capture error: {}, recovering...", e);
                            if let Err(e2) = pcm.prepare() {
                                log::error!("Failed to recover PCM capture: {}", e2);
                                break;
                            }
                        }
                    }
                }
                // PCM handle dropped here: device released
                captured
            })
            .map_err(|e| TutorError::DeviceUnavailable(e.to_string()))?;

        match open_rx.recv() {
            Ok(Ok(())) => {
                self.running = running;
                self.handle = Some(handle);
                self.state = CaptureState::Recording;
                Ok(())
            }
            outcome => {
                running.store(false, Ordering::SeqCst);
                let _ = handle.join();
                let reason = match outcome {
                    Ok(Err(e)) => e,
                    _ => "capture thread exited before opening the device".to_string(),
                };
                Err(TutorError::DeviceUnavailable(reason))
            }
        }
    }

    /// Recording -> Finalizing: stop the capture thread and assemble the
    /// accumulated PCM into a single encoded clip. Returns `None` when no
    /// recording was active or nothing was captured (reverts to Idle).
    ///
    /// The join blocks for at most one capture period before the thread
    /// observes the stop flag.
    pub fn stop(&mut self) -> Option<AudioClip> {
        if self.state != CaptureState::Recording {
            return None;
        }
        self.running.store(false, Ordering::SeqCst);

        let samples = match self.handle.take() {
            Some(h) => h.join().unwrap_or_default(),
            None => Vec::new(),
        };
        log::info!("Recording stopped: {} samples captured", samples.len());

        if samples.is_empty() {
            self.state = CaptureState::Idle;
            return None;
        }

        self.state = CaptureState::Finalizing;
        Some(clip::wav_clip(
            &samples,
            self.sample_rate,
            self.channels as u16,
        ))
    }

    /// Finalizing -> Idle, once the transcription result (success, failure,
    /// or empty) has been handed back to the caller.
    pub fn finish(&mut self) {
        if self.state == CaptureState::Finalizing {
            self.state = CaptureState::Idle;
        }
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}
