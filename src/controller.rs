//! Core controller: owns the live session state and the capture adapter,
//! feeds every event through the reducer, executes the resulting effects,
//! and publishes a snapshot on the UI bridge after each transition.
//!
//! Remote calls run in spawned tasks and post completion events back over
//! the event channel, so the loop never blocks on the network.

use std::sync::Arc;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::audio::{Recorder, pcm, playback};
use crate::config::Config;
use crate::gateway::SolverGateway;
use crate::protocol::UiRequest;
use crate::state::{Effect, Event, SessionState, reduce};
use crate::ui_bridge::UiBridge;

pub struct Controller {
    state: SessionState,
    gateway: Arc<dyn SolverGateway>,
    recorder: Recorder,
    ui_bridge: Arc<UiBridge>,
    event_tx: mpsc::Sender<Event>,
    playback_device: String,
    tts_sample_rate: u32,
    tts_channels: usize,
}

impl Controller {
    pub fn new(
        config: &Config,
        gateway: Arc<dyn SolverGateway>,
        ui_bridge: Arc<UiBridge>,
        event_tx: mpsc::Sender<Event>,
    ) -> Self {
        Self {
            state: SessionState::new(config.default_language),
            gateway,
            recorder: Recorder::new(
                config.capture_device.clone(),
                config.capture_sample_rate,
                config.capture_channels,
            ),
            ui_bridge,
            event_tx,
            playback_device: config.playback_device.clone(),
            tts_sample_rate: config.tts_sample_rate,
            tts_channels: config.tts_channels as usize,
        }
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub async fn handle_ui_request(&mut self, request: UiRequest) {
        match request {
            UiRequest::Submit { text, image } => {
                let image = match image {
                    Some(payload) => match pcm::decode_base64(&payload.data) {
                        Ok(bytes) => Some((Bytes::from(bytes), payload.mime_type)),
                        Err(e) => {
                            log::warn!("Dropping attached image, bad base64: {}", e);
                            self.send_diagnostic("attached image could not be read").await;
                            None
                        }
                    },
                    None => None,
                };
                self.apply(Event::Submit { text, image }).await;
            }
            UiRequest::RecordStart => {
                // Device failure reverts silently to idle, no banner.
                if let Err(e) = self.recorder.start() {
                    log::warn!("Recording not started: {}", e);
                }
            }
            UiRequest::RecordStop => {
                if let Some(clip) = self.recorder.stop() {
                    let gateway = self.gateway.clone();
                    let event_tx = self.event_tx.clone();
                    let language = self.state.language;
                    tokio::spawn(async move {
                        let outcome = match gateway.transcribe(&clip, language).await {
                            Ok(text) => Some(text),
                            Err(e) => {
                                log::warn!("Transcription failed: {}", e);
                                None
                            }
                        };
                        let _ = event_tx.send(Event::TranscriptionDone(outcome)).await;
                    });
                }
            }
            UiRequest::ToggleLanguage => self.apply(Event::ToggleLanguage).await,
            UiRequest::OpenWhiteboard => self.apply(Event::OpenWhiteboard).await,
            UiRequest::CloseWhiteboard => self.apply(Event::CloseWhiteboard).await,
            UiRequest::RequestIllustration => self.apply(Event::RequestIllustration).await,
            UiRequest::ReplayNarration => self.apply(Event::ReplayNarration).await,
        }
    }

    pub async fn handle_event(&mut self, event: Event) {
        // The capture adapter leaves Finalizing once the transcription
        // outcome has been observed, whatever it was.
        if matches!(event, Event::TranscriptionDone(_)) {
            self.recorder.finish();
        }
        self.apply(event).await;
    }

    async fn apply(&mut self, event: Event) {
        let (next, effects) = reduce(&self.state, event);
        self.state = next;
        for effect in effects {
            self.run_effect(effect).await;
        }
        self.publish_snapshot().await;
    }

    pub async fn publish_snapshot(&self) {
        if let Err(e) = self.ui_bridge.send_snapshot(&self.state).await {
            log::error!("Failed to publish state snapshot: {}", e);
        }
    }

    async fn send_diagnostic(&self, message: &str) {
        if let Err(e) = self.ui_bridge.send_diagnostic(message).await {
            log::error!("Failed to publish diagnostic: {}", e);
        }
    }

    async fn run_effect(&self, effect: Effect) {
        match effect {
            Effect::Solve {
                seq,
                input,
                language,
            } => {
                let gateway = self.gateway.clone();
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let result = gateway.solve(&input, language).await;
                    if let Err(e) = &result {
                        log::error!("Solve failed: {}", e);
                    }
                    let _ = event_tx.send(Event::SolveFinished { seq, result }).await;
                });
            }

            Effect::Illustrate { seq, prompt } => {
                let gateway = self.gateway.clone();
                let event_tx = self.event_tx.clone();
                tokio::spawn(async move {
                    let result = gateway
                        .synthesize_illustration(&prompt)
                        .await
                        .map(|bytes| BASE64_STANDARD.encode(&bytes));
                    let _ = event_tx
                        .send(Event::IllustrationFinished { seq, result })
                        .await;
                });
            }

            Effect::PublishIllustration { image } => {
                if let Err(e) = self.ui_bridge.send_illustration(&image).await {
                    log::error!("Failed to deliver illustration: {}", e);
                }
            }

            Effect::Speak {
                script,
                language,
                delay_ms,
            } => {
                let gateway = self.gateway.clone();
                let event_tx = self.event_tx.clone();
                let ui_bridge = self.ui_bridge.clone();
                let device = self.playback_device.clone();
                let sample_rate = self.tts_sample_rate;
                let channels = self.tts_channels;
                tokio::spawn(async move {
                    if delay_ms > 0 {
                        tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
                    }
                    match gateway.synthesize_speech(&script, language).await {
                        Ok(audio) => {
                            let buffer = pcm::decode_pcm16(&audio, channels, sample_rate);
                            if let Err(e) = playback::play(device, buffer, event_tx.clone()) {
                                log::error!("Failed to start playback: {}", e);
                                let _ = event_tx.send(Event::PlaybackFinished).await;
                            }
                        }
                        Err(e) => {
                            // Best-effort: clear the playing flag, no banner.
                            log::warn!("Speech synthesis failed: {}", e);
                            let _ = ui_bridge.send_diagnostic("narration unavailable").await;
                            let _ = event_tx.send(Event::PlaybackFinished).await;
                        }
                    }
                });
            }

            Effect::Diagnostic { message } => {
                log::warn!("{}", message);
                self.send_diagnostic(&message).await;
            }
        }
    }
}
