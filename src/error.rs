//! Error taxonomy for the tutor core.
//!
//! Only `MalformedSolution` ever reaches the user as a visible error banner;
//! every other variant degrades silently (logged and, where relevant,
//! published as a diagnostic on the UI bridge).

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TutorError {
    /// Microphone permission/hardware failure while starting a recording.
    #[error("audio capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The transcription call errored at the transport or returned no text.
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    /// The solve response could not be parsed into the Solution shape.
    #[error("solve response did not match the expected solution shape: {0}")]
    MalformedSolution(String),

    /// The speech synthesis response carried no audio payload.
    #[error("speech synthesis failed: {0}")]
    SpeechSynthesisFailed(String),

    /// The illustration response carried no image payload.
    #[error("illustration generation failed: {0}")]
    IllustrationFailed(String),

    /// Transport-level failure talking to the remote model.
    #[error("remote request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Non-success HTTP status from the remote model.
    #[error("remote returned HTTP {status}: {message}")]
    RemoteStatus { status: u16, message: String },
}
