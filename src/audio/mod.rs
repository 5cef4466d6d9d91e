//! audio - microphone capture, clip assembly, and narration playback.
//!
//! ALSA for device I/O; PCM16 decode/encode is done in-process. Real-time
//! loops run on dedicated std::threads, never on the tokio runtime.

pub mod alsa_device;
pub mod capture;
pub mod clip;
pub mod pcm;
pub mod playback;

pub use capture::{CaptureState, Recorder};
pub use clip::AudioClip;
