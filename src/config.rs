use crate::protocol::Language;
use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    // UI 进程 bridge (local UDP pair with the presentation process)
    pub ui_local_port: u16,
    pub ui_remote_port: u16,
    pub ui_buffer_size: usize,

    // Remote model endpoint
    pub api_key: String,
    pub api_base_url: String,
    pub solve_model: String,
    pub transcribe_model: String,
    pub tts_model: String,
    pub image_model: String,

    // Audio devices and formats
    pub capture_device: String,
    pub playback_device: String,
    pub capture_sample_rate: u32,
    pub capture_channels: u32,
    /// Sample rate of the PCM16 stream returned by speech synthesis.
    pub tts_sample_rate: u32,
    pub tts_channels: u32,

    pub default_language: Language,
}

impl Config {
    /// Read the configuration once at startup from the process environment.
    /// Everything has a default except the API key; an absent key is not
    /// validated here and surfaces as a remote authentication failure at the
    /// first gateway call.
    pub fn from_env() -> Result<Self, &'static str> {
        Ok(Self {
            ui_local_port: env_or("TUTOR_UI_LOCAL_PORT", "8970")
                .parse()
                .map_err(|_| "Failed to parse TUTOR_UI_LOCAL_PORT")?,
            ui_remote_port: env_or("TUTOR_UI_REMOTE_PORT", "8971")
                .parse()
                .map_err(|_| "Failed to parse TUTOR_UI_REMOTE_PORT")?,
            ui_buffer_size: env_or("TUTOR_UI_BUFFER_SIZE", "65536")
                .parse()
                .map_err(|_| "Failed to parse TUTOR_UI_BUFFER_SIZE")?,

            api_key: env::var("GEMINI_API_KEY").unwrap_or_default(),
            api_base_url: env_or(
                "TUTOR_API_BASE_URL",
                "https://generativelanguage.googleapis.com/v1beta/models",
            ),
            solve_model: env_or("TUTOR_SOLVE_MODEL", "gemini-3-flash-preview"),
            transcribe_model: env_or("TUTOR_TRANSCRIBE_MODEL", "gemini-3-flash-preview"),
            tts_model: env_or("TUTOR_TTS_MODEL", "gemini-2.5-flash-preview-tts"),
            image_model: env_or("TUTOR_IMAGE_MODEL", "gemini-2.5-flash-image"),

            capture_device: env_or("TUTOR_CAPTURE_DEVICE", "default"),
            playback_device: env_or("TUTOR_PLAYBACK_DEVICE", "default"),
            capture_sample_rate: env_or("TUTOR_CAPTURE_SAMPLE_RATE", "16000")
                .parse()
                .map_err(|_| "Failed to parse TUTOR_CAPTURE_SAMPLE_RATE")?,
            capture_channels: env_or("TUTOR_CAPTURE_CHANNELS", "1")
                .parse()
                .map_err(|_| "Failed to parse TUTOR_CAPTURE_CHANNELS")?,
            tts_sample_rate: 24000,
            tts_channels: 1,

            default_language: match env_or("TUTOR_LANGUAGE", "ar").as_str() {
                "en" => Language::En,
                _ => Language::Ar,
            },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
