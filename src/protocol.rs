//! Wire shapes shared across the core: the structured solution returned by
//! the remote model, the two supported locales, and the JSON messages
//! exchanged with the presentation process over the UDP bridge.

use serde::{Deserialize, Serialize};

/// Display language of the session. Solving, narration, and user-facing
/// error text are all language-specific, so switching locales invalidates
/// any previous solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Ar,
    En,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Language::Ar => "ar",
            Language::En => "en",
        }
    }

    pub fn toggled(self) -> Self {
        match self {
            Language::Ar => Language::En,
            Language::En => Language::Ar,
        }
    }

    /// User-facing banner for a failed solve, in the session locale.
    pub fn solve_error_message(self) -> &'static str {
        match self {
            Language::Ar => "يا بطلة، حدث خطأ بسيط. حاولي مرة أخرى وسأكون معكِ!",
            Language::En => "Champion, a small error occurred. Try again and I'll be with you!",
        }
    }
}

/// Ink colors the whiteboard replay may use. The remote schema closes this
/// set, so an unknown color fails deserialization of the whole solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InkColor {
    White,
    Yellow,
    Green,
}

/// One line of the whiteboard replay. List order is replay order.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WhiteboardStep {
    pub text: String,
    pub color: InkColor,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Understanding {
    pub rephrased: String,
    pub given: Vec<String>,
    pub required: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FinalResult {
    pub answer: String,
    pub encouragement: String,
}

/// The structured result of solving one problem. Field names follow the
/// remote JSON schema exactly.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub understanding: Understanding,
    pub text_steps: Vec<String>,
    pub audio_script: String,
    pub whiteboard_steps: Vec<WhiteboardStep>,
    pub whiteboard_audio_script: String,
    pub drawing_prompt: String,
    pub drawing_audio_script: String,
    pub final_result: FinalResult,
}

/// User events arriving from the presentation process.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiRequest {
    /// Submit a problem: free text and/or a base64 image payload with its
    /// declared MIME type.
    Submit {
        #[serde(default)]
        text: String,
        #[serde(default)]
        image: Option<ImagePayload>,
    },
    RecordStart,
    RecordStop,
    ToggleLanguage,
    OpenWhiteboard,
    CloseWhiteboard,
    RequestIllustration,
    /// Replay the main narration script of the current solution.
    ReplayNarration,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ImagePayload {
    pub data: String,
    pub mime_type: String,
}

/// Messages the core pushes to the presentation process.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UiUpdate<'a> {
    /// Full state snapshot, published after every transition.
    Snapshot { state: &'a crate::state::SessionState },
    /// One chunk of a generated illustration. The base64 payload does not
    /// fit a single datagram, so snapshots only flag readiness and the
    /// image arrives as `chunks` messages in `chunk` order.
    Illustration {
        chunk: usize,
        chunks: usize,
        data: String,
    },
    /// Best-effort feature failed; never an error banner, but observable.
    Diagnostic { message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_language_flips_locale() {
        assert_eq!(Language::Ar.toggled(), Language::En);
        assert_eq!(Language::En.toggled(), Language::Ar);
        assert_eq!(Language::En.code(), "en");
    }

    #[test]
    fn ink_color_set_is_closed() {
        assert_eq!(
            serde_json::from_str::<InkColor>("\"green\"").unwrap(),
            InkColor::Green
        );
        assert!(serde_json::from_str::<InkColor>("\"blue\"").is_err());
    }

    #[test]
    fn solution_parses_from_schema_shaped_json() {
        let json = r#"{
            "understanding": {"rephrased": "Add two and two", "given": ["2", "2"], "required": "the sum"},
            "textSteps": ["Write 2 + 2", "Count up to 4"],
            "audioScript": "Let's add together!",
            "whiteboardSteps": [
                {"text": "2 + 2", "color": "white"},
                {"text": "= 4", "color": "green"}
            ],
            "whiteboardAudioScript": "Watch the board.",
            "drawingPrompt": "two apples plus two apples",
            "drawingAudioScript": "See the apples.",
            "finalResult": {"answer": "4", "encouragement": "Well done!"}
        }"#;
        let solution: Solution = serde_json::from_str(json).unwrap();
        assert_eq!(solution.text_steps.len(), 2);
        assert_eq!(solution.whiteboard_steps[1].color, InkColor::Green);
        assert_eq!(solution.final_result.answer, "4");
    }

    #[test]
    fn ui_request_decodes_tagged_json() {
        let req: UiRequest =
            serde_json::from_str(r#"{"type":"submit","text":"2 + 2"}"#).unwrap();
        match req {
            UiRequest::Submit { text, image } => {
                assert_eq!(text, "2 + 2");
                assert!(image.is_none());
            }
            other => panic!("unexpected request: {:?}", other),
        }
    }
}
