//! Remote solving gateway: the boundary to the generative-AI service.
//!
//! Four logically independent request/response operations, each a single
//! exchange with no local retry or backoff: transcribe a recorded clip,
//! solve a problem, synthesize narration speech, synthesize an illustration.
//! All four are stateless and safe to repeat with the same input.

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::audio::AudioClip;
use crate::config::Config;
use crate::error::TutorError;
use crate::protocol::{Language, Solution};

/// Delay the narration by a beat after the solution renders.
pub const NARRATION_DELAY_MS: u64 = 1000;
/// Shorter beat between the illustration appearing and its narration.
pub const DRAWING_NARRATION_DELAY_MS: u64 = 800;

/// The problem handed to the solve operation: free text, or an image payload
/// with its declared content type.
#[derive(Debug)]
pub enum ProblemInput {
    Text(String),
    Image { data: Bytes, mime_type: String },
}

#[async_trait]
pub trait SolverGateway: Send + Sync {
    /// Turn a recorded clip into problem text. Empty text means "nothing
    /// captured" and is not an error.
    async fn transcribe(&self, clip: &AudioClip, language: Language)
    -> Result<String, TutorError>;

    /// Solve a problem, returning the full structured solution.
    async fn solve(&self, input: &ProblemInput, language: Language)
    -> Result<Solution, TutorError>;

    /// Synthesize a narration script into raw PCM16 audio bytes.
    async fn synthesize_speech(&self, text: &str, language: Language)
    -> Result<Bytes, TutorError>;

    /// Synthesize an illustrative image (PNG bytes) from a drawing prompt.
    async fn synthesize_illustration(&self, prompt: &str) -> Result<Bytes, TutorError>;
}

// ======================== Wire types ========================

#[derive(Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    generation_config: Option<Value>,
}

#[derive(Serialize)]
struct Content {
    role: String,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineDataPayload,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataPayload {
    mime_type: String,
    data: String,
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    candidates: Option<Vec<Candidate>>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<ContentResponse>,
}

#[derive(Deserialize)]
struct ContentResponse {
    parts: Option<Vec<PartResponse>>,
}

#[derive(Deserialize)]
struct PartResponse {
    text: Option<String>,
    #[serde(rename = "inlineData")]
    inline_data: Option<InlineDataResponse>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineDataResponse {
    data: String,
}

#[derive(Deserialize)]
struct ErrorWrapper {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

impl GenerateContentResponse {
    /// First text part of the first candidate, if any.
    fn first_text(self) -> Option<String> {
        self.into_parts()?.into_iter().find_map(|part| part.text)
    }

    /// First inline binary payload of the first candidate, base64-decoded.
    fn first_inline_data(self) -> Option<Bytes> {
        let encoded = self
            .into_parts()?
            .into_iter()
            .find_map(|part| part.inline_data)?
            .data;
        BASE64_STANDARD.decode(encoded).ok().map(Bytes::from)
    }

    fn into_parts(self) -> Option<Vec<PartResponse>> {
        self.candidates?
            .into_iter()
            .next()?
            .content?
            .parts
    }
}

// ======================== Prompts & schema ========================

const SOLVE_SYSTEM_AR: &str = "أنتِ معلمة رياضيات مصرية خبيرة للمرحلة الابتدائية (من الصف الأول للسادس).
مهمتك: حل المسألة الرياضية المرفقة بدقة كاملة وبأسلوب الكتاب المدرسي المصري باللغة العربية.

قواعد هامة جداً للتعامل مع الصور:
1. إذا كانت الصورة تحتوي على صفحة بها عدة مسائل:
   - ابحثي أولاً عن أي تمييز بصري (مثل: دائرة حول مسألة، خط تحت مسألة، تظليل بلون فسفوري، أو تهشير).
   - إذا وجدتِ تمييزاً، حلي المسائل المحددة فقط وتجاهلي الباقي.
   - إذا لم يوجد أي تمييز، حلي جميع المسائل الموجودة في الصفحة بالتتابع من الأعلى إلى الأسفل.
2. في مسائل الوقت (الساعات والدقائق): التزمي دائماً بوضع خانة الساعات على اليمين وخانة الدقائق على اليسار لأن الكتابة بالعربية من اليمين لليسار.
3. في السبورة الذكية، عند كتابة عمليات الجمع أو الطرح الزمني، نظميها في أعمدة بحيث تكون الساعات في العمود الأيمن والدقائق في العمود الأيسر.

الهيكل المطلوب (JSON):
   - understanding: فهم المسألة.
   - textSteps: خطوات الحل المفصلة بالترتيب.
   - audioScript: نص الشرح الصوتي العام بلهجة مصرية محببة.
   - whiteboardSteps: قائمة خطوات السبورة بالألوان white و yellow و green.
   - whiteboardAudioScript: نص شرح المعلمة وهي تكتب على السبورة خطوة بخطوة.
   - drawingPrompt: وصف دقيق بالإنجليزية لصورة تعليمية بسيطة توضح المسألة.
   - drawingAudioScript: نص شرح المعلمة للرسم التوضيحي.
   - finalResult: الإجابة النهائية مع تشجيع حماسي.";

const SOLVE_SYSTEM_EN: &str = "You are an expert Math teacher for primary school (grades 1 to 6).
Your task: Solve the attached math problem accurately following the standard curriculum approach in English.

Important rules for images:
1. If the image contains multiple problems:
   - First, look for visual highlights (circles, boxes, highlighters, underlines, or hatching).
   - If highlights are found, solve ONLY the marked problem(s).
   - If no highlights are present, solve all problems on the page sequentially from top to bottom.
2. For time problems (hours and minutes): hours on the left and minutes on the right (HH:MM).

Required structure (JSON):
   - understanding: understanding of the problem.
   - textSteps: detailed solution steps in order.
   - audioScript: audio explanation script.
   - whiteboardSteps: smartboard steps using the colors white, yellow, and green.
   - whiteboardAudioScript: teacher's voice script for the board.
   - drawingPrompt: detailed description for a drawing, in English.
   - drawingAudioScript: teacher's script explaining the drawing.
   - finalResult: final answer(s) and encouragement.";

fn transcribe_prompt(language: Language) -> &'static str {
    match language {
        Language::Ar => {
            "حول هذا التسجيل الصوتي لمسألة رياضيات إلى نص مكتوب بدقة. اكتب النص فقط بدون أي مقدمات."
        }
        Language::En => {
            "Transcribe this audio of a math problem into clear text. Provide only the text transcription."
        }
    }
}

fn solve_image_prompt(language: Language) -> &'static str {
    match language {
        Language::Ar => {
            "حلِي هذه المسائل بدقة. إذا وجدتِ تحديداً (دائرة أو تظليل) حلي المحدد فقط، وإلا حلي الصفحة كاملة بالتتابع."
        }
        Language::En => {
            "Solve these problems. If marked, solve only the highlighted ones; otherwise, solve the whole page sequentially."
        }
    }
}

fn speech_prompt(text: &str, language: Language) -> String {
    match language {
        Language::Ar => format!(
            "بصوت معلمة مصرية حنونة ومبهجة، اقرئي النص التالي للأطفال: {}",
            text
        ),
        Language::En => format!(
            "As a friendly and cheerful teacher, read the following text for children: {}",
            text
        ),
    }
}

fn speech_voice(language: Language) -> &'static str {
    match language {
        Language::Ar => "Kore",
        Language::En => "Puck",
    }
}

fn illustration_prompt(prompt: &str) -> String {
    format!(
        "Create a simple, educational math drawing for kids: {}. \
         RULES: \
         1. ALL TEXT, NUMBERS, AND LABELS MUST BE IN ENGLISH ONLY. \
         2. STRICTLY NO ARABIC TEXT OR CHARACTERS. \
         3. Use a clean white background, vibrant colors, and 2D flat child-friendly style.",
        prompt
    )
}

/// The closed response schema for the solve operation, mirrored by the
/// `Solution` type in `protocol.rs`.
fn solution_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "understanding": {
                "type": "OBJECT",
                "properties": {
                    "rephrased": {"type": "STRING"},
                    "given": {"type": "ARRAY", "items": {"type": "STRING"}},
                    "required": {"type": "STRING"}
                },
                "required": ["rephrased", "given", "required"]
            },
            "textSteps": {"type": "ARRAY", "items": {"type": "STRING"}},
            "audioScript": {"type": "STRING"},
            "whiteboardSteps": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "text": {"type": "STRING"},
                        "color": {"type": "STRING", "enum": ["white", "yellow", "green"]}
                    },
                    "required": ["text", "color"]
                }
            },
            "whiteboardAudioScript": {"type": "STRING"},
            "drawingPrompt": {"type": "STRING"},
            "drawingAudioScript": {"type": "STRING"},
            "finalResult": {
                "type": "OBJECT",
                "properties": {
                    "answer": {"type": "STRING"},
                    "encouragement": {"type": "STRING"}
                },
                "required": ["answer", "encouragement"]
            }
        },
        "required": [
            "understanding", "textSteps", "audioScript", "whiteboardSteps",
            "whiteboardAudioScript", "drawingPrompt", "drawingAudioScript",
            "finalResult"
        ]
    })
}

fn parse_solution(text: &str) -> Result<Solution, TutorError> {
    serde_json::from_str(text).map_err(|e| TutorError::MalformedSolution(e.to_string()))
}

// ======================== REST implementation ========================

pub struct GeminiGateway {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    solve_model: String,
    transcribe_model: String,
    tts_model: String,
    image_model: String,
}

impl GeminiGateway {
    pub fn new(config: &Config) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            base_url: config.api_base_url.clone(),
            solve_model: config.solve_model.clone(),
            transcribe_model: config.transcribe_model.clone(),
            tts_model: config.tts_model.clone(),
            image_model: config.image_model.clone(),
        }
    }

    async fn send(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse, TutorError> {
        let url = format!(
            "{}/{}:generateContent?key={}",
            self.base_url, model, self.api_key
        );

        let response = self.client.post(url).json(body).send().await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorWrapper>(&body_text)
                .ok()
                .and_then(|w| w.error.message)
                .unwrap_or(body_text);
            return Err(TutorError::RemoteStatus { status, message });
        }

        Ok(response.json().await?)
    }
}

fn user_content(parts: Vec<Part>) -> Vec<Content> {
    vec![Content {
        role: "user".to_string(),
        parts,
    }]
}

#[async_trait]
impl SolverGateway for GeminiGateway {
    async fn transcribe(
        &self,
        clip: &AudioClip,
        language: Language,
    ) -> Result<String, TutorError> {
        let request = GenerateContentRequest {
            contents: user_content(vec![
                Part::InlineData {
                    inline_data: InlineDataPayload {
                        mime_type: clip.mime_type.to_string(),
                        data: BASE64_STANDARD.encode(&clip.data),
                    },
                },
                Part::Text {
                    text: transcribe_prompt(language).to_string(),
                },
            ]),
            system_instruction: None,
            generation_config: None,
        };

        let response = self
            .send(&self.transcribe_model, &request)
            .await
            .map_err(|e| TutorError::TranscriptionFailed(e.to_string()))?;

        // A response without text means nothing was captured, not an error.
        Ok(response.first_text().unwrap_or_default())
    }

    async fn solve(
        &self,
        input: &ProblemInput,
        language: Language,
    ) -> Result<Solution, TutorError> {
        let parts = match input {
            ProblemInput::Text(text) => vec![Part::Text {
                text: match language {
                    Language::Ar => format!("حلِي هذه المسألة: {}.", text),
                    Language::En => format!("Solve this problem: {}.", text),
                },
            }],
            ProblemInput::Image { data, mime_type } => vec![
                Part::InlineData {
                    inline_data: InlineDataPayload {
                        mime_type: mime_type.clone(),
                        data: BASE64_STANDARD.encode(data),
                    },
                },
                Part::Text {
                    text: solve_image_prompt(language).to_string(),
                },
            ],
        };

        let system = match language {
            Language::Ar => SOLVE_SYSTEM_AR,
            Language::En => SOLVE_SYSTEM_EN,
        };

        let request = GenerateContentRequest {
            contents: user_content(parts),
            system_instruction: Some(Content {
                role: "system".to_string(),
                parts: vec![Part::Text {
                    text: system.to_string(),
                }],
            }),
            generation_config: Some(json!({
                "responseMimeType": "application/json",
                "responseSchema": solution_schema()
            })),
        };

        let text = self
            .send(&self.solve_model, &request)
            .await?
            .first_text()
            .ok_or_else(|| {
                TutorError::MalformedSolution("response carried no text candidate".to_string())
            })?;

        parse_solution(&text)
    }

    async fn synthesize_speech(
        &self,
        text: &str,
        language: Language,
    ) -> Result<Bytes, TutorError> {
        let request = GenerateContentRequest {
            contents: user_content(vec![Part::Text {
                text: speech_prompt(text, language),
            }]),
            system_instruction: None,
            generation_config: Some(json!({
                "responseModalities": ["AUDIO"],
                "speechConfig": {
                    "voiceConfig": {
                        "prebuiltVoiceConfig": {"voiceName": speech_voice(language)}
                    }
                }
            })),
        };

        let response = self
            .send(&self.tts_model, &request)
            .await
            .map_err(|e| TutorError::SpeechSynthesisFailed(e.to_string()))?;

        response.first_inline_data().ok_or_else(|| {
            TutorError::SpeechSynthesisFailed("response carried no audio payload".to_string())
        })
    }

    async fn synthesize_illustration(&self, prompt: &str) -> Result<Bytes, TutorError> {
        let request = GenerateContentRequest {
            contents: user_content(vec![Part::Text {
                text: illustration_prompt(prompt),
            }]),
            system_instruction: None,
            generation_config: Some(json!({
                "imageConfig": {"aspectRatio": "1:1"}
            })),
        };

        let response = self
            .send(&self.image_model, &request)
            .await
            .map_err(|e| TutorError::IllustrationFailed(e.to_string()))?;

        response.first_inline_data().ok_or_else(|| {
            TutorError::IllustrationFailed("response carried no image payload".to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inline_part_serializes_with_camel_case_wire_names() {
        let request = GenerateContentRequest {
            contents: user_content(vec![Part::InlineData {
                inline_data: InlineDataPayload {
                    mime_type: "image/png".to_string(),
                    data: "AAAA".to_string(),
                },
            }]),
            system_instruction: None,
            generation_config: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(
            json["contents"][0]["parts"][0]["inlineData"]["mimeType"],
            "image/png"
        );
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn response_text_extraction_takes_first_candidate() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"hello"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.first_text().as_deref(), Some("hello"));
    }

    #[test]
    fn inline_payload_extraction_decodes_base64() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[
                {"inlineData":{"mimeType":"audio/pcm","data":"AEA="}}
            ]}}]}"#,
        )
        .unwrap();
        assert_eq!(
            response.first_inline_data().unwrap().as_ref(),
            &[0x00, 0x40]
        );
    }

    #[test]
    fn empty_response_yields_no_payload() {
        let response: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(response.first_inline_data().is_none());
    }

    #[test]
    fn unparseable_solution_is_malformed() {
        let err = parse_solution("{\"not\": \"a solution\"}").unwrap_err();
        assert!(matches!(err, TutorError::MalformedSolution(_)));
    }

    #[test]
    fn schema_closes_the_whiteboard_color_set() {
        let schema = solution_schema();
        assert_eq!(
            schema["properties"]["whiteboardSteps"]["items"]["properties"]["color"]["enum"],
            json!(["white", "yellow", "green"])
        );
    }
}
