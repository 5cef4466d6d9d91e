//! Application state machine.
//!
//! A single `SessionState` record is the source of truth for the UI; every
//! transition goes through the pure reducer `reduce(state, event)`, which
//! returns the next state plus the effects the controller must execute.
//! Guards live here, not in the presentation layer, so a caller bypassing
//! the UI cannot race the machine. Completions of remote calls carry the
//! sequence number they were issued under; stale completions are discarded.

use bytes::Bytes;
use serde::Serialize;

use crate::error::TutorError;
use crate::gateway::{DRAWING_NARRATION_DELAY_MS, NARRATION_DELAY_MS, ProblemInput};
use crate::protocol::{Language, Solution};

/// The single mutable session record. Replaced wholesale on each transition.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub problem_text: String,
    pub has_attached_image: bool,
    pub processing: bool,
    pub illustration_pending: bool,
    pub solution: Option<Solution>,
    pub error: Option<String>,
    pub audio_playing: bool,
    pub whiteboard_visible: bool,
    /// Base64 PNG of the generated illustration. Far too large for a single
    /// UDP datagram, so snapshots carry only readiness; the payload itself
    /// is delivered as a chunked bridge transfer.
    #[serde(rename = "illustrationReady", serialize_with = "ser_present")]
    pub illustration: Option<String>,
    pub language: Language,
    /// Monotonic tag for in-flight remote calls; bumped whenever a new
    /// submission or language switch invalidates older responses.
    #[serde(skip)]
    pub seq: u64,
}

fn ser_present<S>(value: &Option<String>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_bool(value.is_some())
}

impl SessionState {
    pub fn new(language: Language) -> Self {
        Self {
            problem_text: String::new(),
            has_attached_image: false,
            processing: false,
            illustration_pending: false,
            solution: None,
            error: None,
            audio_playing: false,
            whiteboard_visible: false,
            illustration: None,
            language,
            seq: 0,
        }
    }
}

/// Everything that can happen to the session: user requests and completions
/// of previously issued effects.
#[derive(Debug)]
pub enum Event {
    Submit {
        text: String,
        image: Option<(Bytes, String)>,
    },
    SolveFinished {
        seq: u64,
        result: Result<Solution, TutorError>,
    },
    RequestIllustration,
    IllustrationFinished {
        seq: u64,
        /// Base64 PNG on success.
        result: Result<String, TutorError>,
    },
    OpenWhiteboard,
    CloseWhiteboard,
    ToggleLanguage,
    ReplayNarration,
    /// Outcome of transcribing a recorded clip; `None` means the call failed,
    /// an empty string means nothing was captured.
    TranscriptionDone(Option<String>),
    PlaybackFinished,
}

/// Work the controller must perform after a transition.
#[derive(Debug)]
pub enum Effect {
    Solve {
        seq: u64,
        input: ProblemInput,
        language: Language,
    },
    Illustrate {
        seq: u64,
        prompt: String,
    },
    /// Deliver a generated illustration to the presentation process. The
    /// bridge chunks it; a snapshot only says one is ready.
    PublishIllustration {
        image: String,
    },
    Speak {
        script: String,
        language: Language,
        delay_ms: u64,
    },
    /// Best-effort feature degraded; surfaced on the UI bridge, never as an
    /// error banner.
    Diagnostic {
        message: String,
    },
}

pub fn reduce(state: &SessionState, event: Event) -> (SessionState, Vec<Effect>) {
    let mut next = state.clone();
    let mut effects = Vec::new();

    match event {
        Event::Submit { text, image } => {
            // Explicit re-entrancy guard: a submission in flight wins.
            if next.processing {
                return (next, effects);
            }
            if text.trim().is_empty() && image.is_none() {
                return (next, effects);
            }

            next.seq += 1;
            next.problem_text = text.clone();
            next.has_attached_image = image.is_some();
            next.processing = true;
            next.solution = None;
            next.error = None;
            next.illustration = None;
            next.illustration_pending = false;
            next.whiteboard_visible = false;

            let input = match image {
                Some((data, mime_type)) => ProblemInput::Image { data, mime_type },
                None => ProblemInput::Text(text),
            };
            effects.push(Effect::Solve {
                seq: next.seq,
                input,
                language: next.language,
            });
        }

        Event::SolveFinished { seq, result } => {
            if seq != next.seq {
                // A newer submission or language switch superseded this call.
                return (next, effects);
            }
            next.processing = false;
            match result {
                Ok(solution) => {
                    if !solution.audio_script.is_empty() {
                        next.audio_playing = true;
                        effects.push(Effect::Speak {
                            script: solution.audio_script.clone(),
                            language: next.language,
                            delay_ms: NARRATION_DELAY_MS,
                        });
                    }
                    next.solution = Some(solution);
                    next.error = None;
                }
                Err(_) => {
                    next.solution = None;
                    next.error = Some(next.language.solve_error_message().to_string());
                }
            }
        }

        Event::RequestIllustration => {
            let prompt = match next.solution.as_ref() {
                Some(solution) => solution.drawing_prompt.clone(),
                None => return (next, effects),
            };
            if next.illustration_pending || next.illustration.is_some() {
                return (next, effects);
            }
            next.illustration_pending = true;
            effects.push(Effect::Illustrate {
                seq: next.seq,
                prompt,
            });
        }

        Event::IllustrationFinished { seq, result } => {
            if seq != next.seq {
                return (next, effects);
            }
            next.illustration_pending = false;
            match result {
                Ok(image) => {
                    effects.push(Effect::PublishIllustration {
                        image: image.clone(),
                    });
                    next.illustration = Some(image);
                    if let Some(script) = next
                        .solution
                        .as_ref()
                        .map(|s| s.drawing_audio_script.clone())
                        .filter(|s| !s.is_empty())
                    {
                        next.audio_playing = true;
                        effects.push(Effect::Speak {
                            script,
                            language: next.language,
                            delay_ms: DRAWING_NARRATION_DELAY_MS,
                        });
                    }
                }
                Err(e) => {
                    // Softer failure policy than the solve path: no banner.
                    effects.push(Effect::Diagnostic {
                        message: format!("illustration unavailable: {}", e),
                    });
                }
            }
        }

        Event::OpenWhiteboard => {
            let script = match next.solution.as_ref() {
                Some(solution) => solution.whiteboard_audio_script.clone(),
                None => return (next, effects),
            };
            next.whiteboard_visible = true;
            if !script.is_empty() {
                next.audio_playing = true;
                effects.push(Effect::Speak {
                    script,
                    language: next.language,
                    delay_ms: 0,
                });
            }
        }

        Event::CloseWhiteboard => {
            // In-flight playback is deliberately not cancelled.
            next.whiteboard_visible = false;
        }

        Event::ToggleLanguage => {
            next.seq += 1;
            // The seq bump invalidates any in-flight solve, whose stale
            // completion will be discarded; the processing flag must drop
            // here or no later Submit would ever pass the guard.
            next.processing = false;
            next.language = next.language.toggled();
            next.solution = None;
            next.error = None;
            next.illustration = None;
            next.illustration_pending = false;
            next.whiteboard_visible = false;
        }

        Event::ReplayNarration => {
            // Re-entrant by design: issued even while already playing.
            if let Some(script) = next
                .solution
                .as_ref()
                .map(|s| s.audio_script.clone())
                .filter(|s| !s.is_empty())
            {
                next.audio_playing = true;
                effects.push(Effect::Speak {
                    script,
                    language: next.language,
                    delay_ms: 0,
                });
            }
        }

        Event::TranscriptionDone(outcome) => match outcome {
            Some(text) if !text.trim().is_empty() => {
                next.problem_text = text;
            }
            Some(_) => {
                // Nothing captured; the input simply stays empty.
            }
            None => {
                effects.push(Effect::Diagnostic {
                    message: "transcription unavailable".to_string(),
                });
            }
        },

        Event::PlaybackFinished => {
            next.audio_playing = false;
        }
    }

    (next, effects)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{FinalResult, InkColor, Understanding, WhiteboardStep};

    fn sample_solution() -> Solution {
        Solution {
            understanding: Understanding {
                rephrased: "Add two and two".into(),
                given: vec!["2".into(), "2".into()],
                required: "the sum".into(),
            },
            text_steps: vec!["Write 2 + 2".into(), "Count to 4".into()],
            audio_script: "Let's add!".into(),
            whiteboard_steps: vec![
                WhiteboardStep {
                    text: "2 + 2".into(),
                    color: InkColor::White,
                },
                WhiteboardStep {
                    text: "= 4".into(),
                    color: InkColor::Green,
                },
            ],
            whiteboard_audio_script: "Watch the board".into(),
            drawing_prompt: "two apples plus two apples".into(),
            drawing_audio_script: "See the apples".into(),
            final_result: FinalResult {
                answer: "4".into(),
                encouragement: "Well done!".into(),
            },
        }
    }

    fn solved_state(language: Language) -> SessionState {
        let state = SessionState::new(language);
        let (state, _) = reduce(
            &state,
            Event::Submit {
                text: "2 + 2".into(),
                image: None,
            },
        );
        let (state, _) = reduce(
            &state,
            Event::SolveFinished {
                seq: state.seq,
                result: Ok(sample_solution()),
            },
        );
        state
    }

    #[test]
    fn text_submit_solves_with_text_input() {
        let state = SessionState::new(Language::En);
        let (next, effects) = reduce(
            &state,
            Event::Submit {
                text: "2 + 2".into(),
                image: None,
            },
        );

        assert!(next.processing);
        assert_eq!(next.problem_text, "2 + 2");
        assert!(!next.has_attached_image);
        match effects.as_slice() {
            [Effect::Solve {
                seq,
                input: ProblemInput::Text(text),
                language,
            }] => {
                assert_eq!(*seq, next.seq);
                assert_eq!(text, "2 + 2");
                assert_eq!(*language, Language::En);
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn image_submit_solves_with_image_payload() {
        let state = SessionState::new(Language::Ar);
        let (next, effects) = reduce(
            &state,
            Event::Submit {
                text: String::new(),
                image: Some((Bytes::from_static(&[1, 2, 3]), "image/png".into())),
            },
        );

        assert!(next.has_attached_image);
        match effects.as_slice() {
            [Effect::Solve {
                input: ProblemInput::Image { data, mime_type },
                ..
            }] => {
                assert_eq!(data.as_ref(), &[1, 2, 3]);
                assert_eq!(mime_type, "image/png");
            }
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn empty_submit_is_rejected() {
        let state = SessionState::new(Language::En);
        let (next, effects) = reduce(
            &state,
            Event::Submit {
                text: "   ".into(),
                image: None,
            },
        );
        assert!(!next.processing);
        assert!(effects.is_empty());
    }

    #[test]
    fn submit_while_processing_is_rejected() {
        let state = SessionState::new(Language::En);
        let (processing, _) = reduce(
            &state,
            Event::Submit {
                text: "1 + 1".into(),
                image: None,
            },
        );
        let (next, effects) = reduce(
            &processing,
            Event::Submit {
                text: "9 - 3".into(),
                image: None,
            },
        );
        assert_eq!(next.problem_text, "1 + 1");
        assert_eq!(next.seq, processing.seq);
        assert!(effects.is_empty());
    }

    #[test]
    fn solve_success_renders_solution_and_schedules_narration() {
        let state = solved_state(Language::En);
        let solution = state.solution.as_ref().expect("solution set");
        assert_eq!(solution.final_result.answer, "4");
        assert_eq!(
            solution.text_steps,
            vec!["Write 2 + 2".to_string(), "Count to 4".to_string()]
        );
        assert!(!state.processing);
        assert!(state.audio_playing);
        assert!(state.error.is_none());
    }

    #[test]
    fn solve_failure_sets_localized_error_in_both_locales() {
        for language in [Language::Ar, Language::En] {
            let state = SessionState::new(language);
            let (state, _) = reduce(
                &state,
                Event::Submit {
                    text: "2 + 2".into(),
                    image: None,
                },
            );
            let (next, _) = reduce(
                &state,
                Event::SolveFinished {
                    seq: state.seq,
                    result: Err(TutorError::MalformedSolution("bad json".into())),
                },
            );
            assert!(next.solution.is_none());
            let error = next.error.expect("error banner set");
            assert!(!error.is_empty());
            assert_eq!(error, language.solve_error_message());
        }
    }

    #[test]
    fn stale_solve_completion_is_discarded() {
        let state = SessionState::new(Language::En);
        let (state, _) = reduce(
            &state,
            Event::Submit {
                text: "2 + 2".into(),
                image: None,
            },
        );
        let stale_seq = state.seq;

        // A language switch invalidates the in-flight call.
        let (state, _) = reduce(&state, Event::ToggleLanguage);
        let (next, effects) = reduce(
            &state,
            Event::SolveFinished {
                seq: stale_seq,
                result: Ok(sample_solution()),
            },
        );
        assert!(next.solution.is_none());
        assert!(effects.is_empty());
    }

    #[test]
    fn toggle_language_clears_session_artifacts() {
        let mut state = solved_state(Language::Ar);
        state.whiteboard_visible = true;
        state.illustration = Some("cGluZw==".into());
        state.error = Some("stale".into());

        let (next, _) = reduce(&state, Event::ToggleLanguage);
        assert_eq!(next.language, Language::En);
        assert!(next.solution.is_none());
        assert!(next.error.is_none());
        assert!(next.illustration.is_none());
        assert!(!next.whiteboard_visible);
    }

    #[test]
    fn language_toggle_over_inflight_solve_releases_processing() {
        let state = SessionState::new(Language::En);
        let (state, _) = reduce(
            &state,
            Event::Submit {
                text: "2 + 2".into(),
                image: None,
            },
        );
        let stale_seq = state.seq;

        let (state, _) = reduce(&state, Event::ToggleLanguage);
        assert!(!state.processing);

        // The superseded completion arrives late and is discarded.
        let (state, effects) = reduce(
            &state,
            Event::SolveFinished {
                seq: stale_seq,
                result: Ok(sample_solution()),
            },
        );
        assert!(state.solution.is_none());
        assert!(effects.is_empty());

        // A fresh submission must still be accepted.
        let (next, effects) = reduce(
            &state,
            Event::Submit {
                text: "9 - 3".into(),
                image: None,
            },
        );
        assert!(next.processing);
        assert!(matches!(effects.as_slice(), [Effect::Solve { .. }]));
    }

    #[test]
    fn snapshot_serializes_illustration_as_readiness_flag() {
        let mut state = SessionState::new(Language::En);
        state.illustration = Some("cGluZw==".into());
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["illustrationReady"], serde_json::Value::Bool(true));
        assert!(json.get("illustration").is_none());
    }

    #[test]
    fn illustration_without_solution_is_a_no_op() {
        let state = SessionState::new(Language::En);
        let (next, effects) = reduce(&state, Event::RequestIllustration);
        assert!(!next.illustration_pending);
        assert!(effects.is_empty());
    }

    #[test]
    fn illustration_success_stores_image_and_narrates() {
        let state = solved_state(Language::En);
        let (state, effects) = reduce(&state, Event::RequestIllustration);
        assert!(state.illustration_pending);
        assert!(matches!(effects.as_slice(), [Effect::Illustrate { .. }]));

        let (next, effects) = reduce(
            &state,
            Event::IllustrationFinished {
                seq: state.seq,
                result: Ok("cGluZw==".into()),
            },
        );
        assert!(!next.illustration_pending);
        assert_eq!(next.illustration.as_deref(), Some("cGluZw=="));
        match effects.as_slice() {
            [
                Effect::PublishIllustration { image },
                Effect::Speak { delay_ms: 800, .. },
            ] => assert_eq!(image, "cGluZw=="),
            other => panic!("unexpected effects: {:?}", other),
        }
    }

    #[test]
    fn illustration_failure_degrades_silently_with_diagnostic() {
        let state = solved_state(Language::En);
        let (state, _) = reduce(&state, Event::RequestIllustration);
        let (next, effects) = reduce(
            &state,
            Event::IllustrationFinished {
                seq: state.seq,
                result: Err(TutorError::IllustrationFailed("no payload".into())),
            },
        );
        assert!(!next.illustration_pending);
        assert!(next.illustration.is_none());
        assert!(next.error.is_none());
        assert!(matches!(effects.as_slice(), [Effect::Diagnostic { .. }]));
    }

    #[test]
    fn whiteboard_opens_only_when_solved_and_narrates_immediately() {
        let idle = SessionState::new(Language::En);
        let (next, effects) = reduce(&idle, Event::OpenWhiteboard);
        assert!(!next.whiteboard_visible);
        assert!(effects.is_empty());

        let state = solved_state(Language::En);
        let (next, effects) = reduce(&state, Event::OpenWhiteboard);
        assert!(next.whiteboard_visible);
        assert!(matches!(
            effects.as_slice(),
            [Effect::Speak { delay_ms: 0, .. }]
        ));
    }

    #[test]
    fn closing_whiteboard_keeps_playback_running() {
        let state = solved_state(Language::En);
        let (state, _) = reduce(&state, Event::OpenWhiteboard);
        let (next, effects) = reduce(&state, Event::CloseWhiteboard);
        assert!(!next.whiteboard_visible);
        assert!(next.audio_playing);
        assert!(effects.is_empty());
    }

    #[test]
    fn replay_is_reentrant_while_already_playing() {
        let state = solved_state(Language::En);
        assert!(state.audio_playing);
        let (next, effects) = reduce(&state, Event::ReplayNarration);
        assert!(next.audio_playing);
        assert!(matches!(effects.as_slice(), [Effect::Speak { .. }]));
    }

    #[test]
    fn playback_finish_clears_the_flag() {
        let state = solved_state(Language::En);
        let (next, _) = reduce(&state, Event::PlaybackFinished);
        assert!(!next.audio_playing);
    }

    #[test]
    fn transcript_fills_problem_text_and_empty_is_dropped() {
        let state = SessionState::new(Language::En);
        let (next, _) = reduce(
            &state,
            Event::TranscriptionDone(Some("what is 2 + 2".into())),
        );
        assert_eq!(next.problem_text, "what is 2 + 2");

        let (next, effects) = reduce(&next, Event::TranscriptionDone(Some("  ".into())));
        assert_eq!(next.problem_text, "what is 2 + 2");
        assert!(effects.is_empty());

        let (_, effects) = reduce(&next, Event::TranscriptionDone(None));
        assert!(matches!(effects.as_slice(), [Effect::Diagnostic { .. }]));
    }
}
