//! Provider adapters: two wire dialects, one internal event shape.
//!
//! The direct realtime API and the enterprise-gateway variant name
//! functionally identical events differently (`response.audio_transcript.*`
//! vs `response.output_audio_transcript.*`) and nest the audio configuration
//! differently. Each adapter owns one dialect end to end; nothing below this
//! boundary branches on the provider.
//!
//! Unrecognized wire types classify as `SessionEvent::Unknown` so new server
//! events degrade safely instead of being matched by accident.

use base64::prelude::*;
use serde_json::Value;

use super::events::{
    ClientEvent, InputAudioTranscription, SessionConfig, ToolDef, TurnDetection, Usage,
};

// =============================================================================
// Internal event shape
// =============================================================================

/// Speaker role for a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Candidate speech
    User,
    /// Model speech
    Assistant,
    /// Client-injected status lines
    System,
}

impl Role {
    /// Wire name for the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }

    fn from_wire(raw: Option<&str>) -> Self {
        match raw {
            Some("user") => Role::User,
            Some("assistant") => Role::Assistant,
            _ => Role::System,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model-invoked function call (the end-of-interview signal arrives as one,
/// through any of several event shapes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndCall {
    /// Provider call identifier, used to deduplicate repeated shapes
    pub call_id: String,
    /// Function name
    pub name: String,
    /// JSON arguments (carries the required "reason")
    pub arguments: String,
}

/// Common internal event shape produced by both adapters.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A conversation item came into existence
    ItemCreated {
        /// Provider item identifier
        item_id: String,
        /// Speaker role
        role: Role,
    },
    /// Incremental transcript fragment for an in-progress turn
    TranscriptDelta {
        /// Item identifier, when the event carries one
        item_id: Option<String>,
        /// Speaker role
        role: Role,
        /// Text fragment
        delta: String,
        /// Response identifier, used to synthesize an item id as a last resort
        response_id: Option<String>,
    },
    /// Terminal transcript for a turn
    TranscriptDone {
        /// Item identifier, when the event carries one
        item_id: Option<String>,
        /// Speaker role
        role: Role,
        /// Final text
        text: String,
        /// Response identifier
        response_id: Option<String>,
    },
    /// Decoded assistant output audio chunk
    AudioDelta {
        /// Item identifier
        item_id: Option<String>,
        /// PCM bytes (16-bit LE, 24kHz mono)
        pcm: Vec<u8>,
    },
    /// Model invoked a function
    FunctionCall(EndCall),
    /// Response generation started
    ResponseCreated {
        /// Response identifier
        response_id: String,
    },
    /// Terminal response event, possibly carrying usage and function output
    ResponseDone {
        /// Response identifier
        response_id: String,
        /// Token usage for this response
        usage: Option<Usage>,
        /// Function calls embedded in the response output
        calls: Vec<EndCall>,
    },
    /// Assistant audio playback started
    OutputAudioStarted,
    /// Assistant audio playback drained
    OutputAudioStopped,
    /// Candidate started speaking
    SpeechStarted,
    /// Candidate stopped speaking
    SpeechStopped,
    /// Input audio buffer committed into an item
    InputCommitted {
        /// Item identifier the buffer committed into
        item_id: String,
    },
    /// Server-sent error event
    Error {
        /// Error message
        message: String,
    },
    /// Unrecognized wire event, kept for diagnostics
    Unknown(Value),
}

/// What the orchestrator asks the adapter to configure.
#[derive(Debug, Clone)]
pub struct SessionSpec {
    /// System prompt driving the interview
    pub instructions: String,
    /// TTS voice
    pub voice: String,
    /// Transcription language hint
    pub language: String,
    /// Input-audio transcription model
    pub transcription_model: String,
}

// =============================================================================
// Adapter trait
// =============================================================================

/// One provider dialect: wire-event classification plus client-event shapes.
pub trait ProviderAdapter: Send + Sync {
    /// Classify a raw server event into the internal shape.
    fn parse(&self, raw: &Value) -> SessionEvent;

    /// Build the session configuration push for this dialect.
    fn session_update(&self, spec: &SessionSpec) -> Value;

    /// Build the greeting response request.
    fn greeting(&self, instructions: &str) -> Value;

    /// Build an input-audio append event from raw PCM.
    fn audio_append(&self, pcm: &[u8]) -> Value;
}

/// Select the adapter for a session descriptor.
pub fn provider_adapter(use_alternate_provider: bool) -> Box<dyn ProviderAdapter> {
    if use_alternate_provider {
        Box::new(GatewayAdapter)
    } else {
        Box::new(OpenAiAdapter)
    }
}

// =============================================================================
// Shared parsing
// =============================================================================

/// Dialect-specific wire names for the events that differ between providers.
struct WireNames {
    transcript_delta: &'static str,
    transcript_done: &'static str,
    audio_delta: &'static str,
}

fn opt_str(raw: &Value, key: &str) -> Option<String> {
    raw.get(key).and_then(Value::as_str).map(str::to_string)
}

fn item_text(item: &Value) -> String {
    item.get("content")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| {
                    p.get("transcript")
                        .or_else(|| p.get("text"))
                        .and_then(Value::as_str)
                })
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

fn function_call_from_item(item: &Value) -> Option<EndCall> {
    if item.get("type").and_then(Value::as_str) != Some("function_call") {
        return None;
    }
    let call_id = opt_str(item, "call_id")
        .or_else(|| opt_str(item, "id"))
        .unwrap_or_default();
    Some(EndCall {
        call_id,
        name: opt_str(item, "name").unwrap_or_default(),
        arguments: opt_str(item, "arguments").unwrap_or_default(),
    })
}

fn parse_with_names(raw: &Value, names: &WireNames) -> SessionEvent {
    let event_type = match raw.get("type").and_then(Value::as_str) {
        Some(t) => t,
        None => return SessionEvent::Unknown(raw.clone()),
    };

    match event_type {
        "conversation.item.created" | "conversation.item.added" => {
            let item = &raw["item"];
            if let Some(call) = function_call_from_item(item) {
                return SessionEvent::FunctionCall(call);
            }
            match opt_str(item, "id") {
                Some(item_id) => SessionEvent::ItemCreated {
                    item_id,
                    role: Role::from_wire(item.get("role").and_then(Value::as_str)),
                },
                None => SessionEvent::Unknown(raw.clone()),
            }
        }

        "conversation.item.done" => {
            let item = &raw["item"];
            if let Some(call) = function_call_from_item(item) {
                return SessionEvent::FunctionCall(call);
            }
            SessionEvent::TranscriptDone {
                item_id: opt_str(item, "id"),
                role: Role::from_wire(item.get("role").and_then(Value::as_str)),
                text: item_text(item),
                response_id: opt_str(raw, "response_id"),
            }
        }

        t if t == names.transcript_delta => SessionEvent::TranscriptDelta {
            item_id: opt_str(raw, "item_id"),
            role: Role::Assistant,
            delta: opt_str(raw, "delta").unwrap_or_default(),
            response_id: opt_str(raw, "response_id"),
        },

        t if t == names.transcript_done => SessionEvent::TranscriptDone {
            item_id: opt_str(raw, "item_id"),
            role: Role::Assistant,
            text: opt_str(raw, "transcript").unwrap_or_default(),
            response_id: opt_str(raw, "response_id"),
        },

        "response.text.delta" => SessionEvent::TranscriptDelta {
            item_id: opt_str(raw, "item_id"),
            role: Role::Assistant,
            delta: opt_str(raw, "delta").unwrap_or_default(),
            response_id: opt_str(raw, "response_id"),
        },

        "response.text.done" => SessionEvent::TranscriptDone {
            item_id: opt_str(raw, "item_id"),
            role: Role::Assistant,
            text: opt_str(raw, "text").unwrap_or_default(),
            response_id: opt_str(raw, "response_id"),
        },

        "conversation.item.input_audio_transcription.delta" => SessionEvent::TranscriptDelta {
            item_id: opt_str(raw, "item_id"),
            role: Role::User,
            delta: opt_str(raw, "delta").unwrap_or_default(),
            response_id: None,
        },

        "conversation.item.input_audio_transcription.completed"
        | "conversation.item.input_audio_transcription.done" => SessionEvent::TranscriptDone {
            item_id: opt_str(raw, "item_id"),
            role: Role::User,
            text: opt_str(raw, "transcript").unwrap_or_default(),
            response_id: None,
        },

        "conversation.item.input_audio_transcription.failed" => SessionEvent::Error {
            message: raw["error"]
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("input transcription failed")
                .to_string(),
        },

        "response.created" => match opt_str(&raw["response"], "id") {
            Some(response_id) => SessionEvent::ResponseCreated { response_id },
            None => SessionEvent::Unknown(raw.clone()),
        },

        "response.done" => {
            let response = &raw["response"];
            let calls = response
                .get("output")
                .and_then(Value::as_array)
                .map(|items| items.iter().filter_map(function_call_from_item).collect())
                .unwrap_or_default();
            let usage = response
                .get("usage")
                .and_then(|u| serde_json::from_value::<Usage>(u.clone()).ok());
            SessionEvent::ResponseDone {
                response_id: opt_str(response, "id").unwrap_or_default(),
                usage,
                calls,
            }
        }

        "response.function_call_arguments.done" => SessionEvent::FunctionCall(EndCall {
            call_id: opt_str(raw, "call_id").unwrap_or_default(),
            name: opt_str(raw, "name").unwrap_or_default(),
            arguments: opt_str(raw, "arguments").unwrap_or_default(),
        }),

        t if t == names.audio_delta => {
            let delta = opt_str(raw, "delta").unwrap_or_default();
            match BASE64_STANDARD.decode(&delta) {
                Ok(pcm) => SessionEvent::AudioDelta {
                    item_id: opt_str(raw, "item_id"),
                    pcm,
                },
                Err(e) => SessionEvent::Error {
                    message: format!("undecodable audio delta: {}", e),
                },
            }
        }

        "output_audio_buffer.started" => SessionEvent::OutputAudioStarted,
        "output_audio_buffer.stopped" | "output_audio_buffer.cleared" => {
            SessionEvent::OutputAudioStopped
        }

        "input_audio_buffer.speech_started" => SessionEvent::SpeechStarted,
        "input_audio_buffer.speech_stopped" => SessionEvent::SpeechStopped,
        "input_audio_buffer.committed" => match opt_str(raw, "item_id") {
            Some(item_id) => SessionEvent::InputCommitted { item_id },
            None => SessionEvent::Unknown(raw.clone()),
        },

        "error" => SessionEvent::Error {
            message: raw["error"]
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("unspecified provider error")
                .to_string(),
        },

        _ => SessionEvent::Unknown(raw.clone()),
    }
}

// =============================================================================
// Direct provider dialect
// =============================================================================

/// Adapter for the direct realtime API dialect.
pub struct OpenAiAdapter;

const OPENAI_NAMES: WireNames = WireNames {
    transcript_delta: "response.audio_transcript.delta",
    transcript_done: "response.audio_transcript.done",
    audio_delta: "response.audio.delta",
};

impl ProviderAdapter for OpenAiAdapter {
    fn parse(&self, raw: &Value) -> SessionEvent {
        parse_with_names(raw, &OPENAI_NAMES)
    }

    fn session_update(&self, spec: &SessionSpec) -> Value {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                modalities: Some(vec!["text".to_string(), "audio".to_string()]),
                instructions: Some(spec.instructions.clone()),
                voice: Some(spec.voice.clone()),
                input_audio_transcription: Some(InputAudioTranscription {
                    model: spec.transcription_model.clone(),
                    language: Some(spec.language.clone()),
                }),
                turn_detection: Some(TurnDetection::ServerVad {
                    threshold: Some(0.5),
                    prefix_padding_ms: Some(300),
                    silence_duration_ms: Some(600),
                }),
                tools: Some(vec![ToolDef::end_interview()]),
                tool_choice: Some("auto".to_string()),
            },
        };
        serde_json::to_value(event).unwrap_or(Value::Null)
    }

    fn greeting(&self, instructions: &str) -> Value {
        serde_json::to_value(ClientEvent::greeting(instructions)).unwrap_or(Value::Null)
    }

    fn audio_append(&self, pcm: &[u8]) -> Value {
        serde_json::to_value(ClientEvent::audio_append(pcm)).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Gateway dialect
// =============================================================================

/// Adapter for the enterprise-gateway variant, which renames the assistant
/// transcript/audio events and nests the audio configuration.
pub struct GatewayAdapter;

const GATEWAY_NAMES: WireNames = WireNames {
    transcript_delta: "response.output_audio_transcript.delta",
    transcript_done: "response.output_audio_transcript.done",
    audio_delta: "response.output_audio.delta",
};

impl ProviderAdapter for GatewayAdapter {
    fn parse(&self, raw: &Value) -> SessionEvent {
        parse_with_names(raw, &GATEWAY_NAMES)
    }

    fn session_update(&self, spec: &SessionSpec) -> Value {
        let tool = ToolDef::end_interview();
        serde_json::json!({
            "type": "session.update",
            "session": {
                "type": "realtime",
                "output_modalities": ["audio"],
                "instructions": spec.instructions,
                "audio": {
                    "input": {
                        "format": { "type": "audio/pcm", "rate": 24000 },
                        "transcription": {
                            "model": spec.transcription_model,
                            "language": spec.language,
                        },
                        "turn_detection": {
                            "type": "server_vad",
                            "threshold": 0.5,
                            "prefix_padding_ms": 300,
                            "silence_duration_ms": 600,
                        },
                    },
                    "output": {
                        "format": { "type": "audio/pcm", "rate": 24000 },
                        "voice": spec.voice,
                    },
                },
                "tools": [serde_json::to_value(tool).unwrap_or(Value::Null)],
                "tool_choice": "auto",
            }
        })
    }

    fn greeting(&self, instructions: &str) -> Value {
        serde_json::to_value(ClientEvent::greeting(instructions)).unwrap_or(Value::Null)
    }

    fn audio_append(&self, pcm: &[u8]) -> Value {
        serde_json::to_value(ClientEvent::audio_append(pcm)).unwrap_or(Value::Null)
    }
}

// =============================================================================
// Tests
// =============================================================================
