//! Client event and usage payload types for the realtime control channel.
//!
//! Client events (sent to the provider):
//! - session.update - push session configuration (language, voice, turn
//!   detection, transcription model, tool declarations)
//! - response.create - request a model response (used for the greeting)
//! - input_audio_buffer.append - append candidate audio to the input buffer
//!
//! Server events are deserialized as loose JSON and classified by the
//! provider adapters; see `protocol::adapter`.

use base64::prelude::*;
use serde::{Deserialize, Serialize};

// =============================================================================
// Session Configuration
// =============================================================================

/// Session configuration pushed once the control channel opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Response modalities (text, audio)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,

    /// System prompt driving the interview script
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,

    /// Voice for audio output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice: Option<String>,

    /// Input audio transcription configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<InputAudioTranscription>,

    /// Turn detection configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_detection: Option<TurnDetection>,

    /// Tool definitions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDef>>,

    /// Tool choice strategy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
}

/// Input audio transcription configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputAudioTranscription {
    /// Transcription model (e.g., "whisper-1")
    pub model: String,
    /// Transcription language hint (BCP-47)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Turn detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TurnDetection {
    /// Server-side VAD
    #[serde(rename = "server_vad")]
    ServerVad {
        /// Activation threshold
        #[serde(skip_serializing_if = "Option::is_none")]
        threshold: Option<f32>,
        /// Audio prefix padding in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        prefix_padding_ms: Option<u32>,
        /// Silence duration in ms
        #[serde(skip_serializing_if = "Option::is_none")]
        silence_duration_ms: Option<u32>,
    },
    /// Semantic VAD
    #[serde(rename = "semantic_vad")]
    SemanticVad {
        /// Eagerness level
        #[serde(skip_serializing_if = "Option::is_none")]
        eagerness: Option<String>,
    },
}

/// Tool definition for the end-of-interview function declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDef {
    /// Tool type (always "function")
    #[serde(rename = "type")]
    pub tool_type: String,
    /// Function name
    pub name: String,
    /// Function description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Function parameters JSON schema
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
}

impl ToolDef {
    /// The end-of-interview tool: the model invokes this instead of the
    /// client guessing completion from a timer. `reason` is required.
    pub fn end_interview() -> Self {
        Self {
            tool_type: "function".to_string(),
            name: "end_interview".to_string(),
            description: Some(
                "Call when the interview is complete, after saying goodbye to the candidate."
                    .to_string(),
            ),
            parameters: Some(serde_json::json!({
                "type": "object",
                "properties": {
                    "reason": {
                        "type": "string",
                        "description": "Why the interview is ending"
                    }
                },
                "required": ["reason"]
            })),
        }
    }
}

// =============================================================================
// Client Events (sent to the provider)
// =============================================================================

/// Response configuration for `response.create`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResponseConfig {
    /// One-off instructions for this response (the greeting)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
}

/// Client events sent over the control channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum ClientEvent {
    /// Update session configuration
    #[serde(rename = "session.update")]
    SessionUpdate {
        /// Session configuration
        session: SessionConfig,
    },

    /// Append audio to the input buffer
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend {
        /// Base64-encoded audio data
        audio: String,
    },

    /// Request a model response
    #[serde(rename = "response.create")]
    ResponseCreate {
        /// Response configuration
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseConfig>,
    },
}

impl ClientEvent {
    /// Create an audio append event from raw PCM bytes.
    pub fn audio_append(data: &[u8]) -> Self {
        ClientEvent::InputAudioBufferAppend {
            audio: BASE64_STANDARD.encode(data),
        }
    }

    /// Create a response request carrying greeting instructions.
    pub fn greeting(instructions: &str) -> Self {
        ClientEvent::ResponseCreate {
            response: Some(ResponseConfig {
                instructions: Some(instructions.to_string()),
            }),
        }
    }
}

// =============================================================================
// Usage payloads (carried by terminal response events)
// =============================================================================

/// Token usage carried by a terminal response event.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Usage {
    /// Total tokens
    #[serde(default)]
    pub total_tokens: u64,
    /// Input tokens
    #[serde(default)]
    pub input_tokens: u64,
    /// Output tokens
    #[serde(default)]
    pub output_tokens: u64,
    /// Input token details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_token_details: Option<TokenDetails>,
    /// Output token details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_token_details: Option<TokenDetails>,
}

/// Token usage details.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct TokenDetails {
    /// Cached tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
    /// Text tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_tokens: Option<u64>,
    /// Audio tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_tokens: Option<u64>,
    /// Cached token text/audio split, when the provider reports one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_tokens_details: Option<CachedTokenDetails>,
}

/// Text/audio split of the cached input tokens.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CachedTokenDetails {
    /// Cached text tokens
    #[serde(default)]
    pub text_tokens: u64,
    /// Cached audio tokens
    #[serde(default)]
    pub audio_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_append_roundtrip() {
        let data = vec![0u8, 1, 2, 3];
        let event = ClientEvent::audio_append(&data);
        match event {
            ClientEvent::InputAudioBufferAppend { audio } => {
                assert_eq!(BASE64_STANDARD.decode(&audio).unwrap(), data);
            }
            _ => panic!("Wrong event type"),
        }
    }

    #[test]
    fn test_session_update_serialization() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                modalities: Some(vec!["text".to_string(), "audio".to_string()]),
                instructions: Some("You are an interviewer.".to_string()),
                voice: Some("alloy".to_string()),
                input_audio_transcription: Some(InputAudioTranscription {
                    model: "whisper-1".to_string(),
                    language: Some("en".to_string()),
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
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("session.update"));
        assert!(json.contains("end_interview"));
        assert!(json.contains("server_vad"));
    }

    #[test]
    fn test_end_interview_tool_requires_reason() {
        let tool = ToolDef::end_interview();
        let params = tool.parameters.unwrap();
        assert_eq!(params["required"][0], "reason");
    }

    #[test]
    fn test_usage_deserialization_with_cached_split() {
        let json = r#"{
            "total_tokens": 100,
            "input_tokens": 60,
            "output_tokens": 40,
            "input_token_details": {
                "text_tokens": 20,
                "audio_tokens": 40,
                "cached_tokens": 15,
                "cached_tokens_details": { "text_tokens": 5, "audio_tokens": 10 }
            },
            "output_token_details": { "text_tokens": 10, "audio_tokens": 30 }
        }"#;
        let usage: Usage = serde_json::from_str(json).unwrap();
        let details = usage.input_token_details.unwrap();
        assert_eq!(details.cached_tokens, Some(15));
        let cached = details.cached_tokens_details.unwrap();
        assert_eq!(cached.text_tokens, 5);
        assert_eq!(cached.audio_tokens, 10);
    }

    #[test]
    fn test_greeting_serialization() {
        let event = ClientEvent::greeting("Greet the candidate warmly.");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("response.create"));
        assert!(json.contains("Greet the candidate"));
    }
}
