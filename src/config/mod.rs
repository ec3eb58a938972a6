//! Configuration for the interview session client.
//!
//! Settings come from environment variables (after an optional `.env` load in
//! `main`), with defaults suitable for local development. Priority:
//! ENV vars > .env values > defaults.

use std::time::Duration;

use crate::errors::{SessionError, SessionResult};

pub mod rates;

pub use rates::RateTable;

/// Default provider endpoint for the direct negotiation fallback.
pub const DEFAULT_PROVIDER_URL: &str = "https://api.openai.com/v1/realtime";

/// Default realtime model.
pub const DEFAULT_MODEL: &str = "gpt-4o-realtime-preview";

/// Default TTS voice.
pub const DEFAULT_VOICE: &str = "alloy";

/// Default transcription model for candidate audio.
pub const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";

/// Fail-safe window after an end-of-interview signal with no playback-stopped
/// event, in seconds.
pub const DEFAULT_FAILSAFE_SECS: u64 = 5;

/// Client settings for one interview run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base URL of the backend collaborator (session CRUD, relay, uploads)
    pub backend_url: String,
    /// Provider realtime endpoint for the direct fallback path
    pub provider_url: String,
    /// Realtime model identifier
    pub model: String,
    /// TTS voice
    pub voice: String,
    /// Transcription language hint (BCP-47)
    pub language: String,
    /// Input-audio transcription model
    pub transcription_model: String,
    /// Fail-safe teardown window
    pub failsafe: Duration,
    /// Advisory cost rates
    pub rates: RateTable,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend_url: "http://localhost:3000".to_string(),
            provider_url: DEFAULT_PROVIDER_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            voice: DEFAULT_VOICE.to_string(),
            language: "en".to_string(),
            transcription_model: DEFAULT_TRANSCRIPTION_MODEL.to_string(),
            failsafe: Duration::from_secs(DEFAULT_FAILSAFE_SECS),
            rates: RateTable::default(),
        }
    }
}

impl Settings {
    /// Load settings from environment variables.
    pub fn from_env() -> SessionResult<Self> {
        let defaults = Self::default();
        let settings = Self {
            backend_url: env_or("CANDOR_BACKEND_URL", &defaults.backend_url),
            provider_url: env_or("CANDOR_PROVIDER_URL", &defaults.provider_url),
            model: env_or("CANDOR_MODEL", &defaults.model),
            voice: env_or("CANDOR_VOICE", &defaults.voice),
            language: env_or("CANDOR_LANGUAGE", &defaults.language),
            transcription_model: env_or(
                "CANDOR_TRANSCRIPTION_MODEL",
                &defaults.transcription_model,
            ),
            failsafe: Duration::from_secs(
                std::env::var("CANDOR_FAILSAFE_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_FAILSAFE_SECS),
            ),
            rates: RateTable::from_env(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Validate the settings.
    pub fn validate(&self) -> SessionResult<()> {
        if self.backend_url.trim().is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "backend URL must not be empty".to_string(),
            ));
        }
        match url::Url::parse(&self.backend_url) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {}
            Ok(parsed) => {
                return Err(SessionError::InvalidConfiguration(format!(
                    "backend URL must be http(s), got {}",
                    parsed.scheme()
                )));
            }
            Err(e) => {
                return Err(SessionError::InvalidConfiguration(format!(
                    "backend URL invalid: {}",
                    e
                )));
            }
        }
        if self.model.trim().is_empty() {
            return Err(SessionError::InvalidConfiguration(
                "model must not be empty".to_string(),
            ));
        }
        if self.failsafe.is_zero() {
            return Err(SessionError::InvalidConfiguration(
                "fail-safe window must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_string())
}
