//! Advisory cost rates for session usage summaries.
//!
//! Rates are injectable configuration, not constants baked into the ledger:
//! provider pricing drifts, and the summary is observability, never billing.
//! Defaults track the published realtime-model rates at the time of writing.

use serde::{Deserialize, Serialize};

/// Per-million-token rates for each usage bucket, plus a flat per-minute rate
/// applied to total candidate speech time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    /// USD per 1M non-cached text input tokens
    pub text_input_per_m: f64,
    /// USD per 1M cached text input tokens
    pub cached_text_input_per_m: f64,
    /// USD per 1M text output tokens
    pub text_output_per_m: f64,
    /// USD per 1M non-cached audio input tokens
    pub audio_input_per_m: f64,
    /// USD per 1M cached audio input tokens
    pub cached_audio_input_per_m: f64,
    /// USD per 1M audio output tokens
    pub audio_output_per_m: f64,
    /// Flat USD per minute of candidate speech
    pub speech_per_minute: f64,
}

impl Default for RateTable {
    fn default() -> Self {
        Self {
            text_input_per_m: 5.0,
            cached_text_input_per_m: 2.5,
            text_output_per_m: 20.0,
            audio_input_per_m: 40.0,
            cached_audio_input_per_m: 2.5,
            audio_output_per_m: 80.0,
            speech_per_minute: 0.06,
        }
    }
}

impl RateTable {
    /// Load the rate table from environment overrides on top of defaults.
    ///
    /// Recognized variables: `CANDOR_RATE_TEXT_IN`, `CANDOR_RATE_CACHED_TEXT_IN`,
    /// `CANDOR_RATE_TEXT_OUT`, `CANDOR_RATE_AUDIO_IN`, `CANDOR_RATE_CACHED_AUDIO_IN`,
    /// `CANDOR_RATE_AUDIO_OUT`, `CANDOR_RATE_SPEECH_MIN` (all USD).
    pub fn from_env() -> Self {
        let mut rates = Self::default();
        override_rate(&mut rates.text_input_per_m, "CANDOR_RATE_TEXT_IN");
        override_rate(
            &mut rates.cached_text_input_per_m,
            "CANDOR_RATE_CACHED_TEXT_IN",
        );
        override_rate(&mut rates.text_output_per_m, "CANDOR_RATE_TEXT_OUT");
        override_rate(&mut rates.audio_input_per_m, "CANDOR_RATE_AUDIO_IN");
        override_rate(
            &mut rates.cached_audio_input_per_m,
            "CANDOR_RATE_CACHED_AUDIO_IN",
        );
        override_rate(&mut rates.audio_output_per_m, "CANDOR_RATE_AUDIO_OUT");
        override_rate(&mut rates.speech_per_minute, "CANDOR_RATE_SPEECH_MIN");
        rates
    }
}

fn override_rate(slot: &mut f64, var: &str) {
    if let Ok(raw) = std::env::var(var) {
        match raw.parse::<f64>() {
            Ok(v) if v >= 0.0 => *slot = v,
            _ => tracing::warn!("Ignoring invalid rate override {}={}", var, raw),
        }
    }
}
