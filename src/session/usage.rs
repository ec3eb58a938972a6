//! Token and speech-time accounting with advisory cost estimation.
//!
//! Usage arrives on terminal response events, and a response can be reported
//! more than once; the ledger counts each response id exactly once. Cost math
//! mirrors the published realtime-model price sheet: six token buckets plus a
//! flat per-minute rate over candidate speech time. Numbers here are
//! observability, never billing.

use std::collections::HashSet;
use std::time::Instant;

use serde::Serialize;
use tracing::debug;

use crate::config::RateTable;
use crate::protocol::Usage;

const TOKENS_PER_UNIT: f64 = 1_000_000.0;

/// Accumulated usage counters plus the idempotence fence.
#[derive(Debug, Default)]
pub struct UsageLedger {
    text_in: u64,
    audio_in: u64,
    cached_text_in: u64,
    cached_audio_in: u64,
    text_out: u64,
    audio_out: u64,
    counted: HashSet<String>,
    speech_secs: f64,
    speech_started_at: Option<Instant>,
}

/// Rendered cost summary.
#[derive(Debug, Clone, Serialize)]
pub struct CostSummary {
    /// Non-cached text input tokens
    pub text_input_tokens: u64,
    /// Non-cached audio input tokens
    pub audio_input_tokens: u64,
    /// Cached text input tokens
    pub cached_text_input_tokens: u64,
    /// Cached audio input tokens
    pub cached_audio_input_tokens: u64,
    /// Text output tokens
    pub text_output_tokens: u64,
    /// Audio output tokens
    pub audio_output_tokens: u64,
    /// Candidate speech time in seconds
    pub speech_seconds: f64,
    /// Advisory total cost in USD
    pub estimated_cost_usd: f64,
}

impl UsageLedger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one terminal response's usage into the counters. Repeat reports
    /// for the same response id are ignored.
    pub fn record_response_usage(&mut self, response_id: &str, usage: &Usage) {
        if !self.counted.insert(response_id.to_string()) {
            debug!(response_id, "Usage already counted for response");
            return;
        }

        let input = usage.input_token_details.clone().unwrap_or_default();
        let output = usage.output_token_details.clone().unwrap_or_default();

        let input_text = input.text_tokens.unwrap_or(0);
        let input_audio = input.audio_tokens.unwrap_or(0);
        let cached = input.cached_tokens.unwrap_or(0);

        // Cached-token split: the provider sometimes breaks cached tokens
        // into text/audio, sometimes reports only the total. With no split,
        // attribute everything to cached audio (the dominant bucket).
        let (cached_text, cached_audio) = match input.cached_tokens_details {
            Some(details) => (details.text_tokens, details.audio_tokens),
            None => (0, cached),
        };

        self.cached_text_in += cached_text;
        self.cached_audio_in += cached_audio;
        self.text_in += input_text.saturating_sub(cached_text);
        self.audio_in += input_audio.saturating_sub(cached_audio);
        self.text_out += output.text_tokens.unwrap_or(0);
        self.audio_out += output.audio_tokens.unwrap_or(0);
    }

    /// Open a speech bracket. A bracket already open stays open.
    pub fn speech_started(&mut self) {
        if self.speech_started_at.is_none() {
            self.speech_started_at = Some(Instant::now());
        }
    }

    /// Close the open speech bracket and credit the elapsed time.
    pub fn speech_stopped(&mut self) {
        if let Some(started) = self.speech_started_at.take() {
            self.speech_secs += started.elapsed().as_secs_f64();
        }
    }

    /// Close any open bracket at teardown.
    pub fn finalize(&mut self) {
        self.speech_stopped();
    }

    /// Render the counters and an advisory total against `rates`.
    pub fn summary(&self, rates: &RateTable) -> CostSummary {
        let token_cost = |tokens: u64, per_m: f64| tokens as f64 / TOKENS_PER_UNIT * per_m;
        let estimated_cost_usd = token_cost(self.text_in, rates.text_input_per_m)
            + token_cost(self.cached_text_in, rates.cached_text_input_per_m)
            + token_cost(self.audio_in, rates.audio_input_per_m)
            + token_cost(self.cached_audio_in, rates.cached_audio_input_per_m)
            + token_cost(self.text_out, rates.text_output_per_m)
            + token_cost(self.audio_out, rates.audio_output_per_m)
            + self.speech_secs / 60.0 * rates.speech_per_minute;

        CostSummary {
            text_input_tokens: self.text_in,
            audio_input_tokens: self.audio_in,
            cached_text_input_tokens: self.cached_text_in,
            cached_audio_input_tokens: self.cached_audio_in,
            text_output_tokens: self.text_out,
            audio_output_tokens: self.audio_out,
            speech_seconds: self.speech_secs,
            estimated_cost_usd,
        }
    }
}
