//! Transport negotiation and the control channel seam.
//!
//! Negotiation is relay-first: the SDP offer goes through the backend, which
//! holds the provider credentials. If the relay is unreachable the client
//! falls back to minting an ephemeral token and posting the offer to the
//! provider directly. One attempt per path, no retry loop; a failed start is
//! surfaced to the user, who starts again.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::api::{read_sdp_answer, BackendClient};
use crate::errors::SessionResult;

pub mod ws;

pub use ws::WsControlChannel;

/// Outbound half of the realtime control channel.
#[async_trait]
pub trait ControlChannel: Send + Sync {
    /// Send a client event.
    async fn send(&self, event: Value) -> SessionResult<()>;

    /// Close the channel. Idempotent.
    async fn close(&self);
}

/// Relay-first SDP negotiation with a direct-to-provider fallback.
pub struct Negotiator {
    backend: BackendClient,
    http: reqwest::Client,
    provider_url: String,
    model: String,
}

impl Negotiator {
    /// Create a negotiator for one session.
    pub fn new(
        backend: BackendClient,
        provider_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            http: reqwest::Client::new(),
            provider_url: provider_url.into(),
            model: model.into(),
        }
    }

    /// Negotiate the session: returns the provider SDP answer.
    pub async fn negotiate(&self, session_id: &str, offer_sdp: &str) -> SessionResult<String> {
        match self.backend.relay_offer(session_id, offer_sdp).await {
            Ok(answer) => {
                info!("Negotiated via backend relay");
                Ok(answer)
            }
            Err(e) => {
                warn!(error = %e, "Relay negotiation failed, trying direct path");
                self.negotiate_direct(session_id, offer_sdp).await
            }
        }
    }

    /// Fallback: mint an ephemeral token, post the offer to the provider.
    async fn negotiate_direct(&self, session_id: &str, offer_sdp: &str) -> SessionResult<String> {
        let client_secret = self.backend.fetch_client_secret(session_id).await?;
        let response = self
            .http
            .post(format!("{}?model={}", self.provider_url, self.model))
            .header(reqwest::header::AUTHORIZATION, format!("Bearer {}", client_secret))
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await?;
        let answer = read_sdp_answer(response).await?;
        info!("Negotiated directly with provider");
        Ok(answer)
    }
}
