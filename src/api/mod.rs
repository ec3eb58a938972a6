//! Backend collaborator client.
//!
//! The backend owns session CRUD, the SDP relay, the ephemeral-token mint,
//! recording uploads and post-interview analysis. This module only calls
//! those endpoints; none of their logic lives here. `Backend` is a trait so
//! the session tests can drive the orchestrator without a server.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::{SessionError, SessionResult};
use crate::session::recording::MediaSink;

/// Immutable description of one scheduled interview, fetched once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionDescriptor {
    /// Session identifier
    pub session_id: String,
    /// System prompt driving the interview script
    pub system_prompt: String,
    /// Candidate display name
    #[serde(default)]
    pub candidate_name: Option<String>,
    /// Position being interviewed for
    #[serde(default)]
    pub job_title: Option<String>,
    /// Route the session through the enterprise-gateway provider variant
    #[serde(default)]
    pub use_alternate_provider: bool,
}

/// Backend operations the session depends on.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Fetch the session descriptor.
    async fn fetch_session(&self, session_id: &str) -> SessionResult<SessionDescriptor>;

    /// Update the session lifecycle status (`in-progress`, `completed`, ...).
    async fn update_status(&self, session_id: &str, status: &str) -> SessionResult<()>;

    /// Persist the rendered transcript.
    async fn save_transcript(&self, session_id: &str, transcript: &str) -> SessionResult<()>;

    /// Kick off post-interview analysis over the rendered transcript.
    async fn request_analysis(&self, session_id: &str, transcript: &str) -> SessionResult<()>;
}

/// HTTP client for the backend.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    base_url: String,
}

#[derive(Deserialize)]
struct TokenResponse {
    client_secret: String,
}

impl BackendClient {
    /// Create a client for the backend at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Relay an SDP offer through the backend; returns the provider answer.
    pub async fn relay_offer(&self, session_id: &str, offer_sdp: &str) -> SessionResult<String> {
        let response = self
            .http
            .post(self.url(&format!("/api/sessions/{}/relay", session_id)))
            .header(reqwest::header::CONTENT_TYPE, "application/sdp")
            .body(offer_sdp.to_string())
            .send()
            .await?;
        read_sdp_answer(response).await
    }

    /// Mint an ephemeral provider token for the direct negotiation fallback.
    pub async fn fetch_client_secret(&self, session_id: &str) -> SessionResult<String> {
        let response = self
            .http
            .get(self.url(&format!("/api/sessions/{}/token", session_id)))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SessionError::Negotiation {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.client_secret)
    }

    async fn check(&self, response: reqwest::Response) -> SessionResult<()> {
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SessionError::Backend(format!(
                "{} from {}",
                response.status(),
                response.url()
            )))
        }
    }
}

/// Read an SDP answer, mapping failure into a negotiation error.
pub(crate) async fn read_sdp_answer(response: reqwest::Response) -> SessionResult<String> {
    if response.status().is_success() {
        Ok(response.text().await?)
    } else {
        Err(SessionError::Negotiation {
            status: response.status().as_u16(),
            body: response.text().await.unwrap_or_default(),
        })
    }
}

#[async_trait]
impl Backend for BackendClient {
    async fn fetch_session(&self, session_id: &str) -> SessionResult<SessionDescriptor> {
        let response = self
            .http
            .get(self.url(&format!("/api/sessions/{}", session_id)))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(SessionError::Backend(format!(
                "session fetch returned {}",
                response.status()
            )));
        }
        Ok(response.json().await?)
    }

    async fn update_status(&self, session_id: &str, status: &str) -> SessionResult<()> {
        debug!(session_id, status, "Updating session status");
        let response = self
            .http
            .patch(self.url(&format!("/api/sessions/{}/status", session_id)))
            .json(&serde_json::json!({ "status": status }))
            .send()
            .await?;
        self.check(response).await
    }

    async fn save_transcript(&self, session_id: &str, transcript: &str) -> SessionResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/api/sessions/{}/transcript", session_id)))
            .json(&serde_json::json!({ "transcript": transcript }))
            .send()
            .await?;
        self.check(response).await
    }

    async fn request_analysis(&self, session_id: &str, transcript: &str) -> SessionResult<()> {
        let response = self
            .http
            .post(self.url(&format!("/api/sessions/{}/analyze", session_id)))
            .json(&serde_json::json!({ "transcript": transcript }))
            .send()
            .await?;
        self.check(response).await
    }
}

#[async_trait]
impl MediaSink for BackendClient {
    async fn upload(&self, session_id: &str, label: &str, data: Vec<u8>) -> SessionResult<()> {
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(format!("{}.ivcap", label))
            .mime_str("application/octet-stream")
            .map_err(|e| SessionError::Upload(e.to_string()))?;
        let form = reqwest::multipart::Form::new().part("file", part);
        let response = self
            .http
            .post(self.url(&format!("/api/sessions/{}/recordings", session_id)))
            .multipart(form)
            .send()
            .await
            .map_err(|e| SessionError::Upload(e.to_string()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SessionError::Upload(format!(
                "upload returned {}",
                response.status()
            )))
        }
    }
}
