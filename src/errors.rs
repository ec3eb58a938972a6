//! Error taxonomy for interview sessions.
//!
//! Setup errors abort session start and are surfaced to the caller so the
//! start control can be re-armed. Errors during an active session are logged
//! and absorbed unless the control channel itself closes.

use thiserror::Error;

/// Errors that can occur over the life of an interview session.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Both negotiation paths failed. Carries the last HTTP status/body.
    #[error("negotiation failed ({status}): {body}")]
    Negotiation {
        /// HTTP status from the last attempted path
        status: u16,
        /// Response body from the last attempted path
        body: String,
    },

    /// Camera or microphone could not be acquired. Camera denial is
    /// non-fatal; microphone denial aborts the session.
    #[error("media access denied: {0}")]
    MediaAccess(String),

    /// Recording or transcript/analysis upload failed. Logged, never fatal.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Server-sent protocol error event or unparseable wire payload.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The control channel closed or refused a send.
    #[error("control channel closed")]
    ChannelClosed,

    /// Backend collaborator request failed.
    #[error("backend request failed: {0}")]
    Backend(String),

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

impl From<reqwest::Error> for SessionError {
    fn from(err: reqwest::Error) -> Self {
        SessionError::Backend(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_negotiation_error_display() {
        let err = SessionError::Negotiation {
            status: 502,
            body: "bad gateway".to_string(),
        };
        assert!(err.to_string().contains("502"));
        assert!(err.to_string().contains("bad gateway"));
    }

    #[test]
    fn test_channel_closed_display() {
        assert_eq!(
            SessionError::ChannelClosed.to_string(),
            "control channel closed"
        );
    }
}
