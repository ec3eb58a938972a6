pub mod api;
pub mod config;
pub mod errors;
pub mod media;
pub mod protocol;
pub mod session;
pub mod transport;

// Re-export commonly used items for convenience
pub use api::{Backend, BackendClient, SessionDescriptor};
pub use config::Settings;
pub use errors::{SessionError, SessionResult};
pub use session::{InterviewSession, SessionControl, SessionReport};
