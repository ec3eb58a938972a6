//! Wire protocol for the realtime control channel.
//!
//! `events` holds the typed client-event and usage payload shapes; `adapter`
//! translates the two provider dialects into one internal event union.

pub mod adapter;
pub mod events;

pub use adapter::{
    provider_adapter, EndCall, GatewayAdapter, OpenAiAdapter, ProviderAdapter, Role, SessionEvent,
};
pub use events::{
    ClientEvent, InputAudioTranscription, SessionConfig, TokenDetails, ToolDef, TurnDetection,
    Usage,
};
