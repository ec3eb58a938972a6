//! Termination sequencing for the end of an interview.
//!
//! The model signals the end with a function call, but tearing down right
//! there would truncate the goodbye still playing. The coordinator holds the
//! end pending until assistant playback drains, with a fail-safe window in
//! case the playback-stopped event never arrives. `already_ended` is a
//! write-once fence: however many triggers race, teardown decides once.

use std::collections::HashSet;

use tracing::{debug, info, warn};

/// What the orchestrator should do after feeding the coordinator an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Nothing to do
    Ignore,
    /// Arm the fail-safe timer; teardown comes later
    ArmFailsafe,
    /// Run the single teardown path now
    Teardown(EndCause),
}

/// Why the session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndCause {
    /// Model signaled completion and its goodbye finished playing
    AssistantCompleted,
    /// Fail-safe window elapsed with no playback-stopped event
    FailSafe,
    /// User stopped the session
    UserStop,
    /// Control channel closed underneath the session
    ChannelClosed,
}

impl EndCause {
    /// Human-readable cause for the terminal transcript line.
    pub fn as_str(&self) -> &'static str {
        match self {
            EndCause::AssistantCompleted => "interview completed",
            EndCause::FailSafe => "interview completed (playback timeout)",
            EndCause::UserStop => "stopped by user",
            EndCause::ChannelClosed => "connection closed",
        }
    }
}

/// One-way `ACTIVE -> ENDING -> ENDED` state machine.
#[derive(Debug, Default)]
pub struct TerminationCoordinator {
    already_ended: bool,
    pending_end: bool,
    output_audio_active: bool,
    seen_end_signals: HashSet<String>,
}

impl TerminationCoordinator {
    /// Create a coordinator in the active state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether teardown has already been decided.
    pub fn ended(&self) -> bool {
        self.already_ended
    }

    /// Whether an end signal is pending playback drain.
    pub fn pending(&self) -> bool {
        self.pending_end
    }

    /// An end-of-interview signal arrived (function call, through any of its
    /// wire shapes). Deduplicated by call identity; the first occurrence arms
    /// the fail-safe, never tears down directly.
    pub fn end_signal(&mut self, call_id: &str) -> Decision {
        if self.already_ended {
            return Decision::Ignore;
        }
        if !self.seen_end_signals.insert(call_id.to_string()) {
            debug!(call_id, "Duplicate end signal ignored");
            return Decision::Ignore;
        }
        if self.pending_end {
            return Decision::Ignore;
        }
        info!(call_id, "End of interview signaled, waiting for playback");
        self.pending_end = true;
        Decision::ArmFailsafe
    }

    /// Assistant playback started.
    pub fn output_audio_started(&mut self) -> Decision {
        self.output_audio_active = true;
        Decision::Ignore
    }

    /// Assistant playback drained. With an end pending this is the normal
    /// teardown trigger.
    pub fn output_audio_stopped(&mut self) -> Decision {
        self.output_audio_active = false;
        if self.pending_end && !self.already_ended {
            self.already_ended = true;
            return Decision::Teardown(EndCause::AssistantCompleted);
        }
        Decision::Ignore
    }

    /// The armed fail-safe elapsed.
    pub fn failsafe_fired(&mut self) -> Decision {
        if self.pending_end && !self.already_ended {
            warn!("Playback-stopped event never arrived, tearing down on fail-safe");
            self.already_ended = true;
            return Decision::Teardown(EndCause::FailSafe);
        }
        Decision::Ignore
    }

    /// The user stopped the session. Bypasses the pending dance.
    pub fn user_stop(&mut self) -> Decision {
        if self.already_ended {
            return Decision::Ignore;
        }
        self.already_ended = true;
        Decision::Teardown(EndCause::UserStop)
    }

    /// The control channel closed underneath the session.
    pub fn channel_closed(&mut self) -> Decision {
        if self.already_ended {
            return Decision::Ignore;
        }
        self.already_ended = true;
        Decision::Teardown(EndCause::ChannelClosed)
    }
}
