//! Transcript assembly from loosely-ordered realtime events.
//!
//! Provider events for one spoken turn arrive through several channels with
//! no ordering guarantee between them: item creation, streaming deltas,
//! terminal transcripts, and sometimes the same text through more than one
//! terminal event. The assembler reconciles all of them into one turn per
//! item id, in creation order, without dropping any event on the floor.

use std::collections::HashMap;

use tracing::debug;

use crate::protocol::Role;

/// Per-role pointer to the item currently accumulating text.
///
/// Explicit state machine rather than a bare `Option<String>` mutated ad hoc:
/// the pointer advances on creation/delta for its role and clears on that
/// role's terminal event or the other role's creation.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ActiveItem {
    /// No in-progress item for this role
    #[default]
    None,
    /// Item currently accumulating text
    Active(String),
}

impl ActiveItem {
    fn id(&self) -> Option<&str> {
        match self {
            ActiveItem::None => None,
            ActiveItem::Active(id) => Some(id),
        }
    }
}

/// One conversation turn.
#[derive(Debug, Clone)]
pub struct Turn {
    /// Provider item identifier
    pub item_id: String,
    /// Speaker role, immutable after creation
    pub role: Role,
    /// Accumulated text
    pub text: String,
    /// User turn created with no text yet (committed audio awaiting its
    /// transcription); cleared on first non-empty text
    pub pending: bool,
}

/// Orders and reconciles transcript events into turns.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    turns: Vec<Turn>,
    index: HashMap<String, usize>,
    active_user: ActiveItem,
    active_assistant: ActiveItem,
}

impl TranscriptAssembler {
    /// Create an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that an item came into existence. Creates an empty turn (pending
    /// for user items) and moves the role's active pointer onto it.
    pub fn item_created(&mut self, item_id: &str, role: Role) {
        self.ensure_turn(item_id, role);
        self.set_active(role, item_id);
    }

    /// Append a streaming delta to the turn for `item_id`, creating it if the
    /// delta arrived before the creation event.
    pub fn append(&mut self, item_id: &str, role: Role, delta: &str) {
        let idx = self.ensure_turn(item_id, role);
        let turn = &mut self.turns[idx];
        turn.text.push_str(delta);
        if !turn.text.is_empty() {
            turn.pending = false;
        }
        let role = turn.role;
        self.set_active(role, item_id);
    }

    /// Store the terminal text for a turn.
    ///
    /// Terminal events can arrive more than once for the same item, and a late
    /// one can carry less text than the deltas already accumulated; the length
    /// guard keeps the longest rendition.
    pub fn upsert(&mut self, item_id: &str, role: Role, full_text: &str) {
        let idx = self.ensure_turn(item_id, role);
        let turn = &mut self.turns[idx];
        if full_text.len() >= turn.text.len() {
            turn.text = full_text.to_string();
        } else {
            debug!(
                item_id,
                cached = turn.text.len(),
                incoming = full_text.len(),
                "Keeping longer cached transcript over terminal event"
            );
        }
        if !turn.text.is_empty() {
            turn.pending = false;
        }
        let role = turn.role;
        self.clear_active(role);
    }

    /// Append a client-generated status line (camera unavailable, session
    /// ended, and the like).
    pub fn system_line(&mut self, text: &str) {
        let item_id = format!("sys:{}", uuid::Uuid::new_v4());
        let idx = self.ensure_turn(&item_id, Role::System);
        self.turns[idx].text = text.to_string();
        self.turns[idx].pending = false;
    }

    /// Resolve the item id for an event that may not carry one: explicit id,
    /// then the role's active item, then an id synthesized from the response
    /// id, then a fresh uuid. Never drops the event.
    pub fn resolve_item_id(
        &self,
        role: Role,
        explicit: Option<&str>,
        response_id: Option<&str>,
    ) -> String {
        if let Some(id) = explicit {
            return id.to_string();
        }
        if let Some(id) = self.active_for(role).id() {
            return id.to_string();
        }
        match response_id {
            Some(rid) => format!("resp:{}", rid),
            None => uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Render the transcript as `"ROLE: text"` lines in creation order.
    /// Empty and still-pending turns are skipped.
    pub fn render(&self) -> String {
        self.turns
            .iter()
            .filter(|t| !t.text.is_empty() && !t.pending)
            .map(|t| format!("{}: {}", t.role.as_str().to_uppercase(), t.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Number of turns, including empty ones.
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether no turns exist yet.
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn ensure_turn(&mut self, item_id: &str, role: Role) -> usize {
        if let Some(&idx) = self.index.get(item_id) {
            return idx;
        }
        let idx = self.turns.len();
        self.turns.push(Turn {
            item_id: item_id.to_string(),
            role,
            text: String::new(),
            pending: role == Role::User,
        });
        self.index.insert(item_id.to_string(), idx);
        idx
    }

    fn active_for(&self, role: Role) -> &ActiveItem {
        match role {
            Role::Assistant => &self.active_assistant,
            _ => &self.active_user,
        }
    }

    fn set_active(&mut self, role: Role, item_id: &str) {
        match role {
            Role::Assistant => {
                self.active_assistant = ActiveItem::Active(item_id.to_string());
                // A new assistant item means the user's turn is over.
                self.active_user = ActiveItem::None;
            }
            Role::User => {
                self.active_user = ActiveItem::Active(item_id.to_string());
                self.active_assistant = ActiveItem::None;
            }
            Role::System => {}
        }
    }

    fn clear_active(&mut self, role: Role) {
        match role {
            Role::Assistant => self.active_assistant = ActiveItem::None,
            Role::User => self.active_user = ActiveItem::None,
            Role::System => {}
        }
    }
}
