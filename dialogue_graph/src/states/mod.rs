//! Dialogue state definitions - the nodes of an authored dialogue graph.

mod options;

pub use options::*;

use serde::{Deserialize, Serialize};

/// Visit cap applied to backstory states that do not set an explicit
/// `max_visits`. Backstory digressions may be revisited, but never unboundedly.
pub const BACKSTORY_VISIT_CAP: u32 = 3;

/// Unique identifier for a dialogue state within a graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateId(pub String);

impl StateId {
    /// Create a new state ID from an authored string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an option within its parent state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OptionId(pub String);

impl OptionId {
    /// Create a new option ID from an authored string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for the character a dialogue belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterId(pub String);

impl CharacterId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for CharacterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a knowledge concept.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConceptId(pub String);

impl ConceptId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for ConceptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a knowledge domain (a grouping of concepts).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainId(pub String);

impl DomainId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for DomainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a critical-path checkpoint.
///
/// Checkpoints are derived from the states and options that carry the
/// critical-path flag, prefixed by where they live so a state and an option
/// with the same authored id never collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckpointId(pub String);

impl CheckpointId {
    /// Checkpoint for a critical-path state.
    pub fn state(id: &StateId) -> Self {
        Self(format!("state:{}", id.0))
    }

    /// Checkpoint for a critical-path option.
    pub fn option(id: &OptionId) -> Self {
        Self(format!("option:{}", id.0))
    }
}

impl std::fmt::Display for CheckpointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role a state plays in the dialogue flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StateKind {
    /// Opening beat of a dialogue.
    Intro,
    /// A state presenting player-selectable options.
    Question,
    /// A character response shown after a choice.
    Response,
    /// An optional digression that returns to the state that triggered it.
    Backstory,
    /// A mandatory narrative beat on the critical path.
    CriticalMoment,
    /// A terminal state; entering one with no further transition ends the session.
    Conclusion,
    /// A linear connective state that auto-advances.
    Transition,
}

impl StateKind {
    pub fn is_conclusion(&self) -> bool {
        matches!(self, StateKind::Conclusion)
    }

    pub fn is_backstory(&self) -> bool {
        matches!(self, StateKind::Backstory)
    }
}

/// A single authored state in a dialogue graph.
///
/// States are immutable after authoring; all per-session bookkeeping lives in
/// [`crate::DialogueContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueState {
    pub id: StateId,
    pub kind: StateKind,

    /// The narrative text shown for this state.
    pub text: String,

    /// Player-selectable options, if any.
    #[serde(default)]
    pub options: Vec<DialogueOption>,

    /// Next state for linear auto-advance states.
    #[serde(default)]
    pub next_state: Option<StateId>,

    /// Must be visited for a session to count as validly completed.
    #[serde(default)]
    pub is_mandatory: bool,

    /// Marks a narrative beat required for reward eligibility.
    #[serde(default)]
    pub is_critical_path: bool,

    /// Explicit visit cap override. When absent, the cap defaults to 1 for
    /// non-backstory states and [`BACKSTORY_VISIT_CAP`] for backstory states.
    #[serde(default)]
    pub max_visits: Option<u32>,
}

impl DialogueState {
    /// Create a new state with the given id, kind, and text.
    pub fn new(id: impl Into<String>, kind: StateKind, text: impl Into<String>) -> Self {
        Self {
            id: StateId::new(id),
            kind,
            text: text.into(),
            options: Vec::new(),
            next_state: None,
            is_mandatory: false,
            is_critical_path: false,
            max_visits: None,
        }
    }

    /// Add an option to this state.
    pub fn with_option(mut self, option: DialogueOption) -> Self {
        self.options.push(option);
        self
    }

    /// Set the linear next state.
    pub fn with_next(mut self, next: impl Into<String>) -> Self {
        self.next_state = Some(StateId::new(next));
        self
    }

    /// Mark this state as mandatory.
    pub fn mandatory(mut self) -> Self {
        self.is_mandatory = true;
        self
    }

    /// Mark this state as a critical-path beat.
    pub fn critical_path(mut self) -> Self {
        self.is_critical_path = true;
        self
    }

    /// Override the visit cap.
    pub fn with_max_visits(mut self, cap: u32) -> Self {
        self.max_visits = Some(cap);
        self
    }

    /// The effective visit cap for this state.
    pub fn visit_cap(&self) -> u32 {
        self.max_visits.unwrap_or(if self.kind.is_backstory() {
            BACKSTORY_VISIT_CAP
        } else {
            1
        })
    }

    /// Look up an option on this state by id.
    pub fn option(&self, id: &OptionId) -> Option<&DialogueOption> {
        self.options.iter().find(|o| &o.id == id)
    }

    /// Whether this state is a terminal conclusion (no further transition).
    pub fn is_terminal_conclusion(&self) -> bool {
        self.kind.is_conclusion() && self.next_state.is_none()
    }
}
