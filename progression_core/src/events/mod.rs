//! Engine events - the closed set of notifications crossing component
//! boundaries.
//!
//! Event payloads are the de facto contract with persistence, inventory, and
//! rendering collaborators: each carries everything needed to apply its
//! effect without re-querying engine internals. Adding optional fields is
//! safe; removing or renaming one is a breaking change.

mod bus;

pub use bus::*;

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use dialogue_graph::{ConceptId, DomainId, OptionId, SessionId, StateId};

use crate::economy::{CrossingDirection, ResourceId};
use crate::rewards::{RewardId, RewardTier, SaveId};

/// Everything the engine can announce.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineEvent {
    /// A valid option was selected on the current state.
    OptionSelected {
        session: SessionId,
        state: StateId,
        option: OptionId,
        critical_path: bool,
    },

    /// The session moved to a new state.
    StateChanged {
        session: SessionId,
        from: StateId,
        to: StateId,
    },

    /// The session cannot reach a conclusion without repair.
    ProgressionBlocked {
        session: SessionId,
        state: StateId,
        reason: String,
    },

    /// A forced repair jumped the session to a critical-path state. Synthetic
    /// counterpart of `StateChanged`, kept distinct for observability.
    ProgressionRepaired {
        session: SessionId,
        from: StateId,
        to: StateId,
    },

    /// The session reached a conclusion and was finalized.
    SessionCompleted { session: SessionId, score: i64 },

    /// Knowledge was granted by an option.
    KnowledgeGained {
        session: SessionId,
        concept: ConceptId,
        domain: DomainId,
        amount: u32,
    },

    /// A critical reward was granted or tier-upgraded. Never emitted for
    /// idempotent no-op grant calls.
    RewardGranted {
        save: SaveId,
        reward: RewardId,
        tier: RewardTier,
        upgraded: bool,
    },

    /// A bounded resource changed value. Only emitted when the clamped value
    /// actually differs from the prior value.
    ResourceChanged {
        resource: ResourceId,
        previous: i64,
        value: i64,
    },

    /// The momentum streak was broken, as opposed to an ordinary spend.
    MomentumReset { previous: i64 },

    /// A registered threshold was crossed. One-shot per crossing direction.
    ThresholdCrossed {
        resource: ResourceId,
        threshold: i64,
        direction: CrossingDirection,
    },

    /// An engine error, reported for observability before it is returned.
    EngineFault { code: String, message: String },
}

impl EngineEvent {
    /// The subscription key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            EngineEvent::OptionSelected { .. } => EventKind::OptionSelected,
            EngineEvent::StateChanged { .. } => EventKind::StateChanged,
            EngineEvent::ProgressionBlocked { .. } => EventKind::ProgressionBlocked,
            EngineEvent::ProgressionRepaired { .. } => EventKind::ProgressionRepaired,
            EngineEvent::SessionCompleted { .. } => EventKind::SessionCompleted,
            EngineEvent::KnowledgeGained { .. } => EventKind::KnowledgeGained,
            EngineEvent::RewardGranted { .. } => EventKind::RewardGranted,
            EngineEvent::ResourceChanged { .. } => EventKind::ResourceChanged,
            EngineEvent::MomentumReset { .. } => EventKind::MomentumReset,
            EngineEvent::ThresholdCrossed { .. } => EventKind::ThresholdCrossed,
            EngineEvent::EngineFault { .. } => EventKind::EngineFault,
        }
    }
}

/// Fieldless discriminant of [`EngineEvent`], used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    OptionSelected,
    StateChanged,
    ProgressionBlocked,
    ProgressionRepaired,
    SessionCompleted,
    KnowledgeGained,
    RewardGranted,
    ResourceChanged,
    MomentumReset,
    ThresholdCrossed,
    EngineFault,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventKind::OptionSelected => "option-selected",
            EventKind::StateChanged => "state-changed",
            EventKind::ProgressionBlocked => "progression-blocked",
            EventKind::ProgressionRepaired => "progression-repaired",
            EventKind::SessionCompleted => "session-completed",
            EventKind::KnowledgeGained => "knowledge-gained",
            EventKind::RewardGranted => "reward-granted",
            EventKind::ResourceChanged => "resource-changed",
            EventKind::MomentumReset => "momentum-reset",
            EventKind::ThresholdCrossed => "threshold-crossed",
            EventKind::EngineFault => "engine-fault",
        };
        write!(f, "{}", name)
    }
}

/// An immutable dispatched event record.
#[derive(Debug, Clone, Serialize)]
pub struct EventRecord {
    /// Monotonic dispatch sequence number, unique per bus.
    pub sequence: u64,

    /// Wall-clock dispatch time, for diagnostics only.
    pub timestamp: SystemTime,

    /// Originating component identifier.
    pub source: &'static str,

    pub event: EngineEvent,
}
