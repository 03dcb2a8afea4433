//! Engine error taxonomy.
//!
//! Graph-class errors (`MissingState`, `BackstoryNesting`) are authoring
//! faults that should not occur against a validated graph. `InvalidOption` is
//! recoverable (re-prompt the player). `LoopDetected` is fatal for the
//! session and falls back to forced progression repair.
//! `CriticalRewardFailure` is reported but leaves the reward grantable by a
//! later call site. `ReentrantDispatch` is a programming fault in event
//! wiring. Errors are also reported on the event bus as `EngineFault` events
//! before being returned, so diagnostics see them even if a caller swallows
//! the result.

use thiserror::Error;

use dialogue_graph::{OptionId, StateId};

use crate::economy::ResourceId;
use crate::events::EventKind;
use crate::rewards::{RewardId, StoreError};

/// All errors the progression engine can surface.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("state `{0}` is not part of the dialogue graph")]
    MissingState(StateId),

    #[error("backstory state `{state}` cannot open another backstory digression")]
    BackstoryNesting { state: StateId },

    #[error("option `{option}` is not available in state `{state}`")]
    InvalidOption { state: StateId, option: OptionId },

    #[error("visit cap exceeded entering `{state}` ({visits} of {cap} allowed)")]
    LoopDetected {
        state: StateId,
        visits: u32,
        cap: u32,
    },

    #[error("no transition available from state `{0}`")]
    NoTransition(StateId),

    #[error("session is already terminal")]
    SessionTerminal,

    #[error("no active dialogue session")]
    NoSession,

    #[error("dialogue session has not reached a conclusion")]
    SessionNotTerminal,

    #[error("unknown resource `{0}`")]
    UnknownResource(ResourceId),

    #[error("critical reward `{reward}` failed to persist after {attempts} attempt(s): {source}")]
    CriticalRewardFailure {
        reward: RewardId,
        attempts: u32,
        source: StoreError,
    },

    #[error("re-entrant dispatch of `{0}` events")]
    ReentrantDispatch(EventKind),
}

impl EngineError {
    /// Stable short code used when reporting the error as an `EngineFault`
    /// bus event.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::MissingState(_) => "missing-state",
            EngineError::BackstoryNesting { .. } => "backstory-nesting",
            EngineError::InvalidOption { .. } => "invalid-option",
            EngineError::LoopDetected { .. } => "loop-detected",
            EngineError::NoTransition(_) => "no-transition",
            EngineError::SessionTerminal => "session-terminal",
            EngineError::NoSession => "no-session",
            EngineError::SessionNotTerminal => "session-not-terminal",
            EngineError::UnknownResource(_) => "unknown-resource",
            EngineError::CriticalRewardFailure { .. } => "critical-reward-failure",
            EngineError::ReentrantDispatch(_) => "reentrant-dispatch",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::InvalidOption {
            state: StateId::new("intro"),
            option: OptionId::new("ghost"),
        };
        assert_eq!(
            err.to_string(),
            "option `ghost` is not available in state `intro`"
        );
        assert_eq!(err.code(), "invalid-option");
    }

    #[test]
    fn test_loop_detected_display() {
        let err = EngineError::LoopDetected {
            state: StateId::new("memory"),
            visits: 2,
            cap: 1,
        };
        assert!(err.to_string().contains("memory"));
        assert_eq!(err.code(), "loop-detected");
    }
}
