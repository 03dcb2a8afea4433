//! The dialogue graph - an immutable, author-supplied directed graph of
//! narrative states and player-selectable options.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

use crate::states::{CheckpointId, DialogueOption, DialogueState, OptionId, StateId};
use crate::validate::{validate_graph, ValidationError};

/// Errors raised while loading an authored graph document.
#[derive(Debug, Error)]
pub enum GraphLoadError {
    #[error("malformed graph document: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("graph failed validation with {} error(s)", .0.len())]
    Invalid(Vec<ValidationError>),
}

/// A validated directed graph of dialogue states.
///
/// The graph is authored declaratively, validated at load time, and immutable
/// afterwards. The engine assumes a validated graph at construction; runtime
/// lookups of missing states are authoring faults, not normal conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueGraph {
    /// The state a session starts in.
    pub initial: StateId,

    /// All states, keyed by id.
    pub states: HashMap<StateId, DialogueState>,
}

impl DialogueGraph {
    /// Create an empty graph with the given initial state id.
    ///
    /// States are added with [`DialogueGraph::with_state`]; the result should
    /// be validated before use.
    pub fn new(initial: impl Into<String>) -> Self {
        Self {
            initial: StateId::new(initial),
            states: HashMap::new(),
        }
    }

    /// Add a state to the graph.
    pub fn with_state(mut self, state: DialogueState) -> Self {
        self.states.insert(state.id.clone(), state);
        self
    }

    /// Load a graph from a declarative JSON document and validate it.
    pub fn from_json(document: &str) -> Result<Self, GraphLoadError> {
        let graph: DialogueGraph = serde_json::from_str(document)?;
        let result = validate_graph(&graph);
        if result.is_valid() {
            Ok(graph)
        } else {
            Err(GraphLoadError::Invalid(result.errors))
        }
    }

    /// Look up a state by id.
    pub fn state(&self, id: &StateId) -> Option<&DialogueState> {
        self.states.get(id)
    }

    /// The initial state, if present.
    pub fn initial_state(&self) -> Option<&DialogueState> {
        self.states.get(&self.initial)
    }

    /// Look up an option on a specific state.
    pub fn option_on(&self, state: &StateId, option: &OptionId) -> Option<&DialogueOption> {
        self.state(state).and_then(|s| s.option(option))
    }

    /// Number of states in the graph.
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Iterate over all states.
    pub fn iter_states(&self) -> impl Iterator<Item = &DialogueState> {
        self.states.values()
    }

    /// Every critical-path checkpoint carried by the graph's states and
    /// options, in a deterministic order.
    pub fn checkpoints(&self) -> Vec<CheckpointId> {
        let mut checkpoints = Vec::new();
        for state in self.states.values() {
            if state.is_critical_path {
                checkpoints.push(CheckpointId::state(&state.id));
            }
            for option in &state.options {
                if option.is_critical_path {
                    checkpoints.push(CheckpointId::option(&option.id));
                }
            }
        }
        checkpoints.sort();
        checkpoints
    }

    /// All states marked mandatory.
    pub fn mandatory_states(&self) -> Vec<&StateId> {
        let mut states: Vec<_> = self
            .states
            .values()
            .filter(|s| s.is_mandatory)
            .map(|s| &s.id)
            .collect();
        states.sort();
        states
    }

    /// States that are only ever reached through backstory-triggering options.
    ///
    /// These are side content: exempt from main-path reachability checks.
    pub fn backstory_targets(&self) -> HashSet<StateId> {
        let mut targets = HashSet::new();
        for state in self.states.values() {
            for option in &state.options {
                if option.triggers_backstory {
                    targets.insert(option.next_state.clone());
                }
            }
        }
        targets
    }

    /// Outgoing edges of a state: the linear next state plus every option
    /// target.
    pub fn edges_from<'a>(&self, state: &'a DialogueState) -> impl Iterator<Item = &'a StateId> {
        state
            .next_state
            .iter()
            .chain(state.options.iter().map(|o| &o.next_state))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::StateKind;

    fn two_state_graph() -> DialogueGraph {
        DialogueGraph::new("intro")
            .with_state(
                DialogueState::new("intro", StateKind::Intro, "Hello")
                    .with_option(DialogueOption::new("go", "Continue", "end")),
            )
            .with_state(DialogueState::new("end", StateKind::Conclusion, "Bye"))
    }

    #[test]
    fn test_lookups() {
        let graph = two_state_graph();

        assert!(graph.initial_state().is_some());
        assert!(graph.state(&StateId::new("end")).is_some());
        assert!(graph.state(&StateId::new("missing")).is_none());
        assert!(graph
            .option_on(&StateId::new("intro"), &OptionId::new("go"))
            .is_some());
        assert_eq!(graph.state_count(), 2);
    }

    #[test]
    fn test_checkpoints_collected_from_states_and_options() {
        let graph = DialogueGraph::new("intro")
            .with_state(
                DialogueState::new("intro", StateKind::Intro, "Hi")
                    .with_option(DialogueOption::new("deep", "Ask", "gift").critical_path()),
            )
            .with_state(DialogueState::new("gift", StateKind::CriticalMoment, "Take this").critical_path());

        let checkpoints = graph.checkpoints();
        assert_eq!(checkpoints.len(), 2);
        assert!(checkpoints.contains(&CheckpointId::state(&StateId::new("gift"))));
        assert!(checkpoints.contains(&CheckpointId::option(&OptionId::new("deep"))));
    }

    #[test]
    fn test_backstory_targets() {
        let graph = DialogueGraph::new("intro").with_state(
            DialogueState::new("intro", StateKind::Intro, "Hi")
                .with_option(DialogueOption::new("past", "Tell me more", "memory").backstory()),
        );

        let targets = graph.backstory_targets();
        assert!(targets.contains(&StateId::new("memory")));
    }

    #[test]
    fn test_from_json_rejects_invalid_graph() {
        // Option points at a state that does not exist.
        let document = r#"{
            "initial": "intro",
            "states": {
                "intro": {
                    "id": "intro",
                    "kind": "intro",
                    "text": "Hello",
                    "options": [
                        {"id": "go", "text": "Continue", "next_state": "nowhere"}
                    ]
                }
            }
        }"#;

        match DialogueGraph::from_json(document) {
            Err(GraphLoadError::Invalid(errors)) => assert!(!errors.is_empty()),
            other => panic!("expected validation failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_from_json_accepts_valid_graph() {
        let document = r#"{
            "initial": "intro",
            "states": {
                "intro": {
                    "id": "intro",
                    "kind": "intro",
                    "text": "Hello",
                    "options": [
                        {"id": "go", "text": "Continue", "next_state": "end"}
                    ]
                },
                "end": {"id": "end", "kind": "conclusion", "text": "Bye"}
            }
        }"#;

        let graph = DialogueGraph::from_json(document).expect("valid graph");
        assert_eq!(graph.state_count(), 2);
    }
}
