//! Graph validation - authoring-time checks run before a graph is used.
//!
//! Failing validation is a build-time error in the authoring pipeline, not a
//! runtime condition: the engine assumes a validated graph at construction.

use std::collections::{HashSet, VecDeque};
use thiserror::Error;

use crate::graph::DialogueGraph;
use crate::states::{OptionId, StateId};

/// A single defect found in an authored graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("initial state `{0}` does not exist")]
    MissingInitialState(StateId),

    #[error("state `{from}` advances to missing state `{to}`")]
    DanglingStateRef { from: StateId, to: StateId },

    #[error("option `{option}` on state `{state}` targets missing state `{to}`")]
    DanglingOptionRef {
        state: StateId,
        option: OptionId,
        to: StateId,
    },

    #[error("state `{state}` declares option id `{option}` more than once")]
    DuplicateOptionId { state: StateId, option: OptionId },

    #[error("state `{0}` is unreachable from the initial state")]
    UnreachableState(StateId),

    #[error("mandatory state `{0}` is unreachable from the initial state")]
    UnreachableMandatory(StateId),

    #[error("backstory state `{state}` carries backstory-triggering option `{option}`")]
    NestedBackstory { state: StateId, option: OptionId },
}

/// The outcome of validating a graph.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Validate an authored graph.
///
/// Checks reference integrity, initial-state presence, main-path reachability
/// (backstory-only side content is exempt), mandatory-state reachability, and
/// the one-level backstory nesting cap.
pub fn validate_graph(graph: &DialogueGraph) -> ValidationResult {
    let mut errors = Vec::new();

    if graph.initial_state().is_none() {
        errors.push(ValidationError::MissingInitialState(graph.initial.clone()));
        // Nothing else is meaningful without an entry point.
        return ValidationResult { errors };
    }

    let mut states: Vec<_> = graph.iter_states().collect();
    states.sort_by(|a, b| a.id.cmp(&b.id));

    for state in &states {
        if let Some(next) = &state.next_state {
            if graph.state(next).is_none() {
                errors.push(ValidationError::DanglingStateRef {
                    from: state.id.clone(),
                    to: next.clone(),
                });
            }
        }

        let mut seen = HashSet::new();
        for option in &state.options {
            if !seen.insert(&option.id) {
                errors.push(ValidationError::DuplicateOptionId {
                    state: state.id.clone(),
                    option: option.id.clone(),
                });
            }
            if graph.state(&option.next_state).is_none() {
                errors.push(ValidationError::DanglingOptionRef {
                    state: state.id.clone(),
                    option: option.id.clone(),
                    to: option.next_state.clone(),
                });
            }
            // Backstory cannot itself open further backstory (depth cap 1).
            if option.triggers_backstory && state.kind.is_backstory() {
                errors.push(ValidationError::NestedBackstory {
                    state: state.id.clone(),
                    option: option.id.clone(),
                });
            }
        }
    }

    let backstory_targets = graph.backstory_targets();
    let main_reachable = main_path_reachable(graph);

    for state in &states {
        let reachable = main_reachable.contains(&state.id);
        if !reachable && !backstory_targets.contains(&state.id) {
            errors.push(ValidationError::UnreachableState(state.id.clone()));
        }
        if state.is_mandatory && !reachable {
            errors.push(ValidationError::UnreachableMandatory(state.id.clone()));
        }
    }

    ValidationResult { errors }
}

/// States reachable from the initial state along main-path edges (linear
/// advances plus non-backstory option targets).
fn main_path_reachable(graph: &DialogueGraph) -> HashSet<StateId> {
    let mut reachable = HashSet::new();
    let mut queue = VecDeque::new();

    reachable.insert(graph.initial.clone());
    queue.push_back(graph.initial.clone());

    while let Some(id) = queue.pop_front() {
        let Some(state) = graph.state(&id) else {
            continue;
        };

        let targets = state
            .next_state
            .iter()
            .chain(
                state
                    .options
                    .iter()
                    .filter(|o| !o.triggers_backstory)
                    .map(|o| &o.next_state),
            );

        for target in targets {
            if graph.state(target).is_some() && reachable.insert(target.clone()) {
                queue.push_back(target.clone());
            }
        }
    }

    reachable
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::states::{DialogueOption, DialogueState, StateKind};

    fn linear_graph() -> DialogueGraph {
        DialogueGraph::new("intro")
            .with_state(
                DialogueState::new("intro", StateKind::Intro, "Hello")
                    .with_option(DialogueOption::new("go", "Continue", "end")),
            )
            .with_state(DialogueState::new("end", StateKind::Conclusion, "Bye"))
    }

    #[test]
    fn test_valid_graph_passes() {
        assert!(validate_graph(&linear_graph()).is_valid());
    }

    #[test]
    fn test_missing_initial_state() {
        let graph = DialogueGraph::new("nowhere")
            .with_state(DialogueState::new("end", StateKind::Conclusion, "Bye"));

        let result = validate_graph(&graph);
        assert_eq!(
            result.errors,
            vec![ValidationError::MissingInitialState(StateId::new("nowhere"))]
        );
    }

    #[test]
    fn test_dangling_references() {
        let graph = DialogueGraph::new("intro").with_state(
            DialogueState::new("intro", StateKind::Intro, "Hello")
                .with_next("missing_linear")
                .with_option(DialogueOption::new("go", "Continue", "missing_target")),
        );

        let result = validate_graph(&graph);
        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::DanglingStateRef { .. }
        )));
        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::DanglingOptionRef { .. }
        )));
    }

    #[test]
    fn test_duplicate_option_ids() {
        let graph = DialogueGraph::new("intro")
            .with_state(
                DialogueState::new("intro", StateKind::Intro, "Hello")
                    .with_option(DialogueOption::new("go", "One way", "end"))
                    .with_option(DialogueOption::new("go", "Other way", "end")),
            )
            .with_state(DialogueState::new("end", StateKind::Conclusion, "Bye"));

        let result = validate_graph(&graph);
        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::DuplicateOptionId { .. }
        )));
    }

    #[test]
    fn test_orphan_state_flagged() {
        let graph = DialogueGraph::new("intro")
            .with_state(
                DialogueState::new("intro", StateKind::Intro, "Hello")
                    .with_option(DialogueOption::new("go", "Continue", "end")),
            )
            .with_state(DialogueState::new("end", StateKind::Conclusion, "Bye"))
            .with_state(DialogueState::new("island", StateKind::Question, "Unwired"));

        let result = validate_graph(&graph);
        assert_eq!(
            result.errors,
            vec![ValidationError::UnreachableState(StateId::new("island"))]
        );
    }

    #[test]
    fn test_backstory_target_exempt_from_orphan_check() {
        let graph = DialogueGraph::new("intro")
            .with_state(
                DialogueState::new("intro", StateKind::Intro, "Hello")
                    .with_option(DialogueOption::new("past", "Tell me more", "memory").backstory())
                    .with_option(DialogueOption::new("go", "Continue", "end")),
            )
            .with_state(DialogueState::new("memory", StateKind::Backstory, "Long ago..."))
            .with_state(DialogueState::new("end", StateKind::Conclusion, "Bye"));

        assert!(validate_graph(&graph).is_valid());
    }

    #[test]
    fn test_mandatory_behind_backstory_is_flagged() {
        // A mandatory state reachable only through a backstory digression is
        // not on the main path and cannot be guaranteed.
        let graph = DialogueGraph::new("intro")
            .with_state(
                DialogueState::new("intro", StateKind::Intro, "Hello")
                    .with_option(DialogueOption::new("past", "Tell me more", "memory").backstory())
                    .with_option(DialogueOption::new("go", "Continue", "end")),
            )
            .with_state(
                DialogueState::new("memory", StateKind::Backstory, "Long ago...").mandatory(),
            )
            .with_state(DialogueState::new("end", StateKind::Conclusion, "Bye"));

        let result = validate_graph(&graph);
        assert_eq!(
            result.errors,
            vec![ValidationError::UnreachableMandatory(StateId::new("memory"))]
        );
    }

    #[test]
    fn test_nested_backstory_flagged() {
        let graph = DialogueGraph::new("intro")
            .with_state(
                DialogueState::new("intro", StateKind::Intro, "Hello")
                    .with_option(DialogueOption::new("past", "Tell me more", "memory").backstory())
                    .with_option(DialogueOption::new("go", "Continue", "end")),
            )
            .with_state(
                DialogueState::new("memory", StateKind::Backstory, "Long ago...")
                    .with_option(DialogueOption::new("deeper", "And before that?", "memory2").backstory()),
            )
            .with_state(DialogueState::new("memory2", StateKind::Backstory, "Even longer ago..."))
            .with_state(DialogueState::new("end", StateKind::Conclusion, "Bye"));

        let result = validate_graph(&graph);
        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::NestedBackstory { .. }
        )));
    }

    #[test]
    fn test_cycle_is_allowed_by_validation() {
        // Cycles are legal topology; the runtime visit cap guards them.
        let graph = DialogueGraph::new("a")
            .with_state(
                DialogueState::new("a", StateKind::Question, "A")
                    .with_option(DialogueOption::new("to_b", "Go", "b")),
            )
            .with_state(
                DialogueState::new("b", StateKind::Question, "B")
                    .with_option(DialogueOption::new("back", "Return", "a"))
                    .with_option(DialogueOption::new("out", "Leave", "end")),
            )
            .with_state(DialogueState::new("end", StateKind::Conclusion, "Bye"));

        assert!(validate_graph(&graph).is_valid());
    }
}
