//! Session context - the mutable per-session record of a dialogue walk.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;

use crate::states::{CharacterId, CheckpointId, ConceptId, OptionId, StateId};

/// Unique identifier for a dialogue session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    /// Create a new random session ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn nil() -> Self {
        Self(Uuid::nil())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The mutable state accumulated while walking a dialogue graph.
///
/// Created when a session starts and discarded when it ends. Mutation happens
/// only through the state machine's transition operations; rendering surfaces
/// see a read-only projection. `visited` only ever grows within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueContext {
    pub character: CharacterId,
    pub session: SessionId,

    /// Every state entered this session.
    pub visited: HashSet<StateId>,

    /// Per-state entry counts, for loop detection.
    pub visit_counts: HashMap<StateId, u32>,

    /// Options selected, in order.
    pub selected_options: Vec<OptionId>,

    /// Accumulated relationship score.
    pub player_score: i64,

    /// Knowledge accumulated per concept.
    pub knowledge_gained: HashMap<ConceptId, u32>,

    /// Critical-path checkpoints and whether each has been satisfied.
    pub critical_path_progress: HashMap<CheckpointId, bool>,
}

impl DialogueContext {
    /// Create a fresh context for a character with a new session ID.
    pub fn new(character: CharacterId) -> Self {
        Self {
            character,
            session: SessionId::new(),
            visited: HashSet::new(),
            visit_counts: HashMap::new(),
            selected_options: Vec::new(),
            player_score: 0,
            knowledge_gained: HashMap::new(),
            critical_path_progress: HashMap::new(),
        }
    }

    /// Record entry into a state, returning the new visit count.
    pub fn record_visit(&mut self, state: &StateId) -> u32 {
        self.visited.insert(state.clone());
        let count = self.visit_counts.entry(state.clone()).or_insert(0);
        *count += 1;
        *count
    }

    /// How many times a state has been entered this session.
    pub fn visit_count(&self, state: &StateId) -> u32 {
        self.visit_counts.get(state).copied().unwrap_or(0)
    }

    /// Whether a state has been entered this session.
    pub fn has_visited(&self, state: &StateId) -> bool {
        self.visited.contains(state)
    }

    /// Record a selected option.
    pub fn record_option(&mut self, option: &OptionId) {
        self.selected_options.push(option.clone());
    }

    /// Whether an option has been selected this session.
    pub fn has_selected(&self, option: &OptionId) -> bool {
        self.selected_options.contains(option)
    }

    /// Apply a relationship delta to the session score.
    pub fn add_score(&mut self, delta: i64) {
        self.player_score += delta;
    }

    /// Accumulate knowledge for a concept.
    pub fn add_knowledge(&mut self, concept: &ConceptId, amount: u32) {
        *self.knowledge_gained.entry(concept.clone()).or_insert(0) += amount;
    }

    /// Knowledge accumulated for a concept.
    pub fn knowledge_of(&self, concept: &ConceptId) -> u32 {
        self.knowledge_gained.get(concept).copied().unwrap_or(0)
    }

    /// Total knowledge accumulated across all concepts.
    pub fn total_knowledge(&self) -> u32 {
        self.knowledge_gained.values().sum()
    }

    /// Register a checkpoint as pending (unsatisfied). Existing entries keep
    /// their value.
    pub fn register_checkpoint(&mut self, checkpoint: CheckpointId) {
        self.critical_path_progress.entry(checkpoint).or_insert(false);
    }

    /// Mark a checkpoint as satisfied. Satisfied checkpoints never revert.
    pub fn mark_checkpoint(&mut self, checkpoint: CheckpointId) {
        self.critical_path_progress.insert(checkpoint, true);
    }

    /// Whether a checkpoint has been satisfied.
    pub fn checkpoint_satisfied(&self, checkpoint: &CheckpointId) -> bool {
        self.critical_path_progress
            .get(checkpoint)
            .copied()
            .unwrap_or(false)
    }

    /// Whether every registered checkpoint has been satisfied.
    pub fn critical_path_complete(&self) -> bool {
        self.critical_path_progress.values().all(|done| *done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> DialogueContext {
        DialogueContext::new(CharacterId::new("archivist"))
    }

    #[test]
    fn test_visit_recording() {
        let mut ctx = context();
        let state = StateId::new("intro");

        assert_eq!(ctx.visit_count(&state), 0);
        assert!(!ctx.has_visited(&state));

        assert_eq!(ctx.record_visit(&state), 1);
        assert_eq!(ctx.record_visit(&state), 2);
        assert!(ctx.has_visited(&state));
    }

    #[test]
    fn test_score_and_knowledge() {
        let mut ctx = context();
        ctx.add_score(2);
        ctx.add_score(-1);
        assert_eq!(ctx.player_score, 1);

        let concept = ConceptId::new("borrowing");
        ctx.add_knowledge(&concept, 1);
        ctx.add_knowledge(&concept, 2);
        assert_eq!(ctx.knowledge_of(&concept), 3);
        assert_eq!(ctx.total_knowledge(), 3);
    }

    #[test]
    fn test_checkpoint_progress() {
        let mut ctx = context();
        let gift = CheckpointId::state(&StateId::new("gift"));
        let insight = CheckpointId::option(&OptionId::new("ask_deeper"));

        ctx.register_checkpoint(gift.clone());
        ctx.register_checkpoint(insight.clone());
        assert!(!ctx.critical_path_complete());

        ctx.mark_checkpoint(gift.clone());
        assert!(ctx.checkpoint_satisfied(&gift));
        assert!(!ctx.critical_path_complete());

        ctx.mark_checkpoint(insight);
        assert!(ctx.critical_path_complete());

        // Re-registering a satisfied checkpoint must not reset it.
        ctx.register_checkpoint(gift.clone());
        assert!(ctx.checkpoint_satisfied(&gift));
    }

    #[test]
    fn test_empty_critical_path_is_complete() {
        let ctx = context();
        assert!(ctx.critical_path_complete());
    }
}
