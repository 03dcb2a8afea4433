//! Dialogue option definitions and the conditions that gate them.

use serde::{Deserialize, Serialize};

use super::{ConceptId, DomainId, OptionId, StateId};
use crate::context::DialogueContext;

/// Knowledge granted when an option is selected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeGain {
    pub concept: ConceptId,
    pub domain: DomainId,
    pub amount: u32,
}

impl KnowledgeGain {
    pub fn new(concept: impl Into<String>, domain: impl Into<String>, amount: u32) -> Self {
        Self {
            concept: ConceptId::new(concept),
            domain: DomainId::new(domain),
            amount,
        }
    }
}

/// A player-selectable option on a dialogue state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogueOption {
    pub id: OptionId,

    /// The text shown to the player.
    pub text: String,

    /// The state this option leads to.
    pub next_state: StateId,

    /// Optional character response shown before advancing.
    #[serde(default)]
    pub response_text: Option<String>,

    /// Insight granted on selection (delegated to the resource economy).
    #[serde(default)]
    pub insight_gain: i64,

    /// Relationship delta applied to the session score. Negative values mark
    /// the option as non-optimal and break the momentum streak.
    #[serde(default)]
    pub relationship_change: i64,

    /// Knowledge granted on selection.
    #[serde(default)]
    pub knowledge_gain: Option<KnowledgeGain>,

    /// Whether selecting this option opens a backstory digression. The target
    /// state returns control to the state that triggered it.
    #[serde(default)]
    pub triggers_backstory: bool,

    /// Marks a critical-path checkpoint satisfied by selecting this option.
    #[serde(default)]
    pub is_critical_path: bool,

    /// Predicate over the session context gating availability.
    #[serde(default)]
    pub condition: Option<OptionCondition>,
}

impl DialogueOption {
    /// Create a new option with the given id, text, and target state.
    pub fn new(id: impl Into<String>, text: impl Into<String>, next_state: impl Into<String>) -> Self {
        Self {
            id: OptionId::new(id),
            text: text.into(),
            next_state: StateId::new(next_state),
            response_text: None,
            insight_gain: 0,
            relationship_change: 0,
            knowledge_gain: None,
            triggers_backstory: false,
            is_critical_path: false,
            condition: None,
        }
    }

    /// Set the response text.
    pub fn with_response(mut self, response: impl Into<String>) -> Self {
        self.response_text = Some(response.into());
        self
    }

    /// Set the insight gain.
    pub fn with_insight(mut self, gain: i64) -> Self {
        self.insight_gain = gain;
        self
    }

    /// Set the relationship delta.
    pub fn with_relationship(mut self, delta: i64) -> Self {
        self.relationship_change = delta;
        self
    }

    /// Set the knowledge gain.
    pub fn with_knowledge(mut self, gain: KnowledgeGain) -> Self {
        self.knowledge_gain = Some(gain);
        self
    }

    /// Mark this option as a backstory trigger.
    pub fn backstory(mut self) -> Self {
        self.triggers_backstory = true;
        self
    }

    /// Mark this option as a critical-path checkpoint.
    pub fn critical_path(mut self) -> Self {
        self.is_critical_path = true;
        self
    }

    /// Gate this option behind a condition.
    pub fn with_condition(mut self, condition: OptionCondition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Whether this option is available given the session context.
    pub fn is_available(&self, context: &DialogueContext) -> bool {
        self.condition
            .as_ref()
            .map(|c| c.evaluate(context))
            .unwrap_or(true)
    }
}

/// Conditions gating option availability.
///
/// A closed enumeration so authored documents stay checkable and the engine
/// can evaluate them without dynamic dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OptionCondition {
    /// Always available.
    Always,
    /// Requires an accumulated relationship score of at least the given value.
    MinScore(i64),
    /// Requires at least `amount` of the given concept's knowledge.
    KnowledgeAtLeast { concept: ConceptId, amount: u32 },
    /// Requires a state to have been visited this session.
    Visited(StateId),
    /// Requires an option to have been selected this session.
    Selected(OptionId),
    /// Negation.
    Not(Box<OptionCondition>),
    /// All sub-conditions must hold.
    All(Vec<OptionCondition>),
    /// At least one sub-condition must hold.
    Any(Vec<OptionCondition>),
}

impl OptionCondition {
    /// Evaluate this condition against a session context.
    pub fn evaluate(&self, context: &DialogueContext) -> bool {
        match self {
            OptionCondition::Always => true,
            OptionCondition::MinScore(min) => context.player_score >= *min,
            OptionCondition::KnowledgeAtLeast { concept, amount } => {
                context.knowledge_of(concept) >= *amount
            }
            OptionCondition::Visited(state) => context.has_visited(state),
            OptionCondition::Selected(option) => context.has_selected(option),
            OptionCondition::Not(inner) => !inner.evaluate(context),
            OptionCondition::All(conditions) => conditions.iter().all(|c| c.evaluate(context)),
            OptionCondition::Any(conditions) => conditions.iter().any(|c| c.evaluate(context)),
        }
    }
}
