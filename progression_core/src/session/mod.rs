//! Dialogue state machine - walks a validated graph, holds per-session
//! context, detects blocked progression, and performs self-repair.
//!
//! A session moves in two beats: `select_option` validates and applies a
//! choice (deltas, checkpoints, backstory bookkeeping) without leaving the
//! current state, then `advance` performs the pending transition. Backstory
//! digressions are a one-level interrupt/return stack: the return jump
//! resumes the triggering state rather than re-entering it, so it does not
//! consume a visit.
//!
//! Every error is reported on the bus as an `EngineFault` before it is
//! returned, and every forced repair is announced - repair is an escape
//! hatch, never silent.

use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use dialogue_graph::{
    CheckpointId, DialogueContext, DialogueGraph, DialogueState, OptionId, SessionId, StateId,
};

use crate::economy::{ResourceId, ResourceLedger};
use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};

/// Component identifier used when dispatching session events.
const SOURCE: &str = "state-machine";

/// The outcome of a successful transition operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// The current state after the operation.
    pub state: StateId,

    /// Response text to show before advancing, when an option carries one.
    pub response: Option<String>,

    /// Whether the session has reached a terminal conclusion.
    pub terminal: bool,
}

/// Why a session cannot reach a conclusion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// The current state has no valid transition and is not a conclusion.
    DeadEnd { state: StateId },

    /// A mandatory state can no longer be reached from here.
    UnreachableMandatory { state: StateId },
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::DeadEnd { state } => {
                write!(f, "state `{}` has no valid transition", state)
            }
            BlockReason::UnreachableMandatory { state } => {
                write!(f, "mandatory state `{}` is no longer reachable", state)
            }
        }
    }
}

/// Result of a blocked-progression check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressionStatus {
    pub blocked: bool,
    pub reason: Option<BlockReason>,
}

impl ProgressionStatus {
    fn clear() -> Self {
        Self {
            blocked: false,
            reason: None,
        }
    }

    fn blocked(reason: BlockReason) -> Self {
        Self {
            blocked: true,
            reason: Some(reason),
        }
    }
}

/// An option as presented to a rendering surface.
#[derive(Debug, Clone, Serialize)]
pub struct ViewOption {
    pub id: OptionId,
    pub text: String,
}

/// Read-only projection of the current state for rendering surfaces. UI
/// translates gestures into `select_option`/`advance` calls and never mutates
/// context directly.
#[derive(Debug, Clone, Serialize)]
pub struct ViewState {
    pub id: StateId,
    pub text: String,
    pub options: Vec<ViewOption>,
    pub is_conclusion: bool,
    pub is_critical_path: bool,
}

/// An open backstory digression: the state it shows and the state that
/// triggered it. The return only applies while the session is still inside
/// the digression; leaving it through a normal edge abandons the frame.
#[derive(Debug, Clone)]
struct BackstoryFrame {
    digression: StateId,
    origin: StateId,
}

/// A single dialogue session walking a validated graph.
pub struct DialogueSession {
    graph: Rc<DialogueGraph>,
    context: DialogueContext,
    current: StateId,
    /// Target of the most recent option selection, consumed by `advance`.
    pending_target: Option<StateId>,
    /// The open backstory digression, if any. Depth is capped at one.
    backstory: Option<BackstoryFrame>,
    terminal: bool,
    bus: EventBus,
}

impl DialogueSession {
    /// Start a session at the graph's initial state.
    pub fn start(
        graph: Rc<DialogueGraph>,
        mut context: DialogueContext,
        bus: EventBus,
    ) -> Result<Self, EngineError> {
        let Some(initial) = graph.initial_state() else {
            let err = EngineError::MissingState(graph.initial.clone());
            bus.report_fault(&err, SOURCE);
            return Err(err);
        };

        for checkpoint in graph.checkpoints() {
            context.register_checkpoint(checkpoint);
        }

        context.record_visit(&initial.id);
        if initial.is_critical_path {
            context.mark_checkpoint(CheckpointId::state(&initial.id));
        }

        let current = initial.id.clone();
        let terminal = initial.is_terminal_conclusion();

        Ok(Self {
            graph,
            context,
            current,
            pending_target: None,
            backstory: None,
            terminal,
            bus,
        })
    }

    pub fn session_id(&self) -> SessionId {
        self.context.session
    }

    pub fn current_state(&self) -> &StateId {
        &self.current
    }

    pub fn context(&self) -> &DialogueContext {
        &self.context
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Select an option on the current state.
    ///
    /// Applies the option's deltas to the session context, delegates bounded
    /// resource updates to the economy, marks any critical-path checkpoint it
    /// carries, and records a pending transition for the next `advance`.
    pub fn select_option(
        &mut self,
        option_id: &OptionId,
        economy: &mut ResourceLedger,
    ) -> Result<TransitionResult, EngineError> {
        if self.terminal {
            return Err(self.fail(EngineError::SessionTerminal));
        }

        let Some(state) = self.graph.state(&self.current) else {
            return Err(self.fail(EngineError::MissingState(self.current.clone())));
        };

        let Some(option) = state.option(option_id) else {
            return Err(self.fail(EngineError::InvalidOption {
                state: self.current.clone(),
                option: option_id.clone(),
            }));
        };

        if !option.is_available(&self.context) {
            return Err(self.fail(EngineError::InvalidOption {
                state: self.current.clone(),
                option: option_id.clone(),
            }));
        }

        if option.triggers_backstory && self.backstory.is_some() {
            return Err(self.fail(EngineError::BackstoryNesting {
                state: self.current.clone(),
            }));
        }

        let option = option.clone();

        if option.insight_gain != 0 {
            economy.add(&ResourceId::insight(), option.insight_gain)?;
        }
        // Negative relationship marks the choice non-optimal and breaks the
        // momentum streak; positive extends it.
        if option.relationship_change < 0 {
            economy.reset_momentum()?;
        } else if option.relationship_change > 0 {
            economy.add(&ResourceId::momentum(), 1)?;
        }
        self.context.add_score(option.relationship_change);

        if let Some(gain) = &option.knowledge_gain {
            self.context.add_knowledge(&gain.concept, gain.amount);
            self.bus.dispatch(
                EngineEvent::KnowledgeGained {
                    session: self.context.session,
                    concept: gain.concept.clone(),
                    domain: gain.domain.clone(),
                    amount: gain.amount,
                },
                SOURCE,
            )?;
        }

        self.context.record_option(&option.id);
        if option.is_critical_path {
            self.context
                .mark_checkpoint(CheckpointId::option(&option.id));
        }

        if option.triggers_backstory {
            self.backstory = Some(BackstoryFrame {
                digression: option.next_state.clone(),
                origin: self.current.clone(),
            });
        } else if self
            .backstory
            .as_ref()
            .is_some_and(|f| f.origin == self.current)
        {
            // Re-selecting at the origin before entering the digression
            // replaces the intent; the never-entered frame is dropped.
            self.backstory = None;
        }
        self.pending_target = Some(option.next_state.clone());

        self.bus.dispatch(
            EngineEvent::OptionSelected {
                session: self.context.session,
                state: self.current.clone(),
                option: option.id.clone(),
                critical_path: option.is_critical_path,
            },
            SOURCE,
        )?;

        Ok(TransitionResult {
            state: self.current.clone(),
            response: option.response_text.clone(),
            terminal: false,
        })
    }

    /// Move to the resolved next state.
    ///
    /// Resolution order: the pending option target, then the current state's
    /// linear `next_state`, then a pending backstory return. Entering a state
    /// past its visit cap raises `LoopDetected` instead of transitioning.
    pub fn advance(&mut self) -> Result<TransitionResult, EngineError> {
        if self.terminal {
            return Err(self.fail(EngineError::SessionTerminal));
        }

        if let Some(target) = self.pending_target.take() {
            return self.enter(target);
        }

        let linear = self
            .graph
            .state(&self.current)
            .and_then(|s| s.next_state.clone());
        if let Some(next) = linear {
            return self.enter(next);
        }

        if let Some(frame) = self.backstory.take() {
            // The return only fires from inside the digression itself.
            if frame.digression == self.current {
                return self.resume(frame.origin);
            }
        }

        Err(self.fail(EngineError::NoTransition(self.current.clone())))
    }

    /// Check whether the session can still reach a conclusion.
    ///
    /// This is a runtime safety net for authoring defects (a shipped variant
    /// with unwired branches), not a normal-path behavior.
    pub fn progression_status(&self) -> ProgressionStatus {
        if self.terminal || self.pending_target.is_some() {
            return ProgressionStatus::clear();
        }
        // A live return is a guaranteed transition; a frame left behind by
        // leaving the digression is not.
        if self
            .backstory
            .as_ref()
            .is_some_and(|f| f.digression == self.current)
        {
            return ProgressionStatus::clear();
        }

        let Some(state) = self.graph.state(&self.current) else {
            return ProgressionStatus::blocked(BlockReason::DeadEnd {
                state: self.current.clone(),
            });
        };

        let has_linear = state
            .next_state
            .as_ref()
            .map(|next| self.enterable(next))
            .unwrap_or(false);
        let has_option = state
            .options
            .iter()
            .any(|o| o.is_available(&self.context) && self.enterable(&o.next_state));

        if !has_linear && !has_option && !state.kind.is_conclusion() {
            return ProgressionStatus::blocked(BlockReason::DeadEnd {
                state: self.current.clone(),
            });
        }

        let reachable = self.reachable_from_current();
        for mandatory in self.graph.mandatory_states() {
            if !self.context.has_visited(mandatory) && !reachable.contains(mandatory) {
                return ProgressionStatus::blocked(BlockReason::UnreachableMandatory {
                    state: mandatory.clone(),
                });
            }
        }

        ProgressionStatus::clear()
    }

    /// Jump directly to the nearest critical-path state, bypassing normal
    /// option-driven transitions.
    ///
    /// The escape hatch for blocked sessions: gameplay must never truly
    /// deadlock even under content defects. The jump is announced as
    /// `ProgressionBlocked` followed by the synthetic `ProgressionRepaired`.
    pub fn force_progression_repair(&mut self) -> Result<TransitionResult, EngineError> {
        if self.terminal {
            return Err(self.fail(EngineError::SessionTerminal));
        }

        let reason = self
            .progression_status()
            .reason
            .map(|r| r.to_string())
            .unwrap_or_else(|| "repair requested by caller".to_string());

        self.bus.dispatch(
            EngineEvent::ProgressionBlocked {
                session: self.context.session,
                state: self.current.clone(),
                reason: reason.clone(),
            },
            SOURCE,
        )?;

        let Some(target) = self.repair_target() else {
            return Err(self.fail(EngineError::NoTransition(self.current.clone())));
        };

        tracing::warn!(
            session = %self.context.session,
            from = %self.current,
            to = %target,
            reason = %reason,
            "forced progression repair"
        );

        let state = self
            .graph
            .state(&target)
            .cloned()
            .ok_or_else(|| self.fail(EngineError::MissingState(target.clone())))?;

        self.pending_target = None;
        self.backstory = None;
        self.context.record_visit(&target);
        if state.is_critical_path {
            self.context.mark_checkpoint(CheckpointId::state(&target));
        }

        let from = std::mem::replace(&mut self.current, target.clone());
        self.terminal = state.is_terminal_conclusion();

        self.bus.dispatch(
            EngineEvent::ProgressionRepaired {
                session: self.context.session,
                from,
                to: target.clone(),
            },
            SOURCE,
        )?;

        Ok(TransitionResult {
            state: target,
            response: None,
            terminal: self.terminal,
        })
    }

    /// Read-only projection of the current state for rendering.
    pub fn view(&self) -> Result<ViewState, EngineError> {
        let state = self
            .graph
            .state(&self.current)
            .ok_or_else(|| EngineError::MissingState(self.current.clone()))?;

        Ok(ViewState {
            id: state.id.clone(),
            text: state.text.clone(),
            options: state
                .options
                .iter()
                .filter(|o| o.is_available(&self.context))
                .map(|o| ViewOption {
                    id: o.id.clone(),
                    text: o.text.clone(),
                })
                .collect(),
            is_conclusion: state.kind.is_conclusion(),
            is_critical_path: state.is_critical_path,
        })
    }

    /// Finalize a terminal session, consuming it and yielding the context
    /// for scoring and reward evaluation.
    pub fn finalize(self) -> Result<DialogueContext, EngineError> {
        if !self.terminal {
            return Err(self.fail(EngineError::SessionNotTerminal));
        }

        self.bus.dispatch(
            EngineEvent::SessionCompleted {
                session: self.context.session,
                score: self.context.player_score,
            },
            SOURCE,
        )?;

        Ok(self.context)
    }

    fn enter(&mut self, target: StateId) -> Result<TransitionResult, EngineError> {
        let Some(state) = self.graph.state(&target).cloned() else {
            return Err(self.fail(EngineError::MissingState(target)));
        };

        let visits = self.context.visit_count(&target) + 1;
        let cap = state.visit_cap();
        if visits > cap {
            return Err(self.fail(EngineError::LoopDetected {
                state: target,
                visits,
                cap,
            }));
        }

        // Moving out of a digression through one of its own edges abandons
        // the pending return.
        if self
            .backstory
            .as_ref()
            .is_some_and(|f| f.digression == self.current)
        {
            self.backstory = None;
        }

        self.context.record_visit(&target);
        if state.is_critical_path {
            self.context.mark_checkpoint(CheckpointId::state(&target));
        }

        let from = std::mem::replace(&mut self.current, target.clone());
        self.terminal = state.is_terminal_conclusion();

        self.bus.dispatch(
            EngineEvent::StateChanged {
                session: self.context.session,
                from,
                to: target.clone(),
            },
            SOURCE,
        )?;

        Ok(TransitionResult {
            state: target,
            response: None,
            terminal: self.terminal,
        })
    }

    /// Return from a backstory digression. Resuming the origin is not a
    /// fresh entry, so it does not consume a visit.
    fn resume(&mut self, origin: StateId) -> Result<TransitionResult, EngineError> {
        let from = std::mem::replace(&mut self.current, origin.clone());

        self.bus.dispatch(
            EngineEvent::StateChanged {
                session: self.context.session,
                from,
                to: origin.clone(),
            },
            SOURCE,
        )?;

        Ok(TransitionResult {
            state: origin,
            response: None,
            terminal: false,
        })
    }

    /// Whether a state can still be entered given its visit cap.
    fn enterable(&self, id: &StateId) -> bool {
        self.graph
            .state(id)
            .map(|s| self.context.visit_count(id) < s.visit_cap())
            .unwrap_or(false)
    }

    /// States reachable from the current state over the remaining topology,
    /// skipping states whose visit cap is already exhausted.
    fn reachable_from_current(&self) -> HashSet<StateId> {
        let mut reachable = HashSet::new();
        let mut queue = VecDeque::new();
        reachable.insert(self.current.clone());
        queue.push_back(self.current.clone());

        while let Some(id) = queue.pop_front() {
            let Some(state) = self.graph.state(&id) else {
                continue;
            };
            for target in self.graph.edges_from(state) {
                if self.enterable(target) && reachable.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
            }
        }

        reachable
    }

    /// Pick the repair jump target: the nearest critical-path state by edge
    /// distance (unsatisfied checkpoints first), falling back to any
    /// critical-path state, then to a conclusion state.
    fn repair_target(&self) -> Option<StateId> {
        let distances = self.distances_from_current();

        let mut candidates: Vec<(&DialogueState, usize)> = self
            .graph
            .iter_states()
            .filter(|s| s.is_critical_path && s.id != self.current)
            .filter_map(|s| distances.get(&s.id).map(|d| (s, *d)))
            .collect();
        candidates.sort_by(|(a, da), (b, db)| {
            let a_done = self.context.checkpoint_satisfied(&CheckpointId::state(&a.id));
            let b_done = self.context.checkpoint_satisfied(&CheckpointId::state(&b.id));
            a_done
                .cmp(&b_done)
                .then(da.cmp(db))
                .then(a.id.cmp(&b.id))
        });
        if let Some((state, _)) = candidates.first() {
            return Some(state.id.clone());
        }

        // No critical state reachable: any critical state, unvisited first.
        let mut all_critical: Vec<&DialogueState> = self
            .graph
            .iter_states()
            .filter(|s| s.is_critical_path && s.id != self.current)
            .collect();
        all_critical.sort_by(|a, b| {
            self.context
                .has_visited(&a.id)
                .cmp(&self.context.has_visited(&b.id))
                .then(a.id.cmp(&b.id))
        });
        if let Some(state) = all_critical.first() {
            return Some(state.id.clone());
        }

        // Last resort: a conclusion state so the session can end.
        let mut conclusions: Vec<&DialogueState> = self
            .graph
            .iter_states()
            .filter(|s| s.kind.is_conclusion() && s.id != self.current)
            .collect();
        conclusions.sort_by(|a, b| {
            let da = distances.get(&a.id).copied().unwrap_or(usize::MAX);
            let db = distances.get(&b.id).copied().unwrap_or(usize::MAX);
            da.cmp(&db).then(a.id.cmp(&b.id))
        });
        conclusions.first().map(|s| s.id.clone())
    }

    /// Edge distances from the current state, ignoring visit caps (a repair
    /// jump bypasses normal transition rules).
    fn distances_from_current(&self) -> HashMap<StateId, usize> {
        let mut distances = HashMap::new();
        let mut queue = VecDeque::new();
        distances.insert(self.current.clone(), 0);
        queue.push_back(self.current.clone());

        while let Some(id) = queue.pop_front() {
            let depth = distances[&id];
            let Some(state) = self.graph.state(&id) else {
                continue;
            };
            for target in self.graph.edges_from(state) {
                if self.graph.state(target).is_some() && !distances.contains_key(target) {
                    distances.insert(target.clone(), depth + 1);
                    queue.push_back(target.clone());
                }
            }
        }

        distances
    }

    fn fail(&self, err: EngineError) -> EngineError {
        self.bus.report_fault(&err, SOURCE);
        err
    }
}
