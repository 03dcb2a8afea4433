//! The progression engine facade - one object wiring the dialogue graph,
//! session state machine, resource economy, and reward guard onto a shared
//! event bus.
//!
//! Hosts construct an engine per player save, subscribe their persistence and
//! rendering handlers on [`ProgressionEngine::bus`], and drive it through
//! `start_session` / `select_option` / `advance` / `finalize_session`.

use std::rc::Rc;

use serde::{Deserialize, Serialize};

use dialogue_graph::{CharacterId, DialogueContext, DialogueGraph, OptionId, SessionId};

use crate::economy::{Resource, ResourceId, ResourceLedger};
use crate::error::EngineError;
use crate::events::EventBus;
use crate::rewards::{GrantOutcome, ProgressionGuard, RewardId, RewardStore, RewardTier, SaveId};
use crate::session::{DialogueSession, ProgressionStatus, TransitionResult, ViewState};

/// Component identifier used when dispatching engine-level events.
const SOURCE: &str = "engine";

/// Bounds for the default insight resource.
const INSIGHT_MIN: i64 = 0;
const INSIGHT_MAX: i64 = 100;

/// Insight level at which strategic actions unlock.
const INSIGHT_THRESHOLD: i64 = 50;

/// Bounds for the default momentum streak counter.
const MOMENTUM_MIN: i64 = 0;
const MOMENTUM_MAX: i64 = 5;

/// Thresholds mapping a finalized session to a reward tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Minimum relationship score for the technical tier.
    pub technical_score: i64,

    /// Minimum relationship score for the annotated tier.
    pub annotated_score: i64,

    /// Minimum total knowledge for the annotated tier.
    pub annotated_knowledge: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            technical_score: 3,
            annotated_score: 6,
            annotated_knowledge: 4,
        }
    }
}

impl ScoringConfig {
    /// The tier a finalized session earns.
    pub fn tier(&self, context: &DialogueContext) -> RewardTier {
        if context.player_score >= self.annotated_score
            && context.total_knowledge() >= self.annotated_knowledge
        {
            RewardTier::Annotated
        } else if context.player_score >= self.technical_score {
            RewardTier::Technical
        } else {
            RewardTier::Base
        }
    }
}

/// What a finalized session produced.
#[derive(Debug)]
pub struct SessionOutcome {
    /// The full session context, for hosts that persist transcripts.
    pub context: DialogueContext,

    /// The tier the session earned.
    pub tier: RewardTier,

    /// The reward grant outcome, when the critical path was completed.
    pub grant: Option<GrantOutcome>,
}

/// The top-level progression engine for a single player save.
pub struct ProgressionEngine<S: RewardStore> {
    bus: EventBus,
    graph: Rc<DialogueGraph>,
    economy: ResourceLedger,
    guard: ProgressionGuard<S>,
    scoring: ScoringConfig,
    reward: RewardId,
    session: Option<DialogueSession>,
}

impl<S: RewardStore> ProgressionEngine<S> {
    /// Create an engine for a save over a validated graph.
    ///
    /// Registers the default insight and momentum resources and the insight
    /// unlock threshold.
    pub fn new(graph: DialogueGraph, save: SaveId, store: S) -> Result<Self, EngineError> {
        let bus = EventBus::new();

        let mut economy = ResourceLedger::new(bus.clone());
        economy.register(Resource::new(
            ResourceId::insight(),
            INSIGHT_MIN,
            INSIGHT_MAX,
            INSIGHT_MIN,
        ));
        economy.register(Resource::new(
            ResourceId::momentum(),
            MOMENTUM_MIN,
            MOMENTUM_MAX,
            MOMENTUM_MIN,
        ));
        economy.watch_threshold(&ResourceId::insight(), INSIGHT_THRESHOLD)?;

        let guard = ProgressionGuard::new(save, store, bus.clone());

        Ok(Self {
            bus,
            graph: Rc::new(graph),
            economy,
            guard,
            scoring: ScoringConfig::default(),
            reward: RewardId::new("companion-journal"),
            session: None,
        })
    }

    /// Override the scoring thresholds.
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }

    /// Override the critical reward delivered on completion.
    pub fn with_reward(mut self, reward: RewardId) -> Self {
        self.reward = reward;
        self
    }

    /// The shared event bus. Hosts subscribe their handlers here.
    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn economy(&self) -> &ResourceLedger {
        &self.economy
    }

    pub fn economy_mut(&mut self) -> &mut ResourceLedger {
        &mut self.economy
    }

    pub fn guard(&self) -> &ProgressionGuard<S> {
        &self.guard
    }

    pub fn session(&self) -> Option<&DialogueSession> {
        self.session.as_ref()
    }

    /// Start a dialogue session for a character.
    ///
    /// An already-active session is abandoned first, which runs the reward
    /// safety net before the old context is dropped.
    pub fn start_session(&mut self, character: CharacterId) -> Result<SessionId, EngineError> {
        if self.session.is_some() {
            self.abandon_session()?;
        }

        let context = DialogueContext::new(character);
        let session = DialogueSession::start(Rc::clone(&self.graph), context, self.bus.clone())?;
        let id = session.session_id();

        tracing::info!(session = %id, initial = %session.current_state(), "dialogue session started");
        self.session = Some(session);
        Ok(id)
    }

    /// Select an option on the active session's current state.
    pub fn select_option(&mut self, option: &OptionId) -> Result<TransitionResult, EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(self.no_session());
        };
        session.select_option(option, &mut self.economy)
    }

    /// Advance the active session to its next state.
    ///
    /// A loop-guard trip or a dead end does not surface to the caller:
    /// gameplay must keep moving, so both fall back to a forced progression
    /// repair. The original fault is still visible on the bus as an
    /// `EngineFault` event.
    pub fn advance(&mut self) -> Result<TransitionResult, EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(self.no_session());
        };

        match session.advance() {
            Ok(result) => Ok(result),
            Err(EngineError::LoopDetected { .. }) | Err(EngineError::NoTransition(_)) => {
                session.force_progression_repair()
            }
            Err(err) => Err(err),
        }
    }

    /// Whether the active session can still reach a conclusion.
    pub fn progression_status(&self) -> Result<ProgressionStatus, EngineError> {
        self.session
            .as_ref()
            .map(|s| s.progression_status())
            .ok_or_else(|| self.no_session())
    }

    /// Force the active session to the nearest critical-path state.
    pub fn force_progression_repair(&mut self) -> Result<TransitionResult, EngineError> {
        let Some(session) = self.session.as_mut() else {
            return Err(self.no_session());
        };
        session.force_progression_repair()
    }

    /// Read-only projection of the active session's current state.
    pub fn view(&self) -> Result<ViewState, EngineError> {
        self.session
            .as_ref()
            .ok_or_else(|| self.no_session())
            .and_then(|s| s.view())
    }

    /// Finalize a terminal session: score it and, when the critical path was
    /// completed, grant the critical reward at the earned tier.
    pub fn finalize_session(&mut self) -> Result<SessionOutcome, EngineError> {
        let Some(session) = self.session.as_ref() else {
            return Err(self.no_session());
        };
        if !session.is_terminal() {
            let err = EngineError::SessionNotTerminal;
            self.bus.report_fault(&err, SOURCE);
            return Err(err);
        }

        // is_terminal was checked above, so finalize cannot fail here.
        let session = self.session.take().ok_or(EngineError::NoSession)?;
        let context = session.finalize()?;

        let tier = self.scoring.tier(&context);
        // A graph with no critical path gates no reward; completion alone is
        // not a grant.
        let grant = if context.critical_path_complete() && !self.graph.checkpoints().is_empty() {
            let reward = self.reward.clone();
            Some(self.guard.grant(&reward, tier)?)
        } else {
            None
        };

        Ok(SessionOutcome {
            context,
            tier,
            grant,
        })
    }

    /// Drop the active session without finalizing it.
    ///
    /// Safety net: a session torn down after completing the critical path
    /// (a crash-and-reload, a host shutdown) still gets its reward, at the
    /// base tier. The grant is idempotent, so a finalize that already ran
    /// makes this a no-op.
    pub fn abandon_session(&mut self) -> Result<Option<GrantOutcome>, EngineError> {
        let Some(session) = self.session.take() else {
            return Ok(None);
        };

        tracing::info!(session = %session.session_id(), "dialogue session abandoned");

        if session.context().critical_path_complete() && !self.graph.checkpoints().is_empty() {
            let reward = self.reward.clone();
            return Ok(Some(self.guard.grant(&reward, RewardTier::Base)?));
        }
        Ok(None)
    }

    /// Grant a reward directly, bypassing session scoring. Exposed for host
    /// fallback paths; the guard's idempotence still applies.
    pub fn grant_reward(
        &mut self,
        reward: &RewardId,
        tier: RewardTier,
    ) -> Result<GrantOutcome, EngineError> {
        self.guard.grant(reward, tier)
    }

    fn no_session(&self) -> EngineError {
        let err = EngineError::NoSession;
        self.bus.report_fault(&err, SOURCE);
        err
    }
}
