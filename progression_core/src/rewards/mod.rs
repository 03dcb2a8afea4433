//! Progression guard - idempotent critical-reward delivery.
//!
//! The same grant intent can arrive from several independent call sites:
//! normal completion, a supervising router's fallback, a teardown safety net,
//! and delayed retries. All of them funnel through [`ProgressionGuard::grant`],
//! which guarantees exactly one granted record per `(save, reward)` pair,
//! upgrades the stored tier when a later call brings a higher one, and emits
//! exactly one `RewardGranted` event per first grant or upgrade.

mod retry;

pub use retry::*;

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};

/// Component identifier used when dispatching guard events.
const SOURCE: &str = "progression-guard";

/// Identifier for a critical reward (e.g. a progression item).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RewardId(pub String);

impl RewardId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for RewardId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier for a player save.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SaveId(pub String);

impl SaveId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl std::fmt::Display for SaveId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reward tiers, ordered from worst to best outcome. A stored tier only ever
/// moves toward a higher one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RewardTier {
    Base,
    Technical,
    Annotated,
}

/// The persisted record of a critical reward. Once `granted` is true it never
/// reverts, and the tier never moves lower.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalReward {
    pub id: RewardId,
    pub granted: bool,
    pub granted_tier: Option<RewardTier>,
}

impl CriticalReward {
    /// A granted record at the given tier.
    pub fn granted(id: RewardId, tier: RewardTier) -> Self {
        Self {
            id,
            granted: true,
            granted_tier: Some(tier),
        }
    }
}

/// The outcome of a grant call. Every call site learns which case it hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOutcome {
    /// First grant for this `(save, reward)` pair.
    Granted(RewardTier),
    /// An already-granted record was upgraded to a higher tier.
    Upgraded { from: RewardTier, to: RewardTier },
    /// Already granted at an equal or higher tier; nothing happened and no
    /// event was emitted.
    AlreadyGranted(RewardTier),
}

/// Failure from the persistence collaborator.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct StoreError(pub String);

impl StoreError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Persistence seam for reward records. A write must be atomic: either the
/// full record lands or nothing does, so a failed write leaves no
/// half-granted state behind.
pub trait RewardStore {
    fn load(&self, save: &SaveId, reward: &RewardId) -> Result<Option<CriticalReward>, StoreError>;

    fn persist(&mut self, save: &SaveId, record: &CriticalReward) -> Result<(), StoreError>;
}

/// In-memory store, the default for tests and single-process hosts.
#[derive(Debug, Default)]
pub struct MemoryRewardStore {
    records: HashMap<(SaveId, RewardId), CriticalReward>,
}

impl MemoryRewardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Direct read access, for hosts that persist the whole map elsewhere.
    pub fn record(&self, save: &SaveId, reward: &RewardId) -> Option<&CriticalReward> {
        self.records.get(&(save.clone(), reward.clone()))
    }
}

impl RewardStore for MemoryRewardStore {
    fn load(&self, save: &SaveId, reward: &RewardId) -> Result<Option<CriticalReward>, StoreError> {
        Ok(self.records.get(&(save.clone(), reward.clone())).cloned())
    }

    fn persist(&mut self, save: &SaveId, record: &CriticalReward) -> Result<(), StoreError> {
        self.records
            .insert((save.clone(), record.id.clone()), record.clone());
        Ok(())
    }
}

/// The single authority for granting critical rewards.
pub struct ProgressionGuard<S: RewardStore> {
    save: SaveId,
    store: S,
    policy: RetryPolicy,
    scheduler: Box<dyn RetryScheduler>,
    bus: EventBus,
}

impl<S: RewardStore> ProgressionGuard<S> {
    /// Create a guard for a save, with the default retry policy.
    pub fn new(save: SaveId, store: S, bus: EventBus) -> Self {
        Self {
            save,
            store,
            policy: RetryPolicy::default(),
            scheduler: Box::new(ThreadScheduler),
            bus,
        }
    }

    /// Override the retry policy.
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Override the retry scheduler (tests inject a fake here).
    pub fn with_scheduler(mut self, scheduler: impl RetryScheduler + 'static) -> Self {
        self.scheduler = Box::new(scheduler);
        self
    }

    pub fn save(&self) -> &SaveId {
        &self.save
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Grant a reward at a tier, idempotently.
    ///
    /// Calling this any number of times, from any call site, yields exactly
    /// one granted record. A later call with a strictly higher tier upgrades
    /// the stored tier; an equal-or-lower tier is a no-op. Exactly one
    /// `RewardGranted` event is emitted per first grant or upgrade, never for
    /// a no-op. A persistence failure after all retries surfaces
    /// `CriticalRewardFailure` and leaves the record ungranted so a later
    /// independent call site can still succeed.
    pub fn grant(
        &mut self,
        reward: &RewardId,
        tier: RewardTier,
    ) -> Result<GrantOutcome, EngineError> {
        let existing = self
            .store
            .load(&self.save, reward)
            .map_err(|source| self.persist_failure(reward, 0, source))?;

        if let Some(record) = existing.filter(|r| r.granted) {
            let current = record.granted_tier.unwrap_or(RewardTier::Base);
            if tier <= current {
                return Ok(GrantOutcome::AlreadyGranted(current));
            }

            let upgraded = CriticalReward::granted(reward.clone(), tier);
            self.persist_with_retry(&upgraded)?;
            tracing::info!(save = %self.save, %reward, from = ?current, to = ?tier, "reward tier upgraded");
            self.bus.dispatch(
                EngineEvent::RewardGranted {
                    save: self.save.clone(),
                    reward: reward.clone(),
                    tier,
                    upgraded: true,
                },
                SOURCE,
            )?;
            return Ok(GrantOutcome::Upgraded {
                from: current,
                to: tier,
            });
        }

        let record = CriticalReward::granted(reward.clone(), tier);
        self.persist_with_retry(&record)?;
        tracing::info!(save = %self.save, %reward, ?tier, "reward granted");
        self.bus.dispatch(
            EngineEvent::RewardGranted {
                save: self.save.clone(),
                reward: reward.clone(),
                tier,
                upgraded: false,
            },
            SOURCE,
        )?;
        Ok(GrantOutcome::Granted(tier))
    }

    fn persist_with_retry(&mut self, record: &CriticalReward) -> Result<(), EngineError> {
        let mut last_error = None;
        for attempt in 1..=self.policy.max_attempts {
            match self.store.persist(&self.save, record) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    tracing::warn!(
                        save = %self.save,
                        reward = %record.id,
                        attempt,
                        error = %err,
                        "reward persist failed"
                    );
                    last_error = Some(err);
                    if attempt < self.policy.max_attempts {
                        self.scheduler.pause(self.policy.delay_after(attempt));
                    }
                }
            }
        }

        let source = last_error.unwrap_or_else(|| StoreError::new("no attempts were made"));
        Err(self.persist_failure(&record.id, self.policy.max_attempts, source))
    }

    fn persist_failure(&self, reward: &RewardId, attempts: u32, source: StoreError) -> EngineError {
        let err = EngineError::CriticalRewardFailure {
            reward: reward.clone(),
            attempts,
            source,
        };
        self.bus.report_fault(&err, SOURCE);
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventKind, EventRecord};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;

    /// Store whose next `failures` persist calls fail.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryRewardStore,
        failures: u32,
    }

    impl RewardStore for FlakyStore {
        fn load(
            &self,
            save: &SaveId,
            reward: &RewardId,
        ) -> Result<Option<CriticalReward>, StoreError> {
            self.inner.load(save, reward)
        }

        fn persist(&mut self, save: &SaveId, record: &CriticalReward) -> Result<(), StoreError> {
            if self.failures > 0 {
                self.failures -= 1;
                return Err(StoreError::new("disk full"));
            }
            self.inner.persist(save, record)
        }
    }

    #[derive(Clone, Default)]
    struct RecordingScheduler {
        pauses: Rc<RefCell<Vec<Duration>>>,
    }

    impl RetryScheduler for RecordingScheduler {
        fn pause(&mut self, delay: Duration) {
            self.pauses.borrow_mut().push(delay);
        }
    }

    fn granted_events(bus: &EventBus) -> Rc<RefCell<Vec<(RewardTier, bool)>>> {
        let grants = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&grants);
        bus.subscribe(EventKind::RewardGranted, move |record: &EventRecord| {
            if let EngineEvent::RewardGranted { tier, upgraded, .. } = record.event {
                sink.borrow_mut().push((tier, upgraded));
            }
            Ok(())
        });
        grants
    }

    fn guard(bus: EventBus) -> ProgressionGuard<MemoryRewardStore> {
        ProgressionGuard::new(SaveId::new("save-1"), MemoryRewardStore::new(), bus)
            .with_scheduler(RecordingScheduler::default())
    }

    #[test]
    fn test_grant_is_idempotent() {
        let bus = EventBus::new();
        let grants = granted_events(&bus);
        let mut guard = guard(bus);
        let journal = RewardId::new("journal");

        assert_eq!(
            guard.grant(&journal, RewardTier::Base).unwrap(),
            GrantOutcome::Granted(RewardTier::Base)
        );
        for _ in 0..4 {
            assert_eq!(
                guard.grant(&journal, RewardTier::Base).unwrap(),
                GrantOutcome::AlreadyGranted(RewardTier::Base)
            );
        }

        let record = guard.store().record(&SaveId::new("save-1"), &journal);
        assert_eq!(
            record,
            Some(&CriticalReward::granted(journal, RewardTier::Base))
        );
        // Exactly one event despite five calls.
        assert_eq!(*grants.borrow(), vec![(RewardTier::Base, false)]);
    }

    #[test]
    fn test_tier_upgrades_never_downgrades() {
        let bus = EventBus::new();
        let grants = granted_events(&bus);
        let mut guard = guard(bus);
        let journal = RewardId::new("journal");

        guard.grant(&journal, RewardTier::Base).unwrap();
        assert_eq!(
            guard.grant(&journal, RewardTier::Annotated).unwrap(),
            GrantOutcome::Upgraded {
                from: RewardTier::Base,
                to: RewardTier::Annotated
            }
        );
        // The slow low-tier path arriving late must not downgrade.
        assert_eq!(
            guard.grant(&journal, RewardTier::Technical).unwrap(),
            GrantOutcome::AlreadyGranted(RewardTier::Annotated)
        );

        assert_eq!(
            *grants.borrow(),
            vec![(RewardTier::Base, false), (RewardTier::Annotated, true)]
        );
    }

    #[test]
    fn test_high_tier_first_then_low_is_noop() {
        let bus = EventBus::new();
        let mut guard = guard(bus);
        let journal = RewardId::new("journal");

        guard.grant(&journal, RewardTier::Annotated).unwrap();
        assert_eq!(
            guard.grant(&journal, RewardTier::Base).unwrap(),
            GrantOutcome::AlreadyGranted(RewardTier::Annotated)
        );
    }

    #[test]
    fn test_persist_retries_with_backoff() {
        let bus = EventBus::new();
        let grants = granted_events(&bus);
        let scheduler = RecordingScheduler::default();
        let pauses = Rc::clone(&scheduler.pauses);

        let store = FlakyStore {
            inner: MemoryRewardStore::new(),
            failures: 2,
        };
        let mut guard = ProgressionGuard::new(SaveId::new("save-1"), store, bus)
            .with_scheduler(scheduler);

        let outcome = guard.grant(&RewardId::new("journal"), RewardTier::Base);
        assert_eq!(outcome.unwrap(), GrantOutcome::Granted(RewardTier::Base));

        // Two failures, so two backoff pauses before the third attempt.
        assert_eq!(
            *pauses.borrow(),
            vec![Duration::from_millis(50), Duration::from_millis(100)]
        );
        assert_eq!(grants.borrow().len(), 1);
    }

    #[test]
    fn test_exhausted_retries_leave_reward_grantable() {
        let bus = EventBus::new();
        let grants = granted_events(&bus);
        let journal = RewardId::new("journal");

        let store = FlakyStore {
            inner: MemoryRewardStore::new(),
            failures: 3,
        };
        let mut guard = ProgressionGuard::new(SaveId::new("save-1"), store, bus)
            .with_scheduler(RecordingScheduler::default());

        let outcome = guard.grant(&journal, RewardTier::Base);
        assert!(matches!(
            outcome,
            Err(EngineError::CriticalRewardFailure { attempts: 3, .. })
        ));
        assert!(grants.borrow().is_empty());

        // The record was never marked granted, so an independent later call
        // site succeeds.
        assert_eq!(
            guard.grant(&journal, RewardTier::Base).unwrap(),
            GrantOutcome::Granted(RewardTier::Base)
        );
        assert_eq!(*grants.borrow(), vec![(RewardTier::Base, false)]);
    }

    #[test]
    fn test_failure_reported_as_fault_event() {
        let bus = EventBus::new();
        let faults = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&faults);
        bus.subscribe(EventKind::EngineFault, move |record: &EventRecord| {
            if let EngineEvent::EngineFault { code, .. } = &record.event {
                sink.borrow_mut().push(code.clone());
            }
            Ok(())
        });

        let store = FlakyStore {
            inner: MemoryRewardStore::new(),
            failures: 3,
        };
        let mut guard = ProgressionGuard::new(SaveId::new("save-1"), store, bus)
            .with_scheduler(RecordingScheduler::default());

        let _ = guard.grant(&RewardId::new("journal"), RewardTier::Base);
        assert_eq!(*faults.borrow(), vec!["critical-reward-failure".to_string()]);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(RewardTier::Base < RewardTier::Technical);
        assert!(RewardTier::Technical < RewardTier::Annotated);
    }
}
