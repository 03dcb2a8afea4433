//! Resource economy - bounded player resources that gate strategic actions.
//!
//! Every mutation clamps to the resource's bounds and announces itself on the
//! bus only when the clamped value actually changed. Momentum carries an
//! extra rule: a non-optimal choice resets it to its minimum and emits the
//! distinct `MomentumReset` so listeners can distinguish a broken streak from
//! an ordinary spend.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::EngineError;
use crate::events::{EngineEvent, EventBus};

/// Component identifier used when dispatching economy events.
const SOURCE: &str = "resource-economy";

/// Identifier for a bounded player resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(pub String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The insight resource, spent on strategic actions.
    pub fn insight() -> Self {
        Self::new("insight")
    }

    /// The momentum streak counter.
    pub fn momentum() -> Self {
        Self::new("momentum")
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A bounded integer resource. `value` always stays within `[min, max]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub id: ResourceId,
    pub value: i64,
    pub min: i64,
    pub max: i64,
}

impl Resource {
    /// Create a resource with the given bounds; the initial value is clamped.
    pub fn new(id: ResourceId, min: i64, max: i64, initial: i64) -> Self {
        Self {
            id,
            value: initial.clamp(min, max),
            min,
            max,
        }
    }
}

/// Direction of a threshold crossing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CrossingDirection {
    Upward,
    Downward,
}

struct ThresholdWatch {
    resource: ResourceId,
    value: i64,
    above: bool,
}

/// The single authority over all bounded resources.
pub struct ResourceLedger {
    resources: HashMap<ResourceId, Resource>,
    thresholds: Vec<ThresholdWatch>,
    bus: EventBus,
}

impl ResourceLedger {
    /// Create an empty ledger publishing on the given bus.
    pub fn new(bus: EventBus) -> Self {
        Self {
            resources: HashMap::new(),
            thresholds: Vec::new(),
            bus,
        }
    }

    /// Register a resource. Replaces any prior definition with the same id.
    pub fn register(&mut self, resource: Resource) {
        self.resources.insert(resource.id.clone(), resource);
    }

    /// Watch a threshold on a registered resource. The crossing event fires
    /// once per direction change, not on every mutation above the line.
    pub fn watch_threshold(&mut self, id: &ResourceId, value: i64) -> Result<(), EngineError> {
        let current = self.value(id)?;
        self.thresholds.push(ThresholdWatch {
            resource: id.clone(),
            value,
            above: current >= value,
        });
        Ok(())
    }

    /// Current value of a resource.
    pub fn value(&self, id: &ResourceId) -> Result<i64, EngineError> {
        self.resources
            .get(id)
            .map(|r| r.value)
            .ok_or_else(|| EngineError::UnknownResource(id.clone()))
    }

    /// Add a (possibly negative) delta, clamped to the resource bounds.
    /// Returns the new value.
    pub fn add(&mut self, id: &ResourceId, delta: i64) -> Result<i64, EngineError> {
        let current = self.value(id)?;
        self.apply(id, current.saturating_add(delta))
    }

    /// Set a resource to a value, clamped to its bounds. Returns the new
    /// value.
    pub fn set(&mut self, id: &ResourceId, value: i64) -> Result<i64, EngineError> {
        self.apply(id, value)
    }

    /// Break the momentum streak: reset momentum to its minimum and emit the
    /// distinct `MomentumReset` event (no `ResourceChanged` is emitted for
    /// the same mutation). No event fires when momentum is already at its
    /// minimum.
    pub fn reset_momentum(&mut self) -> Result<i64, EngineError> {
        let id = ResourceId::momentum();
        let resource = self
            .resources
            .get_mut(&id)
            .ok_or_else(|| EngineError::UnknownResource(id.clone()))?;

        let previous = resource.value;
        let min = resource.min;
        if previous == min {
            return Ok(previous);
        }
        resource.value = min;

        self.bus
            .dispatch(EngineEvent::MomentumReset { previous }, SOURCE)?;
        self.check_thresholds(&id, min)?;
        Ok(min)
    }

    fn apply(&mut self, id: &ResourceId, target: i64) -> Result<i64, EngineError> {
        let resource = self
            .resources
            .get_mut(id)
            .ok_or_else(|| EngineError::UnknownResource(id.clone()))?;

        let previous = resource.value;
        let clamped = target.clamp(resource.min, resource.max);
        if clamped == previous {
            return Ok(previous);
        }
        resource.value = clamped;

        self.bus.dispatch(
            EngineEvent::ResourceChanged {
                resource: id.clone(),
                previous,
                value: clamped,
            },
            SOURCE,
        )?;
        self.check_thresholds(id, clamped)?;
        Ok(clamped)
    }

    fn check_thresholds(&mut self, id: &ResourceId, value: i64) -> Result<(), EngineError> {
        let mut crossings = Vec::new();
        for watch in self.thresholds.iter_mut().filter(|w| &w.resource == id) {
            let above = value >= watch.value;
            if above != watch.above {
                watch.above = above;
                crossings.push((watch.value, if above {
                    CrossingDirection::Upward
                } else {
                    CrossingDirection::Downward
                }));
            }
        }
        for (threshold, direction) in crossings {
            self.bus.dispatch(
                EngineEvent::ThresholdCrossed {
                    resource: id.clone(),
                    threshold,
                    direction,
                },
                SOURCE,
            )?;
        }
        Ok(())
    }
}
