//! The event bus - synchronous, in-order, fault-isolating publish/subscribe.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use std::time::SystemTime;
use thiserror::Error;

use super::{EngineEvent, EventKind, EventRecord};
use crate::error::EngineError;

/// Default capacity of the diagnostic history ring buffer.
pub const DEFAULT_HISTORY_CAPACITY: usize = 64;

/// Cap on retained handler faults.
const FAULT_CAPACITY: usize = 64;

/// Error returned by a failing event handler. The bus logs it and keeps
/// dispatching to the remaining handlers.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct HandlerError(String);

impl HandlerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Result type for event handlers.
pub type HandlerResult = Result<(), HandlerError>;

type Handler = Rc<RefCell<dyn FnMut(&EventRecord) -> HandlerResult>>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// A handler fault captured during dispatch - the diagnostic channel for
/// failures that must not interrupt delivery to other subscribers.
#[derive(Debug, Clone)]
pub struct DispatchFault {
    pub kind: EventKind,
    pub source: &'static str,
    pub subscription: SubscriptionId,
    pub message: String,
}

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
}

struct BusInner {
    handlers: HashMap<EventKind, Vec<Subscription>>,
    next_subscription: u64,
    next_sequence: u64,
    in_flight: HashSet<EventKind>,
    history: VecDeque<EventRecord>,
    history_capacity: usize,
    faults: VecDeque<DispatchFault>,
}

/// Typed publish/subscribe channel used for all cross-component signaling.
///
/// Dispatch is synchronous and in-order: every handler subscribed to a kind
/// runs, in subscription order, before `dispatch` returns. A handler error is
/// logged and captured (see [`EventBus::drain_faults`]) without stopping the
/// remaining handlers. Dispatching a kind from within a handler for that same
/// kind raises [`EngineError::ReentrantDispatch`]; nested dispatch of a
/// *different* kind is allowed. The bus keeps no state beyond subscriptions
/// and a bounded diagnostic ring buffer.
#[derive(Clone)]
pub struct EventBus {
    inner: Rc<RefCell<BusInner>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default history capacity.
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a bus with an explicit history capacity (0 disables history).
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(BusInner {
                handlers: HashMap::new(),
                next_subscription: 0,
                next_sequence: 0,
                in_flight: HashSet::new(),
                history: VecDeque::new(),
                history_capacity: capacity,
                faults: VecDeque::new(),
            })),
        }
    }

    /// Subscribe a handler to an event kind. Handlers run in subscription
    /// order.
    pub fn subscribe<F>(&self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&EventRecord) -> HandlerResult + 'static,
    {
        let mut inner = self.inner.borrow_mut();
        inner.next_subscription += 1;
        let id = SubscriptionId(inner.next_subscription);
        inner.handlers.entry(kind).or_default().push(Subscription {
            id,
            handler: Rc::new(RefCell::new(handler)),
        });
        id
    }

    /// Remove a subscription. Returns whether it existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.borrow_mut();
        for subscriptions in inner.handlers.values_mut() {
            if let Some(index) = subscriptions.iter().position(|s| s.id == id) {
                subscriptions.remove(index);
                return true;
            }
        }
        false
    }

    /// Dispatch an event to every subscriber of its kind.
    pub fn dispatch(&self, event: EngineEvent, source: &'static str) -> Result<(), EngineError> {
        let kind = event.kind();

        let (record, handlers) = {
            let mut inner = self.inner.borrow_mut();

            if !inner.in_flight.insert(kind) {
                let err = EngineError::ReentrantDispatch(kind);
                tracing::error!(%kind, source, "re-entrant event dispatch");
                return Err(err);
            }

            inner.next_sequence += 1;
            let record = EventRecord {
                sequence: inner.next_sequence,
                timestamp: SystemTime::now(),
                source,
                event,
            };

            if inner.history_capacity > 0 {
                if inner.history.len() == inner.history_capacity {
                    inner.history.pop_front();
                }
                inner.history.push_back(record.clone());
            }

            let handlers: Vec<(SubscriptionId, Handler)> = inner
                .handlers
                .get(&kind)
                .map(|subs| {
                    subs.iter()
                        .map(|s| (s.id, Rc::clone(&s.handler)))
                        .collect()
                })
                .unwrap_or_default();

            (record, handlers)
        };

        for (id, handler) in handlers {
            let outcome = (&mut *handler.borrow_mut())(&record);
            if let Err(err) = outcome {
                tracing::error!(
                    %kind,
                    source,
                    subscription = id.0,
                    error = %err,
                    "event handler failed"
                );
                let mut inner = self.inner.borrow_mut();
                if inner.faults.len() == FAULT_CAPACITY {
                    inner.faults.pop_front();
                }
                inner.faults.push_back(DispatchFault {
                    kind,
                    source,
                    subscription: id,
                    message: err.to_string(),
                });
            }
        }

        self.inner.borrow_mut().in_flight.remove(&kind);
        Ok(())
    }

    /// Report an engine error as an `EngineFault` event. The dispatch result
    /// is ignored so reporting never masks the original error.
    pub fn report_fault(&self, error: &EngineError, source: &'static str) {
        let _ = self.dispatch(
            EngineEvent::EngineFault {
                code: error.code().to_string(),
                message: error.to_string(),
            },
            source,
        );
    }

    /// Snapshot of the diagnostic history ring buffer.
    pub fn history(&self) -> Vec<EventRecord> {
        self.inner.borrow().history.iter().cloned().collect()
    }

    /// Drain captured handler faults.
    pub fn drain_faults(&self) -> Vec<DispatchFault> {
        self.inner.borrow_mut().faults.drain(..).collect()
    }

    /// Number of handlers currently subscribed to a kind.
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        self.inner
            .borrow()
            .handlers
            .get(&kind)
            .map(|subs| subs.len())
            .unwrap_or(0)
    }
}
