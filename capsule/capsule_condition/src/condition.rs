//! The condition contract and the shared state behind every implementation.
//!
//! A condition has two orthogonal states: binding (unbound or bound) and,
//! while bound, satisfaction. Implementations supply the binding hooks
//! through [`ConditionSupport`]; the [`Condition`] contract itself, with its
//! idempotent `bind`/`release` and duplicate-free event emission, is derived
//! from it.

use crate::event::ConditionEvent;
use capsule_core::{
    CapabilityContext, ConditionError, ConditionId, Delivery, EventBus, SubscriptionId,
};
use log::{debug, trace};
use parking_lot::Mutex;
use std::any::Any;
use std::sync::{Arc, Weak};

/// A bindable, event-emitting boolean predicate.
pub trait Condition: Send + Sync {
    /// Identity of this condition instance.
    fn id(&self) -> ConditionId;

    /// Start tracking the predicate. Calling it on a bound condition is a no-op.
    fn bind(&self);

    /// Stop tracking the predicate. Calling it on an unbound condition is a no-op.
    fn release(&self);

    /// Whether the condition is bound.
    fn is_active(&self) -> bool;

    /// Whether the condition is satisfied.
    fn is_satisfied(&self) -> bool;

    /// Why the condition is satisfied.
    fn explain_satisfied(&self) -> String;

    /// Why the condition is not satisfied.
    fn explain_unsatisfied(&self) -> String;

    /// The context-binding facet, for conditions scoped to one capability.
    fn as_context_aware(&self) -> Option<&dyn ContextAware> {
        None
    }
}

/// Conditions that must be scoped to a single capability before binding.
pub trait ContextAware: Send + Sync {
    /// Check that a context could be assigned now, without assigning it.
    fn check_context(&self) -> Result<(), ConditionError>;

    /// Assign the capability context.
    ///
    /// # Errors
    ///
    /// `ConditionError::AlreadyBound` if the condition is bound and
    /// `ConditionError::ContextAlreadySet` if a context was assigned before.
    /// On error nothing is changed.
    fn set_context(&self, context: Arc<dyn CapabilityContext>) -> Result<(), ConditionError>;
}

#[derive(Debug, Default)]
struct Flags {
    active: bool,
    satisfied: bool,
}

struct StateInner {
    id: ConditionId,
    bus: Arc<EventBus>,
    flags: Mutex<Flags>,
    subscriptions: Mutex<Vec<SubscriptionId>>,
}

/// Binding and satisfaction state of one condition.
///
/// Cloning yields another handle to the same state, which is how event
/// handlers registered by a condition update it.
#[derive(Clone)]
pub struct ConditionState {
    inner: Arc<StateInner>,
}

impl ConditionState {
    /// Create unbound, unsatisfied state posting on `bus`.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            inner: Arc::new(StateInner {
                id: ConditionId::new(),
                bus,
                flags: Mutex::new(Flags::default()),
                subscriptions: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Identity of the owning condition.
    pub fn id(&self) -> ConditionId {
        self.inner.id
    }

    /// The bus satisfaction events are posted on.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// Whether the owning condition is bound.
    pub fn is_active(&self) -> bool {
        self.inner.flags.lock().active
    }

    /// Current satisfaction value.
    pub fn is_satisfied(&self) -> bool {
        self.inner.flags.lock().satisfied
    }

    /// Record a new satisfaction value.
    ///
    /// Unchanged values are ignored. A change posts exactly one
    /// [`ConditionEvent`], and only while bound.
    pub fn set_satisfied(&self, satisfied: bool) {
        let post = {
            let mut flags = self.inner.flags.lock();
            if flags.satisfied == satisfied {
                return;
            }
            flags.satisfied = satisfied;
            flags.active
        };

        if post {
            trace!("Condition {} satisfied={}", self.inner.id, satisfied);
            let event = if satisfied {
                ConditionEvent::Satisfied(self.inner.id)
            } else {
                ConditionEvent::Unsatisfied(self.inner.id)
            };
            self.inner.bus.post(event);
        }
    }

    /// Subscribe `handler` on the condition's bus for as long as it stays bound.
    ///
    /// The subscription is removed automatically on release.
    pub fn subscribe<E, F>(&self, name: impl Into<String>, delivery: Delivery, handler: F)
    where
        E: Any + Send + Sync,
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = self.inner.bus.subscribe(name, delivery, handler);
        self.inner.subscriptions.lock().push(id);
    }

    fn mark_bound(&self) -> bool {
        let mut flags = self.inner.flags.lock();
        !std::mem::replace(&mut flags.active, true)
    }

    fn mark_released(&self) -> bool {
        let mut flags = self.inner.flags.lock();
        std::mem::replace(&mut flags.active, false)
    }

    fn unsubscribe_all(&self) {
        let subscriptions = std::mem::take(&mut *self.inner.subscriptions.lock());
        for id in subscriptions {
            self.inner.bus.unsubscribe(id);
        }
    }
}

/// Template hooks from which [`Condition`] is derived.
///
/// `do_bind` runs once per unbound-to-bound transition and typically
/// subscribes through [`ConditionState::subscribe`] and computes the initial
/// value. `do_release` runs once per bound-to-unbound transition, after the
/// state's subscriptions have been removed.
pub trait ConditionSupport: Send + Sync {
    /// Shared state of the condition.
    fn state(&self) -> &ConditionState;

    /// Subscribe and evaluate.
    fn do_bind(&self) {}

    /// Undo whatever `do_bind` did beyond subscriptions.
    fn do_release(&self) {}

    /// Explanation used while satisfied.
    fn describe_satisfied(&self) -> String;

    /// Explanation used while unsatisfied.
    fn describe_unsatisfied(&self) -> String;

    /// The context-binding facet, if any.
    fn context_aware(&self) -> Option<&dyn ContextAware> {
        None
    }
}

impl<T: ConditionSupport> Condition for T {
    fn id(&self) -> ConditionId {
        self.state().id()
    }

    fn bind(&self) {
        if self.state().mark_bound() {
            debug!("Binding condition {}", self.state().id());
            self.do_bind();
        }
    }

    fn release(&self) {
        if self.state().mark_released() {
            debug!("Releasing condition {}", self.state().id());
            self.state().unsubscribe_all();
            self.do_release();
        }
    }

    fn is_active(&self) -> bool {
        self.state().is_active()
    }

    fn is_satisfied(&self) -> bool {
        self.state().is_satisfied()
    }

    fn explain_satisfied(&self) -> String {
        self.describe_satisfied()
    }

    fn explain_unsatisfied(&self) -> String {
        self.describe_unsatisfied()
    }

    fn as_context_aware(&self) -> Option<&dyn ContextAware> {
        self.context_aware()
    }
}

/// Holds the capability context of a context-aware condition.
///
/// Only a weak handle is kept: the context usually owns, through its
/// capability, the very condition it is assigned to.
#[derive(Clone, Default)]
pub struct ContextSlot {
    context: Arc<Mutex<Option<Weak<dyn CapabilityContext>>>>,
}

impl ContextSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that `state`'s condition may still receive a context.
    pub fn check(&self, state: &ConditionState) -> Result<(), ConditionError> {
        if state.is_active() {
            return Err(ConditionError::AlreadyBound);
        }
        if self.context.lock().is_some() {
            return Err(ConditionError::ContextAlreadySet);
        }
        Ok(())
    }

    /// Assign the context, failing without side effects if it may not be.
    pub fn assign(
        &self,
        state: &ConditionState,
        context: Arc<dyn CapabilityContext>,
    ) -> Result<(), ConditionError> {
        if state.is_active() {
            return Err(ConditionError::AlreadyBound);
        }
        let mut slot = self.context.lock();
        if slot.is_some() {
            return Err(ConditionError::ContextAlreadySet);
        }
        *slot = Some(Arc::downgrade(&context));
        Ok(())
    }

    /// The assigned context, while it is still alive.
    pub fn get(&self) -> Option<Arc<dyn CapabilityContext>> {
        self.context.lock().as_ref().and_then(Weak::upgrade)
    }
}
