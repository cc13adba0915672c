//! Conditions with a fixed value.

use crate::condition::{ConditionState, ConditionSupport};
use capsule_core::EventBus;
use std::sync::Arc;

/// A condition that is always, or never, satisfied once bound.
pub struct ConstantCondition {
    state: ConditionState,
    value: bool,
    reason: String,
}

impl ConstantCondition {
    /// A condition satisfied as soon as it is bound.
    pub fn satisfied(bus: Arc<EventBus>, reason: impl Into<String>) -> Self {
        Self::new(bus, true, reason)
    }

    /// A condition that is never satisfied.
    pub fn unsatisfied(bus: Arc<EventBus>, reason: impl Into<String>) -> Self {
        Self::new(bus, false, reason)
    }

    fn new(bus: Arc<EventBus>, value: bool, reason: impl Into<String>) -> Self {
        Self {
            state: ConditionState::new(bus),
            value,
            reason: reason.into(),
        }
    }
}

impl ConditionSupport for ConstantCondition {
    fn state(&self) -> &ConditionState {
        &self.state
    }

    fn do_bind(&self) {
        self.state.set_satisfied(self.value);
    }

    fn describe_satisfied(&self) -> String {
        self.reason.clone()
    }

    fn describe_unsatisfied(&self) -> String {
        self.reason.clone()
    }
}
