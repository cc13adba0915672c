use super::require_context;
use crate::condition::{ConditionState, ConditionSupport, ContextAware, ContextSlot};
use capsule_core::{CapabilityContext, CapabilityEvent, ConditionError, Delivery, EventBus};
use std::sync::Arc;

/// Satisfied while its capability has no recorded callback failure.
pub struct HasNoFailuresCondition {
    state: ConditionState,
    context: ContextSlot,
}

impl HasNoFailuresCondition {
    /// Create an unbound condition awaiting its context.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            state: ConditionState::new(bus),
            context: ContextSlot::new(),
        }
    }
}

impl ConditionSupport for HasNoFailuresCondition {
    fn state(&self) -> &ConditionState {
        &self.state
    }

    fn do_bind(&self) {
        let Some(context) = require_context(self.context.get(), "HasNoFailuresCondition") else {
            return;
        };

        let id = context.id();
        let state = self.state.clone();
        self.state.subscribe::<CapabilityEvent, _>(
            format!("no failures of {}", id),
            Delivery::Concurrent,
            move |event| {
                if event.capability_id() != id {
                    return;
                }
                match event {
                    CapabilityEvent::CallbackFailure { .. } => state.set_satisfied(false),
                    CapabilityEvent::CallbackFailureCleared(_) => state.set_satisfied(true),
                    _ => {}
                }
            },
        );
        self.state.set_satisfied(!context.has_failure());
    }

    fn describe_satisfied(&self) -> String {
        match self.context.get() {
            Some(context) => format!("{} has no failures", context.capability_type()),
            None => String::from("Capability has no failures"),
        }
    }

    fn describe_unsatisfied(&self) -> String {
        match self.context.get() {
            Some(context) => match context.failure() {
                Some(failure) => format!("{} {}", context.capability_type(), failure),
                None => format!("{} has failures", context.capability_type()),
            },
            None => String::from("No capability context"),
        }
    }

    fn context_aware(&self) -> Option<&dyn ContextAware> {
        Some(self)
    }
}

impl ContextAware for HasNoFailuresCondition {
    fn check_context(&self) -> Result<(), ConditionError> {
        self.context.check(&self.state)
    }

    fn set_context(&self, context: Arc<dyn CapabilityContext>) -> Result<(), ConditionError> {
        self.context.assign(&self.state, context)
    }
}
