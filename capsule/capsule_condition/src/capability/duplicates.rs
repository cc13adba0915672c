use super::{project, require_context};
use crate::condition::{ConditionState, ConditionSupport, ContextAware, ContextSlot};
use capsule_core::{
    CapabilityContext, CapabilityEvent, CapabilityQuery, ConditionError, Delivery, EventBus,
};
use std::sync::{Arc, Weak};

/// Satisfied while no other capability of the same type has equal properties.
///
/// Equality can be restricted to a subset of property keys.
pub struct NoDuplicatesCondition {
    state: ConditionState,
    context: ContextSlot,
    query: Weak<dyn CapabilityQuery>,
    keys: Arc<[String]>,
}

impl NoDuplicatesCondition {
    /// Create an unbound condition comparing the properties under `keys`,
    /// or all properties when `keys` is empty.
    pub fn new(bus: Arc<EventBus>, query: Weak<dyn CapabilityQuery>, keys: Vec<String>) -> Self {
        Self {
            state: ConditionState::new(bus),
            context: ContextSlot::new(),
            query,
            keys: keys.into(),
        }
    }
}

fn is_unique(
    context: &dyn CapabilityContext,
    query: &Weak<dyn CapabilityQuery>,
    keys: &[String],
) -> bool {
    let Some(query) = query.upgrade() else {
        return true;
    };
    let id = context.id();
    let capability_type = context.capability_type();
    let own = project(&context.properties(), keys);

    !query.capabilities().iter().any(|other| {
        other.id() != id
            && other.capability_type() == capability_type
            && project(&other.properties(), keys) == own
    })
}

impl ConditionSupport for NoDuplicatesCondition {
    fn state(&self) -> &ConditionState {
        &self.state
    }

    fn do_bind(&self) {
        let Some(context) = require_context(self.context.get(), "NoDuplicatesCondition") else {
            return;
        };

        let capability_type = context.capability_type();
        let query = self.query.clone();
        let keys = self.keys.clone();
        let state = self.state.clone();
        let subject = context.clone();
        self.state.subscribe::<CapabilityEvent, _>(
            format!("no duplicates of {}", context.id()),
            Delivery::Concurrent,
            move |event| {
                let relevant = matches!(
                    event,
                    CapabilityEvent::Created(_)
                        | CapabilityEvent::AfterUpdate { .. }
                        | CapabilityEvent::AfterRemove(_)
                );
                if relevant && event.capability_type() == capability_type {
                    state.set_satisfied(is_unique(subject.as_ref(), &query, &keys));
                }
            },
        );
        self.state
            .set_satisfied(is_unique(context.as_ref(), &self.query, &self.keys));
    }

    fn describe_satisfied(&self) -> String {
        String::from("Capability has no duplicates")
    }

    fn describe_unsatisfied(&self) -> String {
        match self.context.get() {
            Some(context) => format!(
                "Another {} capability with the same configuration exists",
                context.capability_type()
            ),
            None => String::from("Duplicate capability exists"),
        }
    }

    fn context_aware(&self) -> Option<&dyn ContextAware> {
        Some(self)
    }
}

impl ContextAware for NoDuplicatesCondition {
    fn check_context(&self) -> Result<(), ConditionError> {
        self.context.check(&self.state)
    }

    fn set_context(&self, context: Arc<dyn CapabilityContext>) -> Result<(), ConditionError> {
        self.context.assign(&self.state, context)
    }
}
