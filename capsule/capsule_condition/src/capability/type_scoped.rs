use crate::condition::{ConditionState, ConditionSupport};
use capsule_core::{CapabilityEvent, CapabilityQuery, CapabilityType, Delivery, EventBus};
use std::sync::{Arc, Weak};

/// What a type-scoped condition requires of the capabilities of its type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCheck {
    /// At least one capability of the type exists.
    Exists,
    /// At least one capability of the type is active.
    Active,
}

impl TypeCheck {
    fn reacts_to(self, event: &CapabilityEvent) -> bool {
        match self {
            TypeCheck::Exists => matches!(
                event,
                CapabilityEvent::Created(_) | CapabilityEvent::AfterRemove(_)
            ),
            TypeCheck::Active => matches!(
                event,
                CapabilityEvent::AfterActivated(_)
                    | CapabilityEvent::BeforePassivated(_)
                    | CapabilityEvent::AfterRemove(_)
            ),
        }
    }
}

/// Satisfied while some capability of a given type exists, or is active.
pub struct CapabilityOfTypeCondition {
    state: ConditionState,
    capability_type: CapabilityType,
    check: TypeCheck,
    query: Weak<dyn CapabilityQuery>,
}

impl CapabilityOfTypeCondition {
    /// Create an unbound condition over capabilities of `capability_type`.
    pub fn new(
        bus: Arc<EventBus>,
        query: Weak<dyn CapabilityQuery>,
        capability_type: CapabilityType,
        check: TypeCheck,
    ) -> Self {
        Self {
            state: ConditionState::new(bus),
            capability_type,
            check,
            query,
        }
    }
}

fn evaluate(
    query: &Weak<dyn CapabilityQuery>,
    capability_type: &CapabilityType,
    check: TypeCheck,
) -> bool {
    let Some(query) = query.upgrade() else {
        return false;
    };
    query.capabilities().iter().any(|context| {
        context.capability_type() == *capability_type
            && (check == TypeCheck::Exists || context.is_active())
    })
}

impl ConditionSupport for CapabilityOfTypeCondition {
    fn state(&self) -> &ConditionState {
        &self.state
    }

    fn do_bind(&self) {
        let capability_type = self.capability_type.clone();
        let check = self.check;
        let query = self.query.clone();
        let state = self.state.clone();
        self.state.subscribe::<CapabilityEvent, _>(
            format!("{:?} capability of type {}", check, capability_type),
            Delivery::Concurrent,
            move |event| {
                if check.reacts_to(event) && event.capability_type() == capability_type {
                    state.set_satisfied(evaluate(&query, &capability_type, check));
                }
            },
        );
        self.state
            .set_satisfied(evaluate(&self.query, &self.capability_type, self.check));
    }

    fn describe_satisfied(&self) -> String {
        match self.check {
            TypeCheck::Exists => format!("{} capability exists", self.capability_type),
            TypeCheck::Active => format!("{} capability is active", self.capability_type),
        }
    }

    fn describe_unsatisfied(&self) -> String {
        match self.check {
            TypeCheck::Exists => format!("{} capability does not exist", self.capability_type),
            TypeCheck::Active => format!("No {} capability is active", self.capability_type),
        }
    }
}
