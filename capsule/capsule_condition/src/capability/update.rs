use super::require_context;
use crate::condition::{ConditionState, ConditionSupport, ContextAware, ContextSlot};
use capsule_core::{CapabilityContext, CapabilityEvent, ConditionError, Delivery, EventBus};
use std::sync::Arc;

/// Unsatisfied while its capability is being updated.
///
/// Used as part of an activation condition so the capability is passivated
/// before new properties are applied and activated again afterwards. When
/// restricted to a set of keys, only updates that change one of those keys
/// passivate the capability.
pub struct PassivateDuringUpdateCondition {
    state: ConditionState,
    context: ContextSlot,
    keys: Arc<[String]>,
}

impl PassivateDuringUpdateCondition {
    /// Passivate on every update.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::on_change(bus, Vec::new())
    }

    /// Passivate only when one of `keys` changes.
    pub fn on_change(bus: Arc<EventBus>, keys: Vec<String>) -> Self {
        Self {
            state: ConditionState::new(bus),
            context: ContextSlot::new(),
            keys: keys.into(),
        }
    }
}

impl ConditionSupport for PassivateDuringUpdateCondition {
    fn state(&self) -> &ConditionState {
        &self.state
    }

    fn do_bind(&self) {
        let Some(context) =
            require_context(self.context.get(), "PassivateDuringUpdateCondition")
        else {
            return;
        };

        let id = context.id();
        let keys = self.keys.clone();
        let state = self.state.clone();
        self.state.subscribe::<CapabilityEvent, _>(
            format!("update of {}", id),
            Delivery::Concurrent,
            move |event| {
                if event.capability_id() != id {
                    return;
                }
                match event {
                    CapabilityEvent::BeforeUpdate {
                        properties,
                        previous,
                        ..
                    } => {
                        let changed = keys.is_empty()
                            || keys.iter().any(|key| properties.get(key) != previous.get(key));
                        if changed {
                            state.set_satisfied(false);
                        }
                    }
                    CapabilityEvent::AfterUpdate { .. } => state.set_satisfied(true),
                    _ => {}
                }
            },
        );
        self.state.set_satisfied(true);
    }

    fn describe_satisfied(&self) -> String {
        String::from("Capability is not being updated")
    }

    fn describe_unsatisfied(&self) -> String {
        String::from("Capability is being updated")
    }

    fn context_aware(&self) -> Option<&dyn ContextAware> {
        Some(self)
    }
}

impl ContextAware for PassivateDuringUpdateCondition {
    fn check_context(&self) -> Result<(), ConditionError> {
        self.context.check(&self.state)
    }

    fn set_context(&self, context: Arc<dyn CapabilityContext>) -> Result<(), ConditionError> {
        self.context.assign(&self.state, context)
    }
}
