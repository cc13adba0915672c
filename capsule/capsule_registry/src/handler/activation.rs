use crate::reference::CapabilityReference;
use capsule_condition::{Condition, ConditionEvent, Conditions};
use capsule_core::{CapabilityContext, Delivery, SubscriptionId};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::{error, warn};

struct Bound {
    condition: Arc<dyn Condition>,
    subscription: SubscriptionId,
}

/// Activates and passivates a reference as its activation condition changes.
///
/// Bound while the reference is enabled. The effective condition is the
/// capability's own activation condition ANDed with "system is active".
///
/// Condition events only trigger a re-read: the reference compares the
/// condition's current value under its lifecycle lock, so events delivered
/// out of order on different threads cannot leave it in a stale state.
pub(crate) struct ActivationConditionHandler {
    reference: Weak<CapabilityReference>,
    conditions: Conditions,
    bound: Mutex<Option<Bound>>,
}

impl ActivationConditionHandler {
    pub(crate) fn new(reference: Weak<CapabilityReference>, conditions: Conditions) -> Self {
        Self {
            reference,
            conditions,
            bound: Mutex::new(None),
        }
    }

    pub(crate) fn bind(&self) {
        if self.bound.lock().is_some() {
            return;
        }
        let Some(reference) = self.reference.upgrade() else {
            return;
        };

        let condition = self.resolve(&reference);
        condition.bind();

        let target = self.reference.clone();
        let condition_id = condition.id();
        let subscription = self.conditions.bus().subscribe_filtered::<ConditionEvent, _, _>(
            format!("activation of {}", reference.id()),
            Delivery::Concurrent,
            move |event| event.condition() == condition_id,
            move |_| {
                let Some(reference) = target.upgrade() else {
                    return;
                };
                if let Err(err) = reference.follow_activation() {
                    warn!(
                        "Could not follow activation condition of capability {}: {}",
                        reference.id(),
                        err
                    );
                }
            },
        );

        *self.bound.lock() = Some(Bound {
            condition,
            subscription,
        });
    }

    pub(crate) fn release(&self) {
        let bound = self.bound.lock().take();
        if let Some(bound) = bound {
            self.conditions.bus().unsubscribe(bound.subscription);
            bound.condition.release();
        }
    }

    pub(crate) fn is_condition_satisfied(&self) -> bool {
        self.condition().is_some_and(|c| c.is_satisfied())
    }

    pub(crate) fn explain_why_not_satisfied(&self) -> String {
        match self.condition() {
            Some(condition) => condition.explain_unsatisfied(),
            None => String::from("Activation condition is not bound"),
        }
    }

    fn condition(&self) -> Option<Arc<dyn Condition>> {
        self.bound.lock().as_ref().map(|b| b.condition.clone())
    }

    fn resolve(&self, reference: &Arc<CapabilityReference>) -> Arc<dyn Condition> {
        let declared = match reference.capability().activation_condition() {
            Ok(declared) => declared,
            Err(err) => {
                error!(
                    "Could not determine activation condition of capability {}: {:#}",
                    reference.id(),
                    err
                );
                return self
                    .conditions
                    .never("Failed to determine activation condition");
            }
        };

        let system = self.conditions.system_active();
        let Some(declared) = declared else {
            return system;
        };

        if let Some(aware) = declared.as_context_aware() {
            if let Err(err) = aware.set_context(reference.clone()) {
                error!(
                    "Activation condition of capability {} rejected its context: {}",
                    reference.id(),
                    err
                );
                return self
                    .conditions
                    .never("Activation condition could not be scoped to this capability");
            }
        }

        match self.conditions.all(vec![declared, system]) {
            Ok(condition) => condition,
            Err(err) => {
                error!("Could not combine activation conditions: {}", err);
                self.conditions.never("Invalid activation condition")
            }
        }
    }
}
