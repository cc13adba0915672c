use crate::reference::CapabilityReference;
use crate::registry::CapabilityRegistry;
use capsule_condition::{Condition, ConditionEvent, Conditions};
use capsule_core::{CapabilityContext, ConditionId, Delivery, SubscriptionId};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::{error, info, warn};

#[derive(Default)]
struct Bound {
    system: Option<Arc<dyn Condition>>,
    validity: Option<Arc<dyn Condition>>,
    subscription: Option<SubscriptionId>,
}

/// Removes a capability from the registry once its validity condition fails.
///
/// The validity condition is only bound while the system is active, so a
/// shutdown never looks like a loss of validity. A capability is removed at
/// most once, however many threads observe the loss.
pub(crate) struct ValidityConditionHandler {
    reference: Weak<CapabilityReference>,
    registry: Weak<CapabilityRegistry>,
    conditions: Conditions,
    bound: Mutex<Bound>,
    removing: AtomicBool,
}

impl ValidityConditionHandler {
    pub(crate) fn new(
        reference: Weak<CapabilityReference>,
        registry: Weak<CapabilityRegistry>,
        conditions: Conditions,
    ) -> Self {
        Self {
            reference,
            registry,
            conditions,
            bound: Mutex::new(Bound::default()),
            removing: AtomicBool::new(false),
        }
    }

    pub(crate) fn bind(&self) {
        if self.bound.lock().system.is_some() {
            return;
        }

        let system = self.conditions.system_active();
        system.bind();
        self.bound.lock().system = Some(system);

        let name = match self.reference.upgrade() {
            Some(reference) => format!("validity of {}", reference.id()),
            None => String::from("validity"),
        };
        let watched = self.reference.clone();
        let target = self.reference.clone();
        let subscription = self.conditions.bus().subscribe_filtered::<ConditionEvent, _, _>(
            name,
            Delivery::Concurrent,
            move |event| {
                watched
                    .upgrade()
                    .is_some_and(|reference| reference.validity_handler().watches(event.condition()))
            },
            move |event| {
                if let Some(reference) = target.upgrade() {
                    reference.validity_handler().handle(event);
                }
            },
        );
        self.bound.lock().subscription = Some(subscription);

        self.follow_system();
    }

    pub(crate) fn release(&self) {
        let Bound {
            system,
            validity,
            subscription,
        } = std::mem::take(&mut *self.bound.lock());

        if let Some(validity) = validity {
            validity.release();
        }
        if let Some(subscription) = subscription {
            self.conditions.bus().unsubscribe(subscription);
        }
        if let Some(system) = system {
            system.release();
        }
    }

    fn watches(&self, condition: ConditionId) -> bool {
        let bound = self.bound.lock();
        let watched = [&bound.system, &bound.validity]
            .into_iter()
            .flatten()
            .any(|c| c.id() == condition);
        watched
    }

    fn handle(&self, event: &ConditionEvent) {
        let system = self.bound.lock().system.as_ref().map(|c| c.id());
        if system == Some(event.condition()) {
            self.follow_system();
        } else {
            self.check_validity();
        }
    }

    /// Bind the validity condition while the system is active and release
    /// it otherwise, re-reading the system state until it holds still.
    fn follow_system(&self) {
        loop {
            let Some(system) = self.bound.lock().system.clone() else {
                return;
            };
            let active = system.is_satisfied();
            if active {
                self.bind_validity();
            } else {
                self.release_validity();
            }
            if system.is_satisfied() == active {
                return;
            }
        }
    }

    fn bind_validity(&self) {
        if self.bound.lock().validity.is_some() {
            return;
        }
        let Some(reference) = self.reference.upgrade() else {
            return;
        };

        let condition = self.resolve(&reference);
        condition.bind();
        let was_satisfied = condition.is_satisfied();

        let superseded = {
            let mut bound = self.bound.lock();
            if bound.validity.is_some() || bound.system.is_none() {
                Some(condition)
            } else {
                bound.validity = Some(condition);
                None
            }
        };
        match superseded {
            Some(condition) => condition.release(),
            // Lost before the handler started watching it.
            None if was_satisfied => self.check_validity(),
            None => {}
        }
    }

    fn release_validity(&self) {
        let validity = self.bound.lock().validity.take();
        if let Some(validity) = validity {
            validity.release();
        }
    }

    fn check_validity(&self) {
        let validity = self.bound.lock().validity.clone();
        if validity.is_some_and(|c| !c.is_satisfied()) {
            self.remove_capability();
        }
    }

    fn resolve(&self, reference: &Arc<CapabilityReference>) -> Arc<dyn Condition> {
        let declared = match reference.capability().validity_condition() {
            Ok(Some(declared)) => declared,
            Ok(None) => return self.conditions.always("Capability is always valid"),
            Err(err) => {
                error!(
                    "Could not determine validity condition of capability {}: {:#}",
                    reference.id(),
                    err
                );
                return self
                    .conditions
                    .always("Failed to determine validity condition");
            }
        };

        if let Some(aware) = declared.as_context_aware() {
            if let Err(err) = aware.set_context(reference.clone()) {
                error!(
                    "Validity condition of capability {} rejected its context: {}",
                    reference.id(),
                    err
                );
                return self
                    .conditions
                    .always("Validity condition could not be scoped to this capability");
            }
        }
        declared
    }

    fn remove_capability(&self) {
        if self.removing.swap(true, Ordering::SeqCst) {
            return;
        }
        let Some(reference) = self.reference.upgrade() else {
            return;
        };
        let id = reference.id();
        info!(
            "Removing capability {} ({}) as it is no longer valid",
            id,
            reference.capability_type()
        );

        if let Err(err) = reference.disable() {
            error!("Failed to disable invalid capability {}: {}", id, err);
        }
        match self.registry.upgrade() {
            Some(registry) => {
                if let Err(err) = registry.remove_non_exposed(id) {
                    error!("Failed to remove invalid capability {}: {}", id, err);
                }
            }
            None => warn!("Capability {} is invalid but its registry is gone", id),
        }
    }
}
