//! The live wrapper around one capability instance.
//!
//! A reference owns the capability's lifecycle state and its condition
//! handlers. Lifecycle operations are serialized by a reentrant lock and may
//! nest on the same thread. The events a transition raises are held back
//! until the lock is released, so no bus handler ever runs while another
//! thread waits for this reference. The data lock is only held for short
//! reads and writes.

use crate::capability::Capability;
use crate::handler::{ActivationConditionHandler, ValidityConditionHandler};
use crate::registry::CapabilityRegistry;
use capsule_condition::Conditions;
use capsule_core::{
    CallbackFailure, CapabilityContext, CapabilityDescriptor, CapabilityError, CapabilityEvent,
    CapabilityIdentity, CapabilityType, EventBus, Properties, Result,
};
use parking_lot::{ReentrantMutex, RwLock};
use std::cell::RefCell;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::{debug, error, info};

/// Lifecycle state of a capability reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceState {
    /// Constructed, not yet created or loaded.
    New,
    /// Created but not enabled.
    Disabled,
    /// Enabled, waiting for its activation condition.
    Enabled,
    /// Enabled and active.
    Active,
    /// Removed; no further operation is permitted.
    Removed,
}

impl fmt::Display for ReferenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReferenceState::New => "New",
            ReferenceState::Disabled => "Disabled",
            ReferenceState::Enabled => "Enabled",
            ReferenceState::Active => "Active",
            ReferenceState::Removed => "Removed",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
struct ReferenceData {
    state: ReferenceState,
    properties: Properties,
    stored: Properties,
    notes: Option<String>,
    failure: Option<CallbackFailure>,
}

/// Events raised inside a transition, waiting for the lifecycle lock to be released.
#[derive(Default)]
struct Outbox {
    depth: usize,
    events: Vec<CapabilityEvent>,
}

struct Depth<'a>(&'a RefCell<Outbox>);

impl Drop for Depth<'_> {
    fn drop(&mut self) {
        self.0.borrow_mut().depth -= 1;
    }
}

/// A capability instance together with its lifecycle state.
pub struct CapabilityReference {
    me: Weak<CapabilityReference>,
    id: CapabilityIdentity,
    capability_type: CapabilityType,
    descriptor: Arc<dyn CapabilityDescriptor>,
    capability: Box<dyn Capability>,
    bus: Arc<EventBus>,
    lifecycle: ReentrantMutex<RefCell<Outbox>>,
    data: RwLock<ReferenceData>,
    activation: ActivationConditionHandler,
    validity: ValidityConditionHandler,
}

impl CapabilityReference {
    pub(crate) fn new(
        id: CapabilityIdentity,
        capability_type: CapabilityType,
        descriptor: Arc<dyn CapabilityDescriptor>,
        capability: Box<dyn Capability>,
        conditions: Conditions,
        registry: Weak<CapabilityRegistry>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            id,
            capability_type,
            descriptor,
            capability,
            bus: conditions.bus().clone(),
            lifecycle: ReentrantMutex::new(RefCell::new(Outbox::default())),
            data: RwLock::new(ReferenceData {
                state: ReferenceState::New,
                properties: Properties::new(),
                stored: Properties::new(),
                notes: None,
                failure: None,
            }),
            activation: ActivationConditionHandler::new(me.clone(), conditions.clone()),
            validity: ValidityConditionHandler::new(me.clone(), registry, conditions),
        })
    }

    /// The wrapped capability.
    pub fn capability(&self) -> &dyn Capability {
        self.capability.as_ref()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ReferenceState {
        self.data.read().state
    }

    /// Properties as persisted, with sensitive values encrypted.
    pub fn stored_properties(&self) -> Properties {
        self.data.read().stored.clone()
    }

    pub(crate) fn validity_handler(&self) -> &ValidityConditionHandler {
        &self.validity
    }

    pub(crate) fn create(&self, properties: Properties, stored: Properties) -> Result<()> {
        self.initialize("create", "Create", properties, stored, |capability, p| {
            capability.on_create(p)
        })
    }

    pub(crate) fn load(&self, properties: Properties, stored: Properties) -> Result<()> {
        self.initialize("load", "Load", properties, stored, |capability, p| {
            capability.on_load(p)
        })
    }

    fn initialize(
        &self,
        operation: &str,
        action: &str,
        properties: Properties,
        stored: Properties,
        callback: impl FnOnce(&dyn Capability, &Properties) -> anyhow::Result<()>,
    ) -> Result<()> {
        self.transition(|| {
            self.require(operation, &[ReferenceState::New])?;
            {
                let mut data = self.data.write();
                data.properties = properties.clone();
                data.stored = stored;
            }

            if let Some(context) = self.context() {
                self.capability.init(context.clone());
                self.publish(CapabilityEvent::Created(context));
            }
            self.run_callback(action, |capability| callback(capability, &properties));

            self.set_state(ReferenceState::Disabled);
            self.validity.bind();
            debug!("Capability {} {}d", self.id, operation);
            Ok(())
        })
    }

    pub(crate) fn enable(&self) -> Result<()> {
        self.transition(|| match self.state() {
            ReferenceState::Disabled => {
                debug!("Enabling capability {}", self.id);
                self.set_state(ReferenceState::Enabled);
                self.activation.bind();
                Ok(())
            }
            ReferenceState::Enabled | ReferenceState::Active => Ok(()),
            state => Err(illegal(state, "enable")),
        })
    }

    pub(crate) fn disable(&self) -> Result<()> {
        self.transition(|| match self.state() {
            ReferenceState::Enabled | ReferenceState::Active => {
                debug!("Disabling capability {}", self.id);
                self.activation.release();
                self.passivate()?;
                self.set_state(ReferenceState::Disabled);
                Ok(())
            }
            ReferenceState::Disabled => Ok(()),
            state => Err(illegal(state, "disable")),
        })
    }

    /// Activate if enabled and the activation condition is satisfied.
    pub(crate) fn activate(&self) -> Result<()> {
        self.transition(|| {
            if self.state() != ReferenceState::Enabled {
                return Ok(());
            }
            if !self.activation.is_condition_satisfied() {
                debug!(
                    "Capability {} is not yet activatable: {}",
                    self.id,
                    self.activation.explain_why_not_satisfied()
                );
                return Ok(());
            }

            if self.run_callback("Activate", |capability| capability.on_activate()) {
                self.set_state(ReferenceState::Active);
                info!("Activated capability {} ({})", self.id, self.capability_type);
                if let Some(context) = self.context() {
                    self.publish(CapabilityEvent::AfterActivated(context));
                }
            }
            Ok(())
        })
    }

    /// Passivate if active.
    pub(crate) fn passivate(&self) -> Result<()> {
        self.transition(|| {
            if self.state() != ReferenceState::Active {
                return Ok(());
            }

            self.set_state(ReferenceState::Enabled);
            if let Some(context) = self.context() {
                self.publish(CapabilityEvent::BeforePassivated(context));
            }
            self.run_callback("Passivate", |capability| capability.on_passivate());
            info!("Passivated capability {} ({})", self.id, self.capability_type);
            Ok(())
        })
    }

    /// Activate or passivate according to the current value of the
    /// activation condition, whatever event triggered the call.
    pub(crate) fn follow_activation(&self) -> Result<()> {
        self.transition(|| {
            if self.activation.is_condition_satisfied() {
                self.activate()
            } else {
                self.passivate()
            }
        })
    }

    /// Apply new properties. Unchanged properties are ignored unless `force`.
    ///
    /// `BeforeUpdate` and `AfterUpdate` are posted without the lifecycle lock
    /// held, so conditions reacting to them can passivate and re-activate
    /// the capability around `on_update`.
    pub(crate) fn update(&self, properties: Properties, stored: Properties, force: bool) -> Result<()> {
        let previous = self.transition(|| {
            let state = self.state();
            if matches!(state, ReferenceState::New | ReferenceState::Removed) {
                return Err(illegal(state, "update"));
            }

            let mut data = self.data.write();
            data.stored = stored;
            if data.properties == properties && !force {
                return Ok(None);
            }
            Ok(Some(data.properties.clone()))
        })?;
        let Some(previous) = previous else {
            return Ok(());
        };

        debug!("Updating capability {}", self.id);
        let context = self.context();
        if let Some(context) = &context {
            self.bus.post(CapabilityEvent::BeforeUpdate {
                context: context.clone(),
                properties: properties.clone(),
                previous: previous.clone(),
            });
        }

        self.transition(|| {
            let state = self.state();
            if state == ReferenceState::Removed {
                return Err(illegal(state, "update"));
            }
            self.data.write().properties = properties.clone();

            let updated = self
                .run_callback("Update", |capability| capability.on_update(&properties, &previous));
            if !updated {
                self.passivate()?;
            }
            Ok(())
        })?;

        if let Some(context) = context {
            self.bus.post(CapabilityEvent::AfterUpdate {
                context,
                properties,
                previous,
            });
        }
        Ok(())
    }

    pub(crate) fn remove(&self) -> Result<()> {
        self.transition(|| {
            let state = self.state();
            if matches!(state, ReferenceState::New | ReferenceState::Removed) {
                return Err(illegal(state, "remove"));
            }

            self.disable()?;
            self.validity.release();
            self.run_callback("Remove", |capability| capability.on_remove());
            self.set_state(ReferenceState::Removed);
            info!("Removed capability {} ({})", self.id, self.capability_type);

            if let Some(context) = self.context() {
                self.publish(CapabilityEvent::AfterRemove(context));
            }
            Ok(())
        })
    }

    pub(crate) fn set_notes(&self, notes: Option<String>) {
        self.data.write().notes = notes;
    }

    pub(crate) fn set_stored_properties(&self, stored: Properties) {
        self.data.write().stored = stored;
    }

    /// Record a failure that did not come from a capability callback.
    pub(crate) fn record_failure(&self, action: &str, message: String) {
        error!(
            "Capability {} ({}) failed to {}: {}",
            self.id,
            self.capability_type,
            action.to_lowercase(),
            message
        );
        self.data.write().failure = Some(CallbackFailure::new(action, message.clone()));
        if let Some(context) = self.context() {
            self.publish(CapabilityEvent::CallbackFailure {
                context,
                action: action.to_string(),
                message,
            });
        }
    }

    fn reset_failure(&self) {
        let had_failure = self.data.write().failure.take().is_some();
        if had_failure {
            if let Some(context) = self.context() {
                self.publish(CapabilityEvent::CallbackFailureCleared(context));
            }
        }
    }

    /// Run a capability callback, capturing its failure. Returns whether it succeeded.
    fn run_callback(
        &self,
        action: &str,
        callback: impl FnOnce(&dyn Capability) -> anyhow::Result<()>,
    ) -> bool {
        match callback(self.capability.as_ref()) {
            Ok(()) => {
                self.reset_failure();
                true
            }
            Err(err) => {
                self.record_failure(action, format!("{:#}", err));
                false
            }
        }
    }

    /// Run `operation` under the lifecycle lock.
    ///
    /// Events published during the operation, including nested transitions
    /// on the same thread, are posted in order once the outermost
    /// transition has released the lock.
    fn transition<T>(&self, operation: impl FnOnce() -> Result<T>) -> Result<T> {
        let lifecycle = self.lifecycle.lock();
        lifecycle.borrow_mut().depth += 1;
        let result = {
            let _depth = Depth(&*lifecycle);
            operation()
        };
        let events = {
            let mut outbox = lifecycle.borrow_mut();
            if outbox.depth == 0 {
                std::mem::take(&mut outbox.events)
            } else {
                Vec::new()
            }
        };
        drop(lifecycle);

        for event in events {
            self.bus.post(event);
        }
        result
    }

    fn publish(&self, event: CapabilityEvent) {
        let lifecycle = self.lifecycle.lock();
        let mut outbox = lifecycle.borrow_mut();
        if outbox.depth > 0 {
            outbox.events.push(event);
            return;
        }
        drop(outbox);
        drop(lifecycle);
        self.bus.post(event);
    }

    fn require(&self, operation: &str, allowed: &[ReferenceState]) -> Result<()> {
        let state = self.state();
        if allowed.contains(&state) {
            Ok(())
        } else {
            Err(illegal(state, operation))
        }
    }

    fn set_state(&self, state: ReferenceState) {
        self.data.write().state = state;
    }

    fn context(&self) -> Option<Arc<dyn CapabilityContext>> {
        self.me
            .upgrade()
            .map(|me| me as Arc<dyn CapabilityContext>)
    }
}

fn illegal(state: ReferenceState, operation: &str) -> capsule_core::Error {
    CapabilityError::IllegalState {
        state: state.to_string(),
        operation: operation.to_string(),
    }
    .into()
}

impl CapabilityContext for CapabilityReference {
    fn id(&self) -> CapabilityIdentity {
        self.id
    }

    fn capability_type(&self) -> CapabilityType {
        self.capability_type.clone()
    }

    fn descriptor(&self) -> Arc<dyn CapabilityDescriptor> {
        self.descriptor.clone()
    }

    fn properties(&self) -> Properties {
        self.data.read().properties.clone()
    }

    fn notes(&self) -> Option<String> {
        self.data.read().notes.clone()
    }

    fn is_enabled(&self) -> bool {
        matches!(
            self.state(),
            ReferenceState::Enabled | ReferenceState::Active
        )
    }

    fn is_active(&self) -> bool {
        self.state() == ReferenceState::Active
    }

    fn failure(&self) -> Option<CallbackFailure> {
        self.data.read().failure.clone()
    }

    fn state_description(&self) -> String {
        match self.state() {
            ReferenceState::Enabled if !self.activation.is_condition_satisfied() => {
                self.activation.explain_why_not_satisfied()
            }
            state => state.to_string(),
        }
    }
}

impl fmt::Debug for CapabilityReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CapabilityReference")
            .field("id", &self.id)
            .field("type", &self.capability_type)
            .field("state", &self.state())
            .finish()
    }
}
