//! Whether the hosting system is up.

use crate::condition::{ConditionState, ConditionSupport};
use capsule_core::{Delivery, EventBus};
use log::info;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Posted when the hosting system changes run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEvent {
    /// The system finished starting.
    Started,
    /// The system began shutting down.
    Stopping,
}

/// Shared run-state flag of the hosting system.
#[derive(Clone, Debug)]
pub struct SystemStatus {
    active: Arc<AtomicBool>,
    bus: Arc<EventBus>,
}

impl SystemStatus {
    /// Create a status that is not yet started.
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            active: Arc::new(AtomicBool::new(false)),
            bus,
        }
    }

    /// Whether the system is started and not stopping.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Mark the system started. Posts `SystemEvent::Started` on change.
    pub fn started(&self) {
        if !self.active.swap(true, Ordering::AcqRel) {
            info!("System started");
            self.bus.post(SystemEvent::Started);
        }
    }

    /// Mark the system stopping. Posts `SystemEvent::Stopping` on change.
    pub fn stopping(&self) {
        if self.active.swap(false, Ordering::AcqRel) {
            info!("System stopping");
            self.bus.post(SystemEvent::Stopping);
        }
    }

    /// A new condition tracking this status.
    pub fn active_condition(&self) -> SystemActiveCondition {
        SystemActiveCondition {
            state: ConditionState::new(self.bus.clone()),
            status: self.clone(),
        }
    }
}

/// Satisfied while the hosting system is active.
///
/// Unsatisfied until the system is marked started.
pub struct SystemActiveCondition {
    state: ConditionState,
    status: SystemStatus,
}

impl ConditionSupport for SystemActiveCondition {
    fn state(&self) -> &ConditionState {
        &self.state
    }

    fn do_bind(&self) {
        let state = self.state.clone();
        self.state.subscribe::<SystemEvent, _>(
            format!("system active condition {}", self.state.id()),
            Delivery::Concurrent,
            move |event| state.set_satisfied(*event == SystemEvent::Started),
        );
        self.state.set_satisfied(self.status.is_active());
    }

    fn describe_satisfied(&self) -> String {
        String::from("System is active")
    }

    fn describe_unsatisfied(&self) -> String {
        String::from("System is not active")
    }
}
