//! Event bus and the events published by the capability framework.

pub mod bus;
pub mod capability;

pub use bus::{Delivery, EventBus};
pub use capability::{CapabilityEvent, CapabilityRegistryEvent};
