//! Conditions over live capabilities.
//!
//! Context-aware conditions watch one capability, identified by the context
//! they are given before binding. Type-scoped conditions watch every
//! capability of one type through a [`CapabilityQuery`](capsule_core::CapabilityQuery).

mod duplicates;
mod failures;
mod type_scoped;
mod update;

pub use duplicates::NoDuplicatesCondition;
pub use failures::HasNoFailuresCondition;
pub use type_scoped::{CapabilityOfTypeCondition, TypeCheck};
pub use update::PassivateDuringUpdateCondition;

use capsule_core::{CapabilityContext, Properties};
use log::error;
use std::sync::Arc;

fn require_context(
    context: Option<Arc<dyn CapabilityContext>>,
    condition: &str,
) -> Option<Arc<dyn CapabilityContext>> {
    if context.is_none() {
        error!("{} bound without a capability context; it stays unsatisfied", condition);
    }
    context
}

fn project(properties: &Properties, keys: &[String]) -> Properties {
    if keys.is_empty() {
        return properties.clone();
    }
    properties
        .iter()
        .filter(|(key, _)| keys.contains(key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
