//! Condition handlers driving a reference's activation and validity.

mod activation;
mod validity;

pub(crate) use activation::ActivationConditionHandler;
pub(crate) use validity::ValidityConditionHandler;
