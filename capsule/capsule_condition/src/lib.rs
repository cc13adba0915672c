//! # Capsule Condition
//!
//! Bindable boolean predicates over live system state.
//!
//! A [`Condition`] is unbound when constructed. Binding it subscribes it to
//! the domain events it depends on; from then on every change of its
//! satisfaction posts exactly one [`ConditionEvent`]. Composite conditions
//! consume the events of their children, and the capability registry
//! consumes the events of activation and validity conditions.
//!
//! ## Crate Structure
//!
//! - **condition**: The `Condition` contract, `ConditionState` and `ConditionSupport`
//! - **composite**: AND / OR / NOT combinators
//! - **constant**: Always and never satisfied conditions
//! - **system**: System run state and the "system is active" condition
//! - **capability**: Context-aware and type-scoped capability conditions
//! - **repository**: Repository existence and availability
//! - **conditions**: The `Conditions` factory

pub mod capability;
pub mod composite;
pub mod condition;
pub mod conditions;
pub mod constant;
pub mod event;
pub mod repository;
pub mod system;

pub use composite::{CompositeCondition, Composition};
pub use condition::{Condition, ConditionState, ConditionSupport, ContextAware, ContextSlot};
pub use conditions::Conditions;
pub use constant::ConstantCondition;
pub use event::ConditionEvent;
pub use repository::{RepositoryCheck, RepositoryCondition, RepositoryEvent, RepositoryStatus};
pub use system::{SystemActiveCondition, SystemEvent, SystemStatus};
