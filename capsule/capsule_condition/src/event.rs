//! Condition satisfaction events.

use capsule_core::ConditionId;

/// Posted on every real satisfaction transition of a bound condition.
///
/// Events identify their subject by [`ConditionId`], so two structurally
/// identical conditions are always distinguishable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConditionEvent {
    /// The condition became satisfied.
    Satisfied(ConditionId),

    /// The condition became unsatisfied.
    Unsatisfied(ConditionId),
}

impl ConditionEvent {
    /// The condition that changed.
    pub fn condition(&self) -> ConditionId {
        match self {
            ConditionEvent::Satisfied(id) | ConditionEvent::Unsatisfied(id) => *id,
        }
    }

    /// Whether the condition is now satisfied.
    pub fn is_satisfied(&self) -> bool {
        matches!(self, ConditionEvent::Satisfied(_))
    }
}
