//! AND / OR / NOT combinators over other conditions.

use crate::condition::{Condition, ConditionState, ConditionSupport, ContextAware, ContextSlot};
use crate::event::ConditionEvent;
use capsule_core::{CapabilityContext, ConditionError, ConditionId, Delivery, EventBus};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// How a composite combines its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Composition {
    /// Satisfied iff every child is satisfied.
    All,
    /// Satisfied iff at least one child is satisfied.
    Any,
    /// Satisfied iff its single child is not.
    Not,
}

impl fmt::Display for Composition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Composition::All => "AND",
            Composition::Any => "OR",
            Composition::Not => "NOT",
        };
        f.write_str(name)
    }
}

/// A condition combining a fixed list of children.
///
/// The composite owns its children: binding or releasing the composite binds
/// or releases every child, and nothing else should do so.
pub struct CompositeCondition {
    state: ConditionState,
    composition: Composition,
    children: Arc<[Arc<dyn Condition>]>,
    context: ContextSlot,
}

impl CompositeCondition {
    /// Satisfied when all `children` are.
    ///
    /// # Errors
    ///
    /// `ConditionError::TooFewConditions` with fewer than two children.
    pub fn all(
        bus: Arc<EventBus>,
        children: Vec<Arc<dyn Condition>>,
    ) -> Result<Self, ConditionError> {
        Self::with_at_least(bus, Composition::All, children, 2)
    }

    /// Satisfied when any of `children` is.
    ///
    /// # Errors
    ///
    /// `ConditionError::TooFewConditions` with fewer than two children.
    pub fn any(
        bus: Arc<EventBus>,
        children: Vec<Arc<dyn Condition>>,
    ) -> Result<Self, ConditionError> {
        Self::with_at_least(bus, Composition::Any, children, 2)
    }

    /// Satisfied when `child` is not.
    pub fn not(bus: Arc<EventBus>, child: Arc<dyn Condition>) -> Self {
        Self::new(bus, Composition::Not, vec![child])
    }

    fn with_at_least(
        bus: Arc<EventBus>,
        composition: Composition,
        children: Vec<Arc<dyn Condition>>,
        required: usize,
    ) -> Result<Self, ConditionError> {
        if children.len() < required {
            return Err(ConditionError::TooFewConditions {
                required,
                actual: children.len(),
            });
        }
        Ok(Self::new(bus, composition, children))
    }

    fn new(bus: Arc<EventBus>, composition: Composition, children: Vec<Arc<dyn Condition>>) -> Self {
        Self {
            state: ConditionState::new(bus),
            composition,
            children: children.into(),
            context: ContextSlot::new(),
        }
    }

    /// How children are combined.
    pub fn composition(&self) -> Composition {
        self.composition
    }

    /// The children, in construction order.
    pub fn children(&self) -> &[Arc<dyn Condition>] {
        &self.children
    }
}

fn reevaluate(composition: Composition, children: &[Arc<dyn Condition>]) -> bool {
    match composition {
        Composition::All => children.iter().all(|c| c.is_satisfied()),
        Composition::Any => children.iter().any(|c| c.is_satisfied()),
        Composition::Not => children.first().is_some_and(|c| !c.is_satisfied()),
    }
}

/// Store the composite's value, re-checking until it agrees with the children.
///
/// Child events are delivered concurrently, so a value computed from a
/// snapshot may already be stale when stored. Whoever stores last re-reads
/// the children, so the stored value converges on the current one.
fn follow(state: &ConditionState, composition: Composition, children: &[Arc<dyn Condition>]) {
    loop {
        let satisfied = reevaluate(composition, children);
        state.set_satisfied(satisfied);
        if reevaluate(composition, children) == state.is_satisfied() {
            break;
        }
    }
}

fn join<'a>(
    children: impl Iterator<Item = &'a Arc<dyn Condition>>,
    explain: fn(&dyn Condition) -> String,
    separator: &str,
) -> String {
    children
        .map(|c| explain(&**c))
        .collect::<Vec<_>>()
        .join(separator)
}

impl ConditionSupport for CompositeCondition {
    fn state(&self) -> &ConditionState {
        &self.state
    }

    fn do_bind(&self) {
        for child in self.children.iter() {
            child.bind();
        }

        let members: HashSet<ConditionId> = self.children.iter().map(|c| c.id()).collect();
        let children = self.children.clone();
        let composition = self.composition;
        let state = self.state.clone();
        self.state.subscribe::<ConditionEvent, _>(
            format!("{} condition {}", composition, self.state.id()),
            Delivery::Concurrent,
            move |event| {
                if members.contains(&event.condition()) {
                    follow(&state, composition, &children);
                }
            },
        );

        follow(&self.state, self.composition, &self.children);
    }

    fn do_release(&self) {
        for child in self.children.iter() {
            child.release();
        }
    }

    fn describe_satisfied(&self) -> String {
        match self.composition {
            Composition::All => join(self.children.iter(), |c| c.explain_satisfied(), " AND "),
            Composition::Any => join(
                self.children.iter().filter(|c| c.is_satisfied()),
                |c| c.explain_satisfied(),
                " OR ",
            ),
            Composition::Not => join(self.children.iter(), |c| c.explain_unsatisfied(), ""),
        }
    }

    fn describe_unsatisfied(&self) -> String {
        match self.composition {
            Composition::All => join(
                self.children.iter().filter(|c| !c.is_satisfied()),
                |c| c.explain_unsatisfied(),
                " OR ",
            ),
            Composition::Any => join(self.children.iter(), |c| c.explain_unsatisfied(), " AND "),
            Composition::Not => join(self.children.iter(), |c| c.explain_satisfied(), ""),
        }
    }

    fn context_aware(&self) -> Option<&dyn ContextAware> {
        Some(self)
    }
}

impl ContextAware for CompositeCondition {
    fn check_context(&self) -> Result<(), ConditionError> {
        self.context.check(&self.state)?;
        for child in self.children.iter() {
            if let Some(aware) = child.as_context_aware() {
                aware.check_context()?;
            }
        }
        Ok(())
    }

    fn set_context(&self, context: Arc<dyn CapabilityContext>) -> Result<(), ConditionError> {
        // Every child is checked before any of them is touched. A child
        // listed more than once receives the context once.
        self.check_context()?;
        let mut assigned = HashSet::new();
        for child in self.children.iter() {
            if !assigned.insert(child.id()) {
                continue;
            }
            if let Some(aware) = child.as_context_aware() {
                aware.set_context(context.clone())?;
            }
        }
        self.context.assign(&self.state, context)
    }
}
