//! One-stop factory for every condition kind.

use crate::capability::{
    CapabilityOfTypeCondition, HasNoFailuresCondition, NoDuplicatesCondition,
    PassivateDuringUpdateCondition, TypeCheck,
};
use crate::composite::CompositeCondition;
use crate::condition::Condition;
use crate::constant::ConstantCondition;
use crate::repository::{RepositoryCheck, RepositoryCondition, RepositoryStatus};
use crate::system::SystemStatus;
use capsule_core::{
    CapabilityContext, CapabilityQuery, CapabilityType, ConditionError, EventBus,
};
use std::sync::{Arc, Weak};

struct NoCapabilities;

impl CapabilityQuery for NoCapabilities {
    fn capabilities(&self) -> Vec<Arc<dyn CapabilityContext>> {
        Vec::new()
    }
}

struct NoRepositories;

impl RepositoryStatus for NoRepositories {
    fn exists(&self, _name: &str) -> bool {
        false
    }

    fn is_online(&self, _name: &str) -> bool {
        false
    }
}

/// Builds conditions sharing one bus, system status, capability query and
/// repository view.
#[derive(Clone)]
pub struct Conditions {
    bus: Arc<EventBus>,
    system: SystemStatus,
    query: Weak<dyn CapabilityQuery>,
    repositories: Arc<dyn RepositoryStatus>,
}

impl Conditions {
    /// Create a factory without capability or repository views.
    pub fn new(bus: Arc<EventBus>, system: SystemStatus) -> Self {
        let query: Weak<dyn CapabilityQuery> = Weak::<NoCapabilities>::new();
        Self {
            bus,
            system,
            query,
            repositories: Arc::new(NoRepositories),
        }
    }

    /// Use `query` for type-scoped and duplicate checks.
    pub fn with_query(mut self, query: Weak<dyn CapabilityQuery>) -> Self {
        self.query = query;
        self
    }

    /// Use `repositories` for repository conditions.
    pub fn with_repositories(mut self, repositories: Arc<dyn RepositoryStatus>) -> Self {
        self.repositories = repositories;
        self
    }

    /// The shared bus.
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The shared system status.
    pub fn system(&self) -> &SystemStatus {
        &self.system
    }

    pub fn always(&self, reason: impl Into<String>) -> Arc<dyn Condition> {
        Arc::new(ConstantCondition::satisfied(self.bus.clone(), reason))
    }

    pub fn never(&self, reason: impl Into<String>) -> Arc<dyn Condition> {
        Arc::new(ConstantCondition::unsatisfied(self.bus.clone(), reason))
    }

    pub fn all(&self, children: Vec<Arc<dyn Condition>>) -> Result<Arc<dyn Condition>, ConditionError> {
        Ok(Arc::new(CompositeCondition::all(self.bus.clone(), children)?))
    }

    pub fn any(&self, children: Vec<Arc<dyn Condition>>) -> Result<Arc<dyn Condition>, ConditionError> {
        Ok(Arc::new(CompositeCondition::any(self.bus.clone(), children)?))
    }

    pub fn not(&self, child: Arc<dyn Condition>) -> Arc<dyn Condition> {
        Arc::new(CompositeCondition::not(self.bus.clone(), child))
    }

    pub fn system_active(&self) -> Arc<dyn Condition> {
        Arc::new(self.system.active_condition())
    }

    pub fn has_no_failures(&self) -> Arc<dyn Condition> {
        Arc::new(HasNoFailuresCondition::new(self.bus.clone()))
    }

    pub fn passivate_during_update(&self) -> Arc<dyn Condition> {
        Arc::new(PassivateDuringUpdateCondition::new(self.bus.clone()))
    }

    /// Passivate during updates that change one of `keys`.
    pub fn passivate_on_change(&self, keys: &[&str]) -> Arc<dyn Condition> {
        Arc::new(PassivateDuringUpdateCondition::on_change(
            self.bus.clone(),
            keys.iter().map(|k| k.to_string()).collect(),
        ))
    }

    pub fn no_duplicates(&self) -> Arc<dyn Condition> {
        self.no_duplicates_on(&[])
    }

    /// No other capability of the same type has the same values for `keys`.
    pub fn no_duplicates_on(&self, keys: &[&str]) -> Arc<dyn Condition> {
        Arc::new(NoDuplicatesCondition::new(
            self.bus.clone(),
            self.query.clone(),
            keys.iter().map(|k| k.to_string()).collect(),
        ))
    }

    pub fn capability_of_type_exists(&self, capability_type: CapabilityType) -> Arc<dyn Condition> {
        Arc::new(CapabilityOfTypeCondition::new(
            self.bus.clone(),
            self.query.clone(),
            capability_type,
            TypeCheck::Exists,
        ))
    }

    pub fn capability_of_type_active(&self, capability_type: CapabilityType) -> Arc<dyn Condition> {
        Arc::new(CapabilityOfTypeCondition::new(
            self.bus.clone(),
            self.query.clone(),
            capability_type,
            TypeCheck::Active,
        ))
    }

    pub fn repository_exists(&self, repository: impl Into<String>) -> Arc<dyn Condition> {
        Arc::new(RepositoryCondition::new(
            self.bus.clone(),
            self.repositories.clone(),
            repository,
            RepositoryCheck::Exists,
        ))
    }

    pub fn repository_online(&self, repository: impl Into<String>) -> Arc<dyn Condition> {
        Arc::new(RepositoryCondition::new(
            self.bus.clone(),
            self.repositories.clone(),
            repository,
            RepositoryCheck::Online,
        ))
    }
}
