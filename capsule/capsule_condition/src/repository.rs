//! Conditions over repositories managed by the hosting server.

use crate::condition::{ConditionState, ConditionSupport};
use capsule_core::{Delivery, EventBus};
use std::sync::Arc;

/// Posted by the repository manager when a repository changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepositoryEvent {
    /// A repository was created.
    Created(String),
    /// A repository was deleted.
    Deleted(String),
    /// A repository went online or offline.
    StatusChanged {
        /// Repository name.
        name: String,
        /// Whether it is now online.
        online: bool,
    },
}

impl RepositoryEvent {
    /// Name of the repository concerned.
    pub fn repository(&self) -> &str {
        match self {
            RepositoryEvent::Created(name)
            | RepositoryEvent::Deleted(name)
            | RepositoryEvent::StatusChanged { name, .. } => name,
        }
    }
}

/// Live view of the repository manager.
pub trait RepositoryStatus: Send + Sync {
    /// Whether a repository named `name` exists.
    fn exists(&self, name: &str) -> bool;

    /// Whether the repository named `name` exists and is online.
    fn is_online(&self, name: &str) -> bool;
}

/// What a [`RepositoryCondition`] requires of its repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryCheck {
    /// The repository exists.
    Exists,
    /// The repository exists and is online.
    Online,
}

/// Satisfied while a named repository exists, or is online.
pub struct RepositoryCondition {
    state: ConditionState,
    repository: String,
    check: RepositoryCheck,
    status: Arc<dyn RepositoryStatus>,
}

impl RepositoryCondition {
    /// Create an unbound condition on the repository `repository`.
    pub fn new(
        bus: Arc<EventBus>,
        status: Arc<dyn RepositoryStatus>,
        repository: impl Into<String>,
        check: RepositoryCheck,
    ) -> Self {
        Self {
            state: ConditionState::new(bus),
            repository: repository.into(),
            check,
            status,
        }
    }
}

fn evaluate(status: &dyn RepositoryStatus, repository: &str, check: RepositoryCheck) -> bool {
    match check {
        RepositoryCheck::Exists => status.exists(repository),
        RepositoryCheck::Online => status.is_online(repository),
    }
}

impl ConditionSupport for RepositoryCondition {
    fn state(&self) -> &ConditionState {
        &self.state
    }

    fn do_bind(&self) {
        let repository = self.repository.clone();
        let check = self.check;
        let status = self.status.clone();
        let state = self.state.clone();
        self.state.subscribe::<RepositoryEvent, _>(
            format!("repository {} {:?}", repository, check),
            Delivery::Concurrent,
            move |event| {
                if event.repository() == repository {
                    state.set_satisfied(evaluate(status.as_ref(), &repository, check));
                }
            },
        );
        self.state
            .set_satisfied(evaluate(self.status.as_ref(), &self.repository, self.check));
    }

    fn describe_satisfied(&self) -> String {
        match self.check {
            RepositoryCheck::Exists => format!("Repository '{}' exists", self.repository),
            RepositoryCheck::Online => format!("Repository '{}' is online", self.repository),
        }
    }

    fn describe_unsatisfied(&self) -> String {
        match self.check {
            RepositoryCheck::Exists => format!("Repository '{}' does not exist", self.repository),
            RepositoryCheck::Online => format!("Repository '{}' is offline", self.repository),
        }
    }
}
