//! engine::services
//!
//! The service lifecycle collaborator.
//!
//! # Architecture
//!
//! The engine does not start or stop real services; that belongs to the
//! host process's service container, reached through the
//! [`ServiceContainer`] trait. What the engine does guarantee is
//! ordering: a removal initiated by an earlier step blocks a later
//! install of the same name until the removal completes. That
//! happens-before relationship is name-scoped and enforced on its own
//! condition variable, independent of the writer lock.
//!
//! # Removal Lifecycle
//!
//! `begin_removal` marks a service as pending removal; the service
//! disappears from queries immediately but the slot stays reserved. The
//! removal completes when the owning operation settles (commit: the
//! service is gone; rollback: the pending mark is dropped and the service
//! reappears - the registering step's rollback handler is responsible for
//! any live-service correction beyond that). An install of the same name
//! by the same operation completes the removal inline; an install by
//! another operation waits, with a deadline.
//!
//! # Invariants
//!
//! - A pending removal blocks a same-name install by another operation
//! - Install failures are recoverable operation failures, not defects
//! - Settle never blocks

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::coordinator::ResultAction;
use super::OperationId;
use crate::core::value::Value;

/// Errors from service registry operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    /// The name failed validation.
    #[error("invalid service name: {0}")]
    InvalidName(String),

    /// A service with this name is already installed.
    #[error("service {0} is already installed")]
    Duplicate(ServiceName),

    /// No service with this name exists.
    #[error("service {0} is not installed")]
    NotFound(ServiceName),

    /// A pending removal of this name did not complete before the deadline.
    #[error("removal of service {0} did not complete before the deadline")]
    RemovalPending(ServiceName),

    /// The container refused the install.
    #[error("failed to install service {name}: {reason}")]
    InstallFailed {
        /// The service that failed to install.
        name: ServiceName,
        /// Container-provided reason.
        reason: String,
    },
}

/// A validated service name.
///
/// Names are non-empty, contain no whitespace, and use `.` as the
/// conventional namespace separator (`subsystem.messaging.queue.orders`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ServiceName(String);

impl ServiceName {
    /// Create a validated service name.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidName` for empty names or names
    /// containing whitespace.
    pub fn new(name: impl Into<String>) -> Result<Self, ServiceError> {
        let name = name.into();
        if name.is_empty() {
            return Err(ServiceError::InvalidName("name cannot be empty".into()));
        }
        if name.chars().any(char::is_whitespace) {
            return Err(ServiceError::InvalidName(format!(
                "'{}' contains whitespace",
                name
            )));
        }
        Ok(Self(name))
    }

    /// The name as a string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServiceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for ServiceName {
    type Error = ServiceError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<ServiceName> for String {
    fn from(name: ServiceName) -> String {
        name.0
    }
}

/// The service lifecycle container the engine coordinates against.
pub trait ServiceContainer: Send + Sync {
    /// Install a service under `name` with the given descriptor.
    ///
    /// If a removal of the same name is pending from another operation,
    /// waits up to `wait` for it to complete. A pending removal owned by
    /// `op` itself is completed inline.
    fn install(
        &self,
        op: OperationId,
        name: &ServiceName,
        descriptor: Value,
        wait: Option<Duration>,
    ) -> Result<(), ServiceError>;

    /// Mark a service for removal on behalf of `op`. The removal takes
    /// full effect when the operation settles with a commit.
    fn begin_removal(&self, op: OperationId, name: &ServiceName) -> Result<(), ServiceError>;

    /// Remove a service immediately, bypassing the pending protocol.
    /// Intended for rollback handlers undoing their own install.
    fn uninstall(&self, name: &ServiceName) -> Result<(), ServiceError>;

    /// The descriptor of an installed service. Services pending removal
    /// are not visible.
    fn descriptor(&self, name: &ServiceName) -> Option<Value>;

    /// Names of all visible services.
    fn names(&self) -> Vec<ServiceName>;

    /// Complete or abandon the pending removals owned by `op`.
    fn settle(&self, op: OperationId, action: ResultAction);
}

#[derive(Debug, Default)]
struct ContainerState {
    services: BTreeMap<ServiceName, Value>,
    pending: HashMap<ServiceName, OperationId>,
}

/// An in-memory [`ServiceContainer`], used as the default collaborator
/// and as the test double for the real container.
#[derive(Debug, Default)]
pub struct InMemoryServiceContainer {
    state: Mutex<ContainerState>,
    removal_settled: Condvar,
}

impl InMemoryServiceContainer {
    /// Create an empty container.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ContainerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ServiceContainer for InMemoryServiceContainer {
    fn install(
        &self,
        op: OperationId,
        name: &ServiceName,
        descriptor: Value,
        wait: Option<Duration>,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock_state();
        let deadline = wait.map(|w| Instant::now() + w);

        loop {
            match state.pending.get(name) {
                Some(owner) if *owner == op => {
                    // Our own earlier removal: complete it now so the new
                    // install replaces the old service.
                    state.services.remove(name);
                    state.pending.remove(name);
                    break;
                }
                Some(_) => {
                    // Another operation's removal is in flight; respect the
                    // name-scoped happens-before.
                    let remaining = match deadline {
                        Some(expires) => expires
                            .checked_duration_since(Instant::now())
                            .ok_or_else(|| ServiceError::RemovalPending(name.clone()))?,
                        // Effectively unbounded without risking Instant overflow.
                        None => Duration::from_secs(60 * 60 * 24 * 365),
                    };
                    let (guard, timeout) = self
                        .removal_settled
                        .wait_timeout(state, remaining)
                        .unwrap_or_else(PoisonError::into_inner);
                    state = guard;
                    if timeout.timed_out() && state.pending.contains_key(name) {
                        return Err(ServiceError::RemovalPending(name.clone()));
                    }
                }
                None => break,
            }
        }

        if state.services.contains_key(name) {
            return Err(ServiceError::Duplicate(name.clone()));
        }
        state.services.insert(name.clone(), descriptor);
        Ok(())
    }

    fn begin_removal(&self, op: OperationId, name: &ServiceName) -> Result<(), ServiceError> {
        let mut state = self.lock_state();
        if !state.services.contains_key(name) {
            return Err(ServiceError::NotFound(name.clone()));
        }
        if state.pending.contains_key(name) {
            return Err(ServiceError::NotFound(name.clone()));
        }
        state.pending.insert(name.clone(), op);
        Ok(())
    }

    fn uninstall(&self, name: &ServiceName) -> Result<(), ServiceError> {
        let mut state = self.lock_state();
        state.pending.remove(name);
        if state.services.remove(name).is_none() {
            return Err(ServiceError::NotFound(name.clone()));
        }
        self.removal_settled.notify_all();
        Ok(())
    }

    fn descriptor(&self, name: &ServiceName) -> Option<Value> {
        let state = self.lock_state();
        if state.pending.contains_key(name) {
            return None;
        }
        state.services.get(name).cloned()
    }

    fn names(&self) -> Vec<ServiceName> {
        let state = self.lock_state();
        state
            .services
            .keys()
            .filter(|name| !state.pending.contains_key(*name))
            .cloned()
            .collect()
    }

    fn settle(&self, op: OperationId, action: ResultAction) {
        let mut state = self.lock_state();
        let mine: Vec<ServiceName> = state
            .pending
            .iter()
            .filter(|(_, owner)| **owner == op)
            .map(|(name, _)| name.clone())
            .collect();
        for name in mine {
            state.pending.remove(&name);
            if action == ResultAction::Keep {
                state.services.remove(&name);
            }
        }
        self.removal_settled.notify_all();
    }
}
