//! engine
//!
//! The staged, transactional operation execution engine.
//!
//! # Architecture
//!
//! Every mutation of the configuration model flows through one lifecycle:
//!
//! ```text
//! Model -> Runtime -> Verify -> Domain -> commit | rollback
//! ```
//!
//! A caller hands the [`controller::ModelController`] an operation request
//! and an initial step handler. The handler runs in the `Model` stage
//! against a copy-on-write working copy of the model, queueing further
//! steps for the current or later stages as it goes. The scheduler drains
//! the per-stage queues in order; the coordinator then either commits the
//! working copy atomically or discards it, firing registered rollback and
//! result callbacks in reverse registration order.
//!
//! # Invariants
//!
//! - Exactly one operation holds the writer lock at a time; readers never
//!   block and observe only committed snapshots
//! - Steps never run in an earlier stage than the one executing
//! - Committed state changes all at once or not at all
//! - Every operation terminates in a commit or a rollback; the writer
//!   lock is released either way
//!
//! # Example
//!
//! ```
//! use stagecraft::core::address::PathAddress;
//! use stagecraft::core::value::Value;
//! use stagecraft::engine::context::OperationContext;
//! use stagecraft::engine::controller::ModelController;
//! use stagecraft::engine::step::OperationRequest;
//!
//! fn add_queue(
//!     ctx: &mut OperationContext<'_>,
//!     _op: &OperationRequest,
//! ) -> Result<(), stagecraft::engine::OperationError> {
//!     let resource = ctx.create_resource(&PathAddress::root())?;
//!     resource.set_attribute("durable", Value::Boolean(true));
//!     Ok(())
//! }
//!
//! let controller = ModelController::new();
//! let request = OperationRequest::new("add", "/queue=orders".parse().unwrap());
//! let response = controller.execute(request, add_queue).unwrap();
//! assert!(response.is_success());
//! ```

pub mod attachments;
pub mod authorize;
pub mod context;
pub mod controller;
pub mod coordinator;
pub mod lock;
pub mod resolver;
pub mod response;
mod scheduler;
pub mod services;
pub mod stage;
pub mod step;

// Re-exports for convenience
pub use attachments::AttachmentKey;
pub use authorize::{ActionEffect, AuthorizationDecision, Authorizer, EffectSet, PermitAll};
pub use context::{MessageSeverity, OperationContext, OwnerToken};
pub use controller::{ControllerConfig, DriverMode, ModelController, ProcessKind};
pub use coordinator::{ExecutionStatus, ResultAction};
pub use lock::{LockError, WriteLock, WriteLockGuard};
pub use resolver::{EnvResolver, ExpressionResolver, ResolveError};
pub use response::{OperationResponse, Outcome};
pub use services::{InMemoryServiceContainer, ServiceContainer, ServiceError, ServiceName};
pub use stage::Stage;
pub use step::{OperationRequest, StepHandler};

use std::fmt;

use uuid::Uuid;

use crate::core::address::{AddressError, PathAddress};
use crate::core::resource::ResourceError;

/// Unique identity of one executing operation. Used to scope service
/// removal ownership and to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationId(Uuid);

impl OperationId {
    /// Mint a fresh id.
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors from operation execution.
///
/// The taxonomy matters for control flow: recoverable variants are
/// modeled failures that roll the operation back and come back to the
/// caller inside a `failed` response; [`OperationError::LockTimeout`] and
/// [`OperationError::Defect`] are terminal and surface as `Err` from
/// [`controller::ModelController::execute`].
#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    /// A handler rejected the operation; the text becomes the failure
    /// description.
    #[error("{0}")]
    Failed(String),

    /// The request asked for something this context cannot do, such as
    /// mutating the model from a runtime step.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// A resource already exists at the address.
    #[error("a resource already exists at {0}")]
    DuplicateResource(PathAddress),

    /// No resource exists at the address.
    #[error("no resource exists at {0}")]
    NoSuchResource(PathAddress),

    /// A step was queued for a stage the operation has moved past, or for
    /// the terminal pseudo-stage.
    #[error("cannot add a step for stage {requested} while executing stage {current}")]
    InvalidStage {
        /// The stage the step was queued for.
        requested: Stage,
        /// The stage currently executing.
        current: Stage,
    },

    /// A `Domain` step was queued on a process that is not a domain
    /// coordinator.
    #[error("the domain stage is only available on a domain coordinator")]
    DomainStageUnavailable,

    /// The writer lock could not be acquired before the deadline.
    #[error("could not acquire the controlling writer lock before the deadline")]
    LockTimeout,

    /// An expression could not be resolved.
    #[error(transparent)]
    Unresolvable(#[from] ResolveError),

    /// A service registry operation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// An address failed to parse or validate.
    #[error(transparent)]
    Address(#[from] AddressError),

    /// A step handler panicked. The operation was rolled back; the engine
    /// itself is still consistent, but the handler has a bug.
    #[error("step handler defect: {0}")]
    Defect(String),
}

impl OperationError {
    /// Whether this error is a modeled failure the engine absorbs into a
    /// `failed` response, as opposed to a terminal condition returned as
    /// `Err` to the caller.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            OperationError::LockTimeout | OperationError::Defect(_)
        )
    }
}

impl From<ResourceError> for OperationError {
    fn from(err: ResourceError) -> Self {
        match err {
            ResourceError::Duplicate(address) => OperationError::DuplicateResource(address),
            ResourceError::NotFound(address) => OperationError::NoSuchResource(address),
        }
    }
}

impl From<LockError> for OperationError {
    fn from(_: LockError) -> Self {
        OperationError::LockTimeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod operation_id {
        use super::*;

        #[test]
        fn ids_are_unique() {
            assert_ne!(OperationId::new(), OperationId::new());
        }
    }

    mod operation_error {
        use super::*;

        #[test]
        fn recoverability_split() {
            assert!(OperationError::Failed("nope".into()).is_recoverable());
            assert!(OperationError::Unsupported("nope".into()).is_recoverable());
            assert!(OperationError::DomainStageUnavailable.is_recoverable());
            assert!(!OperationError::LockTimeout.is_recoverable());
            assert!(!OperationError::Defect("bug".into()).is_recoverable());
        }

        #[test]
        fn resource_errors_map_to_address_variants() {
            let address: PathAddress = "/queue=orders".parse().unwrap();
            let err: OperationError = ResourceError::Duplicate(address.clone()).into();
            assert!(matches!(err, OperationError::DuplicateResource(_)));
            let err: OperationError = ResourceError::NotFound(address).into();
            assert!(matches!(err, OperationError::NoSuchResource(_)));
        }

        #[test]
        fn display_formatting() {
            let err = OperationError::InvalidStage {
                requested: Stage::Model,
                current: Stage::Runtime,
            };
            assert!(err.to_string().contains("model"));
            assert!(err.to_string().contains("runtime"));
        }
    }
}
