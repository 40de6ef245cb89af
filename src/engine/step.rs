//! engine::step
//!
//! The unit of work the scheduler executes.
//!
//! # Architecture
//!
//! A step binds a [`StepHandler`] (the business logic) to a stage, an
//! operation request, and a response slot. Handlers are a single
//! functional contract: given the operation context and the request,
//! do the work and return. There is no handler class hierarchy; optional
//! behavior (rollback cleanup, result interest) is expressed by
//! registering callbacks on the context before returning.
//!
//! # Completion Protocol
//!
//! A handler signals completion by returning:
//!
//! - `Ok(())` with no registered callback means "uninterested in the
//!   outcome" - equivalent to registering a no-op result handler
//! - `Ok(())` after `register_rollback_handler` / `register_result_handler`
//!   means "notify me, in reverse registration order, at finalization"
//! - `Err` with a recoverable error is a modeled failure: the operation
//!   rolls back and the description lands in the response
//! - A panic is a defect: the operation rolls back and the defect
//!   propagates to the caller

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::OperationContext;
use super::coordinator::ResultAction;
use super::stage::Stage;
use super::OperationError;
use crate::core::address::PathAddress;
use crate::core::value::Value;

/// A structured operation request: the operation name, the absolute
/// address it targets, and free-form parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationRequest {
    /// The operation name, e.g. `add`, `remove`, `write-attribute`.
    pub operation: String,
    /// The absolute address of the resource the operation targets.
    #[serde(default)]
    pub address: PathAddress,
    /// Operation parameters.
    #[serde(default)]
    pub params: Value,
}

impl OperationRequest {
    /// Create a request with no parameters.
    pub fn new(operation: impl Into<String>, address: PathAddress) -> Self {
        Self {
            operation: operation.into(),
            address,
            params: Value::Undefined,
        }
    }

    /// Attach parameters.
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Look up one parameter by name.
    pub fn param(&self, name: &str) -> Option<&Value> {
        self.params.get(name)
    }
}

/// The business logic of one step.
///
/// Implemented directly for closures of the matching shape, so simple
/// steps need no named type:
///
/// ```ignore
/// controller.execute(request, |ctx: &mut OperationContext, op: &OperationRequest| {
///     ctx.read_resource_for_update(&PathAddress::root())?
///         .set_attribute("enabled", Value::Boolean(true));
///     Ok(())
/// })?;
/// ```
pub trait StepHandler: Send + Sync {
    /// Run this step against the operation context.
    fn execute(
        &self,
        context: &mut OperationContext<'_>,
        operation: &OperationRequest,
    ) -> Result<(), OperationError>;
}

impl<F> StepHandler for F
where
    F: Fn(&mut OperationContext<'_>, &OperationRequest) -> Result<(), OperationError>
        + Send
        + Sync,
{
    fn execute(
        &self,
        context: &mut OperationContext<'_>,
        operation: &OperationRequest,
    ) -> Result<(), OperationError> {
        self(context, operation)
    }
}

impl<T: StepHandler + ?Sized> StepHandler for Arc<T> {
    fn execute(
        &self,
        context: &mut OperationContext<'_>,
        operation: &OperationRequest,
    ) -> Result<(), OperationError> {
        (**self).execute(context, operation)
    }
}

/// Callback fired when the operation rolls back, receiving the original
/// request of the step that registered it.
pub type RollbackHandler =
    Box<dyn FnOnce(&mut OperationContext<'_>, &OperationRequest) + Send>;

/// Callback fired when the terminal result is known.
pub type ResultHandler =
    Box<dyn FnOnce(ResultAction, &mut OperationContext<'_>, &OperationRequest) + Send>;

/// A queued step: handler, request, stage, and response slot.
pub(crate) struct Step {
    pub(crate) handler: Arc<dyn StepHandler>,
    pub(crate) request: Arc<OperationRequest>,
    pub(crate) stage: Stage,
    pub(crate) response_idx: usize,
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("operation", &self.request.operation)
            .field("address", &self.request.address)
            .field("stage", &self.stage)
            .field("response_idx", &self.response_idx)
            .finish()
    }
}
