//! engine::controller
//!
//! The process-wide controller owning the committed model and the
//! collaborators every operation shares.
//!
//! # Architecture
//!
//! The controller holds the committed snapshot of the resource tree
//! behind an `RwLock<Arc<Resource>>`: readers clone the `Arc` and walk a
//! frozen tree; a committing operation swaps the pointer under the writer
//! lock. It also owns the writer lock itself, the service container, the
//! authorizer, and the expression resolver, and hands all of them to each
//! operation through its context.
//!
//! # Example
//!
//! ```
//! use stagecraft::core::address::PathAddress;
//! use stagecraft::core::value::Value;
//! use stagecraft::engine::controller::ModelController;
//! use stagecraft::engine::step::{OperationRequest, StepHandler};
//! use stagecraft::engine::OperationError;
//!
//! struct EnableHandler;
//!
//! impl StepHandler for EnableHandler {
//!     fn execute(
//!         &self,
//!         context: &mut stagecraft::engine::context::OperationContext<'_>,
//!         _operation: &OperationRequest,
//!     ) -> Result<(), OperationError> {
//!         context
//!             .read_resource_for_update(&PathAddress::root())?
//!             .set_attribute("enabled", Value::Boolean(true));
//!         Ok(())
//!     }
//! }
//!
//! let controller = ModelController::new();
//! let request = OperationRequest::new("enable", PathAddress::root());
//! let response = controller.execute(request, EnableHandler).unwrap();
//! assert!(response.is_success());
//! assert_eq!(
//!     controller.committed_root().attribute("enabled"),
//!     &Value::Boolean(true)
//! );
//! ```

use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info_span;

use super::authorize::{Authorizer, PermitAll};
use super::context::OperationContext;
use super::coordinator;
use super::lock::WriteLock;
use super::resolver::{EnvResolver, ExpressionResolver};
use super::response::OperationResponse;
use super::scheduler;
use super::services::{InMemoryServiceContainer, ServiceContainer};
use super::step::{OperationRequest, StepHandler};
use super::OperationError;
use crate::core::resource::Resource;

/// What kind of process this controller serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProcessKind {
    /// A standalone server: the `Domain` stage is unavailable.
    #[default]
    Server,
    /// A domain coordinator: operations may queue `Domain` steps and
    /// populate per-member results.
    DomainCoordinator,
}

impl ProcessKind {
    /// Whether this process coordinates a domain.
    pub fn is_coordinator(self) -> bool {
        self == ProcessKind::DomainCoordinator
    }
}

/// How the scheduler drives an operation's steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DriverMode {
    /// A flat loop; no stack growth with step count.
    #[default]
    Iterative,
    /// Each step's frame stays live while the rest of the operation runs.
    Recursive,
}

/// Tunables for a controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// How long an operation waits for the writer lock before failing
    /// with a lock timeout. `None` waits forever.
    pub lock_timeout: Option<Duration>,
    /// How long an install waits for a pending same-name removal by
    /// another operation. `None` waits forever.
    pub service_removal_wait: Option<Duration>,
    /// The step driver.
    pub driver: DriverMode,
    /// Whether a `Runtime`/`Verify` failure rolls back the whole
    /// operation. When false, the failure is reported but committed model
    /// changes stand.
    pub rollback_on_runtime_failure: bool,
    /// Whether `Runtime` steps may restart or remove live services to
    /// apply changes. When false, handlers should record reload/restart
    /// requirements instead.
    pub restart_allowed: bool,
    /// Whether the controller is replaying its boot operations.
    pub booting: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Some(Duration::from_secs(30)),
            service_removal_wait: Some(Duration::from_secs(5)),
            driver: DriverMode::Iterative,
            rollback_on_runtime_failure: true,
            restart_allowed: true,
            booting: false,
        }
    }
}

/// The process-wide operation execution engine.
pub struct ModelController {
    committed: RwLock<Arc<Resource>>,
    lock: WriteLock,
    services: Arc<dyn ServiceContainer>,
    authorizer: Arc<dyn Authorizer>,
    resolver: Arc<dyn ExpressionResolver>,
    kind: ProcessKind,
    config: ControllerConfig,
}

impl Default for ModelController {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelController {
    /// Create a server-kind controller with an empty model, permissive
    /// authorization, an empty in-memory service container, and a
    /// property-map resolver with no properties.
    pub fn new() -> Self {
        Self {
            committed: RwLock::new(Arc::new(Resource::new())),
            lock: WriteLock::new(),
            services: Arc::new(InMemoryServiceContainer::new()),
            authorizer: Arc::new(PermitAll),
            resolver: Arc::new(EnvResolver::new()),
            kind: ProcessKind::Server,
            config: ControllerConfig::default(),
        }
    }

    /// Replace the configuration.
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the process kind.
    pub fn with_process_kind(mut self, kind: ProcessKind) -> Self {
        self.kind = kind;
        self
    }

    /// Seed the committed model.
    pub fn with_root(self, root: Resource) -> Self {
        *self
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(root);
        self
    }

    /// Replace the service container collaborator.
    pub fn with_services(mut self, services: Arc<dyn ServiceContainer>) -> Self {
        self.services = services;
        self
    }

    /// Replace the authorization collaborator.
    pub fn with_authorizer(mut self, authorizer: Arc<dyn Authorizer>) -> Self {
        self.authorizer = authorizer;
        self
    }

    /// Replace the expression resolver collaborator.
    pub fn with_resolver(mut self, resolver: Arc<dyn ExpressionResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    /// Execute one operation to completion and return its response.
    ///
    /// The handler seeds the operation's first `Model`-stage step; it may
    /// queue further steps through the context. The call blocks until the
    /// operation commits or rolls back.
    ///
    /// # Errors
    ///
    /// Modeled failures come back as an `Ok` response with a `failed`
    /// outcome. `Err` is reserved for terminal conditions: the writer
    /// lock timing out, or a handler defect (panic).
    pub fn execute<H: StepHandler + 'static>(
        &self,
        request: OperationRequest,
        handler: H,
    ) -> Result<OperationResponse, OperationError> {
        let span = info_span!(
            "operation",
            operation = %request.operation,
            address = %request.address,
        );
        let _entered = span.enter();

        let mut ctx = OperationContext::new(self, request, Arc::new(handler));
        let terminal = scheduler::run(&mut ctx, self.config.driver);
        coordinator::finalize(&mut ctx, terminal)
    }

    /// The committed model snapshot. Cheap; clones an `Arc`.
    pub fn committed_root(&self) -> Arc<Resource> {
        Arc::clone(
            &self
                .committed
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    pub(crate) fn commit(&self, root: Arc<Resource>) {
        *self
            .committed
            .write()
            .unwrap_or_else(PoisonError::into_inner) = root;
    }

    pub(crate) fn write_lock(&self) -> &WriteLock {
        &self.lock
    }

    /// The service container collaborator.
    pub fn services(&self) -> &Arc<dyn ServiceContainer> {
        &self.services
    }

    /// The authorization collaborator.
    pub fn authorizer(&self) -> &Arc<dyn Authorizer> {
        &self.authorizer
    }

    /// The expression resolver collaborator.
    pub fn resolver(&self) -> &Arc<dyn ExpressionResolver> {
        &self.resolver
    }

    /// What kind of process this controller serves.
    pub fn process_kind(&self) -> ProcessKind {
        self.kind
    }

    /// The controller's configuration.
    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }
}

impl std::fmt::Debug for ModelController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelController")
            .field("kind", &self.kind)
            .field("config", &self.config)
            .field("lock_held", &self.lock.is_held())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::address::PathAddress;
    use crate::core::value::Value;
    use crate::engine::response::HEADER_ROLLED_BACK;
    use crate::engine::stage::Stage;

    /// Pin a closure's signature so it resolves as a [`StepHandler`].
    fn step<F>(f: F) -> F
    where
        F: Fn(&mut OperationContext<'_>, &OperationRequest) -> Result<(), OperationError>
            + Send
            + Sync,
    {
        f
    }

    #[test]
    fn empty_operation_succeeds() {
        let controller = ModelController::new();
        let response = controller
            .execute(
                OperationRequest::new("nop", PathAddress::root()),
                step(|_ctx, _op| Ok(())),
            )
            .unwrap();
        assert!(response.is_success());
        assert_eq!(response.result, Value::Undefined);
    }

    #[test]
    fn committed_writes_become_visible() {
        let controller = ModelController::new();
        let response = controller
            .execute(
                OperationRequest::new("enable", PathAddress::root()),
                step(|ctx, _op| {
                    ctx.read_resource_for_update(&PathAddress::root())?
                        .set_attribute("enabled", Value::Boolean(true));
                    Ok(())
                }),
            )
            .unwrap();
        assert!(response.is_success());
        assert_eq!(
            controller.committed_root().attribute("enabled"),
            &Value::Boolean(true)
        );
        assert!(!controller.write_lock().is_held());
    }

    #[test]
    fn failed_operation_leaves_model_untouched() {
        let controller = ModelController::new();
        let response = controller
            .execute(
                OperationRequest::new("half-write", PathAddress::root()),
                step(|ctx, _op| {
                    ctx.read_resource_for_update(&PathAddress::root())?
                        .set_attribute("partial", Value::Boolean(true));
                    Err(OperationError::Failed("validation rejected".into()))
                }),
            )
            .unwrap();
        assert!(!response.is_success());
        assert_eq!(
            response.failure_description.as_deref(),
            Some("validation rejected")
        );
        assert!(response.header_flag(HEADER_ROLLED_BACK));
        assert!(!controller.committed_root().attribute("partial").is_defined());
        assert!(!controller.write_lock().is_held());
    }

    #[test]
    fn lock_timeout_is_a_terminal_error() {
        let controller = ModelController::new().with_config(ControllerConfig {
            lock_timeout: Some(Duration::from_millis(20)),
            ..ControllerConfig::default()
        });
        let _held = controller.write_lock().acquire(None).unwrap();

        let err = controller
            .execute(
                OperationRequest::new("enable", PathAddress::root()),
                step(|ctx, _op| {
                    ctx.read_resource_for_update(&PathAddress::root())?;
                    Ok(())
                }),
            )
            .unwrap_err();
        assert!(matches!(err, OperationError::LockTimeout));
    }

    #[test]
    fn panic_surfaces_as_defect_and_rolls_back() {
        let controller = ModelController::new();
        let err = controller
            .execute(
                OperationRequest::new("broken", PathAddress::root()),
                step(|ctx, _op| {
                    ctx.read_resource_for_update(&PathAddress::root())?
                        .set_attribute("partial", Value::Boolean(true));
                    panic!("handler bug");
                }),
            )
            .unwrap_err();
        assert!(matches!(err, OperationError::Defect(_)));
        assert!(!controller.committed_root().attribute("partial").is_defined());
        assert!(!controller.write_lock().is_held());
    }

    #[test]
    fn domain_stage_requires_coordinator() {
        let controller = ModelController::new();
        let response = controller
            .execute(
                OperationRequest::new("propagate", PathAddress::root()),
                step(|ctx, _op| {
                    ctx.add_step(step(|_ctx, _op| Ok(())), Stage::Domain)?;
                    Ok(())
                }),
            )
            .unwrap();
        assert!(!response.is_success());

        let coordinator = ModelController::new().with_process_kind(ProcessKind::DomainCoordinator);
        let response = coordinator
            .execute(
                OperationRequest::new("propagate", PathAddress::root()),
                step(|ctx, _op| {
                    ctx.add_step(step(|_ctx, _op| Ok(())), Stage::Domain)?;
                    Ok(())
                }),
            )
            .unwrap();
        assert!(response.is_success());
    }

    #[test]
    fn recursive_driver_matches_iterative_order() {
        for driver in [DriverMode::Iterative, DriverMode::Recursive] {
            let controller = ModelController::new().with_config(ControllerConfig {
                driver,
                ..ControllerConfig::default()
            });
            let response = controller
                .execute(
                    OperationRequest::new("trace", PathAddress::root()),
                    step(|ctx, _op| {
                        ctx.add_step(
                            step(|ctx, _op| {
                                let trail = ctx.result_mut();
                                let mut items =
                                    trail.as_list().map(<[Value]>::to_vec).unwrap_or_default();
                                items.push(Value::from("runtime"));
                                *trail = Value::List(items);
                                Ok(())
                            }),
                            Stage::Runtime,
                        )?;
                        let trail = ctx.result_mut();
                        *trail = Value::List(vec![Value::from("model")]);
                        Ok(())
                    }),
                )
                .unwrap();
            assert_eq!(
                response.result,
                Value::List(vec![Value::from("model"), Value::from("runtime")])
            );
        }
    }

    #[test]
    fn config_defaults() {
        let config = ControllerConfig::default();
        assert_eq!(config.driver, DriverMode::Iterative);
        assert!(config.rollback_on_runtime_failure);
        assert!(config.restart_allowed);
        assert!(!config.booting);
    }

    #[test]
    fn config_deserializes_with_partial_fields() {
        let config: ControllerConfig =
            serde_json::from_str(r#"{"driver": "recursive", "booting": true}"#).unwrap();
        assert_eq!(config.driver, DriverMode::Recursive);
        assert!(config.booting);
        assert!(config.rollback_on_runtime_failure);
    }
}
