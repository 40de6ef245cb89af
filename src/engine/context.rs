//! engine::context
//!
//! The operation context facade.
//!
//! # Architecture
//!
//! The context is the single object every step handler sees. It composes
//! the per-operation state (working copy of the resource tree, step
//! queues, attachment store, registered callbacks, restart marks) with
//! pass-through access to the process-wide collaborators owned by the
//! [`ModelController`](super::controller::ModelController): the writer
//! lock, the service container, the authorizer, and the expression
//! resolver.
//!
//! # Locking Discipline
//!
//! The writer lock is acquired implicitly by the first mutating call the
//! operation makes (`read_resource_for_update`, `create_resource`,
//! `install_service`, ...) or explicitly via
//! [`OperationContext::acquire_controller_lock`], and is held until the
//! operation finalizes. Reads never take the lock; they see this
//! operation's working copy, which starts as the committed snapshot.
//!
//! # Invariants
//!
//! - Context methods are only called while one of the operation's steps
//!   (or its registered callbacks) is on the call stack
//! - Model mutation is legal only from `Model`-stage steps; service
//!   mutation only from `Runtime`-stage steps
//! - Every address argument is relative to the executing step's address;
//!   the `*_from_root` variants are relative to the model root

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::attachments::{AttachmentKey, Attachments};
use super::authorize::{AuthorizationDecision, EffectSet};
use super::controller::{ModelController, ProcessKind};
use super::coordinator::ExecutionStatus;
use super::lock::WriteLockGuard;
use super::response::HEADER_RUNTIME_UPDATE_SKIPPED;
use super::services::ServiceName;
use super::stage::Stage;
use super::step::{OperationRequest, ResultHandler, RollbackHandler, Step, StepHandler};
use super::{OperationError, OperationId};
use crate::core::address::PathAddress;
use crate::core::resource::Resource;
use crate::core::value::Value;

static NEXT_OWNER_TOKEN: AtomicU64 = AtomicU64::new(1);

/// Opaque identity for restart-mark ownership.
///
/// Marking a resource as restarted hands the mark to an owner token; only
/// the same token can later revert the mark. Tokens are plain ids, not
/// object identities, so ownership survives cloning and thread hops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerToken(u64);

impl OwnerToken {
    /// Create a token with a fresh identity.
    pub fn unique() -> Self {
        Self(NEXT_OWNER_TOKEN.fetch_add(1, Ordering::Relaxed))
    }
}

/// Severity of a message reported to the client during execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MessageSeverity {
    /// The operation is endangered.
    Error,
    /// Something is off but the operation proceeds.
    Warn,
    /// Informational.
    Info,
}

impl MessageSeverity {
    /// The wire name of this severity.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageSeverity::Error => "error",
            MessageSeverity::Warn => "warn",
            MessageSeverity::Info => "info",
        }
    }
}

/// One step's response slot.
#[derive(Debug)]
pub(crate) struct StepResponse {
    pub(crate) result: Value,
    pub(crate) failure: Option<String>,
    /// `(parent slot, key)` for nested steps whose output is embedded
    /// under a key of the parent's result instead of merged into it.
    pub(crate) embed: Option<(usize, String)>,
}

impl StepResponse {
    fn main() -> Self {
        Self {
            result: Value::Undefined,
            failure: None,
            embed: None,
        }
    }
}

/// The step (or callback) currently on the call stack.
#[derive(Debug, Clone)]
pub(crate) struct CurrentStep {
    pub(crate) request: Arc<OperationRequest>,
    pub(crate) response_idx: usize,
    pub(crate) stage: Stage,
}

/// A callback registered by a completed step, fired at finalization in
/// reverse registration order.
pub(crate) enum Notification {
    Rollback {
        request: Arc<OperationRequest>,
        stage: Stage,
        response_idx: usize,
        handler: RollbackHandler,
    },
    Result {
        request: Arc<OperationRequest>,
        stage: Stage,
        response_idx: usize,
        handler: ResultHandler,
    },
}

/// The context for an operation's step execution.
pub struct OperationContext<'a> {
    pub(crate) controller: &'a ModelController,
    pub(crate) id: OperationId,
    pub(crate) working_root: Arc<Resource>,
    pub(crate) original_root: Arc<Resource>,
    pub(crate) queues: [VecDeque<Step>; 4],
    pub(crate) current_stage: Stage,
    pub(crate) current: Option<CurrentStep>,
    pub(crate) responses: Vec<StepResponse>,
    pub(crate) response_headers: BTreeMap<String, Value>,
    pub(crate) member_results: BTreeMap<String, Value>,
    pub(crate) attachments: Attachments,
    pub(crate) notifications: Vec<Notification>,
    pub(crate) rollback_only: bool,
    pub(crate) failure: Option<String>,
    pub(crate) status: ExecutionStatus,
    pub(crate) guard: Option<WriteLockGuard<'a>>,
    pub(crate) model_affected: bool,
    pub(crate) runtime_affected: bool,
    pub(crate) reload_count: u32,
    pub(crate) restart_count: u32,
    pub(crate) restart_marks: HashMap<PathAddress, OwnerToken>,
    pub(crate) messages: Vec<(MessageSeverity, String)>,
}

impl<'a> OperationContext<'a> {
    /// Create a context seeded with one initial `Model`-stage step.
    pub(crate) fn new(
        controller: &'a ModelController,
        request: OperationRequest,
        handler: Arc<dyn StepHandler>,
    ) -> Self {
        let root = controller.committed_root();
        let mut ctx = Self {
            controller,
            id: OperationId::new(),
            working_root: Arc::clone(&root),
            original_root: root,
            queues: Default::default(),
            current_stage: Stage::Model,
            current: None,
            responses: vec![StepResponse::main()],
            response_headers: BTreeMap::new(),
            member_results: BTreeMap::new(),
            attachments: Attachments::new(),
            notifications: Vec::new(),
            rollback_only: false,
            failure: None,
            status: ExecutionStatus::Executing,
            guard: None,
            model_affected: false,
            runtime_affected: false,
            reload_count: 0,
            restart_count: 0,
            restart_marks: HashMap::new(),
            messages: Vec::new(),
        };
        ctx.queues[0].push_back(Step {
            handler,
            request: Arc::new(request),
            stage: Stage::Model,
            response_idx: 0,
        });
        ctx
    }

    fn current(&self) -> &CurrentStep {
        // Public context methods are reachable only from a handler or a
        // registered callback, both of which run with `current` set.
        self.current
            .as_ref()
            .expect("context used while no step is executing")
    }

    // ---- identity and introspection ----

    /// The id of this operation.
    pub fn operation_id(&self) -> OperationId {
        self.id
    }

    /// The stage currently executing.
    pub fn current_stage(&self) -> Stage {
        self.current_stage
    }

    /// What kind of process this controller serves.
    pub fn process_kind(&self) -> ProcessKind {
        self.controller.process_kind()
    }

    /// Whether the controller is replaying boot operations.
    pub fn is_booting(&self) -> bool {
        self.controller.config().booting
    }

    /// Whether the working copy of the model has diverged from the
    /// committed snapshot.
    pub fn is_model_affected(&self) -> bool {
        self.model_affected
    }

    /// Whether this operation has touched the service registry.
    pub fn is_runtime_affected(&self) -> bool {
        self.runtime_affected
    }

    /// The current activity of the operation.
    pub fn execution_status(&self) -> ExecutionStatus {
        self.status
    }

    /// Whether a `Runtime`/`Verify` failure rolls the operation back.
    pub fn is_rollback_on_runtime_failure(&self) -> bool {
        self.controller.config().rollback_on_runtime_failure
    }

    /// Whether `Runtime` steps may restart or remove live services to make
    /// the operation take effect. When this is false, handlers should mark
    /// [`OperationContext::reload_required`] /
    /// [`OperationContext::restart_required`] instead.
    pub fn is_resource_service_restart_allowed(&self) -> bool {
        self.controller.config().restart_allowed
    }

    // ---- step insertion ----

    fn validate_stage(&self, stage: Stage) -> Result<(), OperationError> {
        if stage == Stage::Done || stage < self.current_stage {
            return Err(OperationError::InvalidStage {
                requested: stage,
                current: self.current_stage,
            });
        }
        if stage == Stage::Domain && !self.controller.process_kind().is_coordinator() {
            return Err(OperationError::DomainStageUnavailable);
        }
        Ok(())
    }

    fn enqueue(&mut self, step: Step, add_first: bool) {
        let idx = step
            .stage
            .queue_index()
            .expect("validated stage has a queue");
        if add_first {
            self.queues[idx].push_front(step);
        } else {
            self.queues[idx].push_back(step);
        }
    }

    /// Add a step running the current step's request, writing into the
    /// current step's response.
    pub fn add_step<H: StepHandler + 'static>(
        &mut self,
        handler: H,
        stage: Stage,
    ) -> Result<(), OperationError> {
        let current = self.current().clone();
        self.add_step_for_inner(current.request, handler, stage, false, current.response_idx)
    }

    /// Like [`OperationContext::add_step`], but inserted ahead of steps
    /// already queued for the stage.
    pub fn add_step_first<H: StepHandler + 'static>(
        &mut self,
        handler: H,
        stage: Stage,
    ) -> Result<(), OperationError> {
        let current = self.current().clone();
        self.add_step_for_inner(current.request, handler, stage, true, current.response_idx)
    }

    /// Add a step with its own request, writing into the current step's
    /// response.
    pub fn add_step_for<H: StepHandler + 'static>(
        &mut self,
        request: OperationRequest,
        handler: H,
        stage: Stage,
        add_first: bool,
    ) -> Result<(), OperationError> {
        let response_idx = self.current().response_idx;
        self.add_step_for_inner(Arc::new(request), handler, stage, add_first, response_idx)
    }

    /// Add a nested step with its own request and its own response slot.
    /// The sub-step's result is embedded under `key` in the current
    /// step's result at finalization, rather than merged into it.
    pub fn add_step_with_response<H: StepHandler + 'static>(
        &mut self,
        key: impl Into<String>,
        request: OperationRequest,
        handler: H,
        stage: Stage,
        add_first: bool,
    ) -> Result<(), OperationError> {
        self.validate_stage(stage)?;
        let parent_idx = self.current().response_idx;
        let response_idx = self.responses.len();
        self.responses.push(StepResponse {
            result: Value::Undefined,
            failure: None,
            embed: Some((parent_idx, key.into())),
        });
        self.enqueue(
            Step {
                handler: Arc::new(handler),
                request: Arc::new(request),
                stage,
                response_idx,
            },
            add_first,
        );
        Ok(())
    }

    fn add_step_for_inner<H: StepHandler + 'static>(
        &mut self,
        request: Arc<OperationRequest>,
        handler: H,
        stage: Stage,
        add_first: bool,
        response_idx: usize,
    ) -> Result<(), OperationError> {
        self.validate_stage(stage)?;
        self.enqueue(
            Step {
                handler: Arc::new(handler),
                request,
                stage,
                response_idx,
            },
            add_first,
        );
        Ok(())
    }

    // ---- resource access ----

    fn resolve(&self, relative: &PathAddress) -> PathAddress {
        self.current().request.address.join(relative)
    }

    fn require_model_step(&self, what: &str) -> Result<(), OperationError> {
        if self.current().stage != Stage::Model {
            return Err(OperationError::Unsupported(format!(
                "{} is only supported from a model-stage step",
                what
            )));
        }
        Ok(())
    }

    fn require_runtime_step(&self, what: &str) -> Result<(), OperationError> {
        if self.current().stage != Stage::Runtime {
            return Err(OperationError::Unsupported(format!(
                "{} is only supported from a runtime-stage step",
                what
            )));
        }
        Ok(())
    }

    /// Read a resource relative to the executing step's address. Never
    /// blocks; reads from this operation's working copy.
    pub fn read_resource(
        &self,
        relative: &PathAddress,
        recursive: bool,
    ) -> Result<Resource, OperationError> {
        let address = self.resolve(relative);
        self.working_root
            .navigate(&address)
            .map(|r| r.read(recursive))
            .ok_or(OperationError::NoSuchResource(address))
    }

    /// Read a resource relative to the model root. Never blocks.
    pub fn read_resource_from_root(
        &self,
        address: &PathAddress,
        recursive: bool,
    ) -> Result<Resource, OperationError> {
        self.working_root
            .navigate(address)
            .map(|r| r.read(recursive))
            .ok_or_else(|| OperationError::NoSuchResource(address.clone()))
    }

    /// The entire model as it was before this operation made any change.
    pub fn original_root_resource(&self) -> Arc<Resource> {
        Arc::clone(&self.original_root)
    }

    /// Read a resource for mutation, relative to the executing step's
    /// address. Acquires the writer lock if this operation does not hold
    /// it yet, and copies the path from the root to the node so earlier
    /// snapshots stay intact.
    pub fn read_resource_for_update(
        &mut self,
        relative: &PathAddress,
    ) -> Result<&mut Resource, OperationError> {
        self.require_model_step("read-resource-for-update")?;
        self.ensure_lock()?;
        let address = self.resolve(relative);
        self.model_affected = true;
        Resource::navigate_mut(&mut self.working_root, &address).map_err(Into::into)
    }

    /// Create an empty resource relative to the executing step's address.
    pub fn create_resource(
        &mut self,
        relative: &PathAddress,
    ) -> Result<&mut Resource, OperationError> {
        self.require_model_step("create-resource")?;
        self.ensure_lock()?;
        let address = self.resolve(relative);
        self.model_affected = true;
        Resource::create(&mut self.working_root, &address).map_err(Into::into)
    }

    /// Add an existing resource relative to the executing step's address.
    pub fn add_resource(
        &mut self,
        relative: &PathAddress,
        resource: Resource,
    ) -> Result<(), OperationError> {
        self.require_model_step("add-resource")?;
        self.ensure_lock()?;
        let address = self.resolve(relative);
        self.model_affected = true;
        Resource::add(&mut self.working_root, &address, resource).map_err(Into::into)
    }

    /// Remove a resource relative to the executing step's address,
    /// returning the removed subtree.
    pub fn remove_resource(
        &mut self,
        relative: &PathAddress,
    ) -> Result<Arc<Resource>, OperationError> {
        self.require_model_step("remove-resource")?;
        self.ensure_lock()?;
        let address = self.resolve(relative);
        self.model_affected = true;
        Resource::remove(&mut self.working_root, &address).map_err(Into::into)
    }

    /// Acquire the controller's exclusive writer lock without performing
    /// a mutation. Rarely needed: every mutating context call acquires
    /// the lock implicitly.
    pub fn acquire_controller_lock(&mut self) -> Result<(), OperationError> {
        self.ensure_lock()
    }

    fn ensure_lock(&mut self) -> Result<(), OperationError> {
        if self.guard.is_none() {
            let timeout = self.controller.config().lock_timeout;
            debug!(operation = %self.id, "acquiring controller writer lock");
            let guard = self
                .controller
                .write_lock()
                .acquire(timeout)
                .map_err(|_| OperationError::LockTimeout)?;
            self.guard = Some(guard);
            // Another writer may have committed between context creation
            // and this acquisition. No write has happened yet (the lock
            // precedes every mutation), so rebase both snapshots onto the
            // current committed root.
            let root = self.controller.committed_root();
            self.working_root = Arc::clone(&root);
            self.original_root = root;
        }
        Ok(())
    }

    // ---- services ----

    /// Install a service. Only legal from a `Runtime`-stage step. If a
    /// removal of the same name is pending, waits for it per the
    /// container's ordering contract.
    pub fn install_service(
        &mut self,
        name: &ServiceName,
        descriptor: Value,
    ) -> Result<(), OperationError> {
        self.require_runtime_step("install-service")?;
        self.ensure_lock()?;
        self.runtime_affected = true;
        let wait = self.controller.config().service_removal_wait;
        self.controller
            .services()
            .install(self.id, name, descriptor, wait)
            .map_err(Into::into)
    }

    /// Initiate removal of a service. Only legal from a `Runtime`-stage
    /// step. A later install of the same name waits for this removal.
    pub fn remove_service(&mut self, name: &ServiceName) -> Result<(), OperationError> {
        self.require_runtime_step("remove-service")?;
        self.ensure_lock()?;
        self.runtime_affected = true;
        self.controller
            .services()
            .begin_removal(self.id, name)
            .map_err(Into::into)
    }

    /// Remove a service immediately. Intended for rollback handlers of
    /// `Runtime` steps undoing their own install.
    pub fn uninstall_service(&mut self, name: &ServiceName) -> Result<(), OperationError> {
        self.require_runtime_step("uninstall-service")?;
        self.runtime_affected = true;
        self.controller.services().uninstall(name).map_err(Into::into)
    }

    /// Query an installed service's descriptor. Legal from `Runtime` and
    /// `Verify` steps.
    pub fn service_descriptor(&self, name: &ServiceName) -> Result<Option<Value>, OperationError> {
        let stage = self.current().stage;
        if stage != Stage::Runtime && stage != Stage::Verify {
            return Err(OperationError::Unsupported(
                "service queries are only supported from runtime or verify steps".into(),
            ));
        }
        Ok(self.controller.services().descriptor(name))
    }

    // ---- response plumbing ----

    /// The result node of the executing step's response.
    pub fn result_mut(&mut self) -> &mut Value {
        let idx = self.current().response_idx;
        &mut self.responses[idx].result
    }

    /// The operation's failure description, if one has been recorded.
    pub fn failure_description(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// The response headers.
    pub fn response_headers_mut(&mut self) -> &mut BTreeMap<String, Value> {
        &mut self.response_headers
    }

    /// Per-member results of the propagated operation. Only available on
    /// a domain coordinator.
    pub fn member_results_mut(&mut self) -> Result<&mut BTreeMap<String, Value>, OperationError> {
        if !self.controller.process_kind().is_coordinator() {
            return Err(OperationError::Unsupported(
                "member results are only available on a domain coordinator".into(),
            ));
        }
        Ok(&mut self.member_results)
    }

    /// Report a message to the client. Valid only during this operation.
    pub fn report(&mut self, severity: MessageSeverity, message: impl Into<String>) {
        let message = message.into();
        match severity {
            MessageSeverity::Error => warn!(operation = %self.id, %message, "client report"),
            _ => debug!(operation = %self.id, %message, "client report"),
        }
        self.messages.push((severity, message));
    }

    /// Note that a runtime update this handler would normally perform was
    /// skipped because of the process's current state.
    pub fn runtime_update_skipped(&mut self) {
        self.response_headers
            .insert(HEADER_RUNTIME_UPDATE_SKIPPED.into(), Value::Boolean(true));
    }

    // ---- rollback and restart markers ----

    /// Force the terminal result to rollback, regardless of step success.
    /// Idempotent.
    pub fn set_rollback_only(&mut self) {
        if !self.rollback_only {
            debug!(operation = %self.id, "operation marked rollback-only");
        }
        self.rollback_only = true;
    }

    /// Whether the operation is bound to roll back.
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only
    }

    /// Note that the process requires a reload for the running state to
    /// match the configuration. Counted: each call needs a matching
    /// revert before the requirement disappears.
    pub fn reload_required(&mut self) {
        self.reload_count += 1;
    }

    /// Withdraw one prior [`OperationContext::reload_required`] call.
    pub fn revert_reload_required(&mut self) {
        self.reload_count = self.reload_count.saturating_sub(1);
    }

    /// Note that the process must be fully restarted. Counted like
    /// [`OperationContext::reload_required`].
    pub fn restart_required(&mut self) {
        self.restart_count += 1;
    }

    /// Withdraw one prior [`OperationContext::restart_required`] call.
    pub fn revert_restart_required(&mut self) {
        self.restart_count = self.restart_count.saturating_sub(1);
    }

    /// Mark the resource at the absolute `address` as restarted, so a
    /// restart happens once even with multiple independent updaters.
    /// Returns true if this caller acquired the mark and should perform
    /// the restart; false if another owner already holds it.
    pub fn mark_resource_restarted(&mut self, address: &PathAddress, owner: OwnerToken) -> bool {
        if self.restart_marks.contains_key(address) {
            false
        } else {
            self.restart_marks.insert(address.clone(), owner);
            true
        }
    }

    /// Remove a restart mark, provided `owner` is the token that acquired
    /// it. Returns true if the caller owned the mark and should restore
    /// the service by restarting it again.
    pub fn revert_resource_restarted(&mut self, address: &PathAddress, owner: OwnerToken) -> bool {
        match self.restart_marks.get(address) {
            Some(held) if *held == owner => {
                self.restart_marks.remove(address);
                true
            }
            _ => false,
        }
    }

    // ---- attachments ----

    /// Attach a value, returning the previous value for the key, if any.
    pub fn attach<T: Send + 'static>(&mut self, key: AttachmentKey<T>, value: T) -> Option<T> {
        self.attachments.attach(key, value)
    }

    /// Attach a value only if the slot is empty; returns the slot
    /// contents either way.
    pub fn attach_if_absent<T: Send + 'static>(
        &mut self,
        key: AttachmentKey<T>,
        value: T,
    ) -> &mut T {
        self.attachments.attach_if_absent(key, value)
    }

    /// Read an attached value.
    pub fn get_attachment<T: Send + 'static>(&self, key: AttachmentKey<T>) -> Option<&T> {
        self.attachments.get(key)
    }

    /// Read an attached value mutably.
    pub fn get_attachment_mut<T: Send + 'static>(
        &mut self,
        key: AttachmentKey<T>,
    ) -> Option<&mut T> {
        self.attachments.get_mut(key)
    }

    /// Remove and return an attached value.
    pub fn detach<T: Send + 'static>(&mut self, key: AttachmentKey<T>) -> Option<T> {
        self.attachments.detach(key)
    }

    // ---- collaborators ----

    /// Check authorization for the executing step's operation.
    pub fn authorize(
        &self,
        attribute: Option<&str>,
        current_value: Option<&Value>,
        effects: &EffectSet,
    ) -> AuthorizationDecision {
        self.controller.authorizer().authorize(
            &self.current().request,
            attribute,
            current_value,
            effects,
        )
    }

    /// Check authorization, converting a denial into a modeled failure
    /// carrying the denial reason.
    pub fn authorize_or_fail(
        &self,
        attribute: Option<&str>,
        current_value: Option<&Value>,
        effects: &EffectSet,
    ) -> Result<(), OperationError> {
        match self.authorize(attribute, current_value, effects) {
            AuthorizationDecision::Permit => Ok(()),
            AuthorizationDecision::Deny { reason } => Err(OperationError::Failed(reason)),
        }
    }

    /// Resolve any deferred expressions in `value`.
    pub fn resolve_expressions(&self, value: &Value) -> Result<Value, OperationError> {
        self.controller
            .resolver()
            .resolve(value)
            .map_err(Into::into)
    }

    // ---- completion protocol ----

    /// Register a callback fired if the operation rolls back, receiving
    /// this step's original request. Callbacks fire in reverse
    /// registration order and must be idempotent.
    pub fn register_rollback_handler(
        &mut self,
        handler: impl FnOnce(&mut OperationContext<'_>, &OperationRequest) + Send + 'static,
    ) {
        if self.status != ExecutionStatus::Executing {
            warn!(operation = %self.id, "rollback handler registered during finalization; ignored");
            return;
        }
        let current = self.current().clone();
        self.notifications.push(Notification::Rollback {
            request: current.request,
            stage: current.stage,
            response_idx: current.response_idx,
            handler: Box::new(handler),
        });
    }

    /// Register a callback fired when the terminal result is known,
    /// receiving the result action and this step's original request.
    /// Callbacks fire in reverse registration order.
    pub fn register_result_handler(
        &mut self,
        handler: impl FnOnce(super::coordinator::ResultAction, &mut OperationContext<'_>, &OperationRequest)
            + Send
            + 'static,
    ) {
        if self.status != ExecutionStatus::Executing {
            warn!(operation = %self.id, "result handler registered during finalization; ignored");
            return;
        }
        let current = self.current().clone();
        self.notifications.push(Notification::Result {
            request: current.request,
            stage: current.stage,
            response_idx: current.response_idx,
            handler: Box::new(handler),
        });
    }

    /// Record a modeled failure against a response slot and force
    /// rollback per the controller's runtime-failure policy.
    pub(crate) fn record_failure(&mut self, response_idx: usize, description: String) {
        if self.responses[response_idx].failure.is_none() {
            self.responses[response_idx].failure = Some(description.clone());
        }
        if self.failure.is_none() {
            self.failure = Some(description);
        }
        let runtime_failure = self.current_stage > Stage::Model;
        if !runtime_failure || self.controller.config().rollback_on_runtime_failure {
            self.rollback_only = true;
        }
    }
}
