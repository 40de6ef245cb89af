//! engine::coordinator
//!
//! Commit/rollback finalization for a completed operation.
//!
//! # Architecture
//!
//! Once stepping halts (queues drained, recoverable failure, or terminal
//! error), the coordinator decides the terminal [`ResultAction`] and
//! unwinds the operation:
//!
//! 1. On rollback, discard the working copy of the model
//! 2. Fire registered callbacks in reverse registration order - rollback
//!    handlers only on rollback, result handlers always
//! 3. On commit, swap the controller's committed snapshot to the working
//!    copy (readers observe old-or-new, never a partial state)
//! 4. Settle pending service removals (commit completes them, rollback
//!    abandons them and the services reappear)
//! 5. Synthesize response headers and embed nested step results
//! 6. Release the writer lock
//!
//! # Invariants
//!
//! - Callbacks fire in reverse registration order, exactly once
//! - A panicking rollback callback does not stop the remaining callbacks
//! - The committed snapshot only changes on commit, under the writer lock

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use super::context::{CurrentStep, Notification, OperationContext};
use super::response::{
    OperationResponse, Outcome, HEADER_MESSAGES, HEADER_REQUIRES_RELOAD, HEADER_REQUIRES_RESTART,
    HEADER_ROLLED_BACK,
};
use super::scheduler::panic_message;
use super::OperationError;
use crate::core::value::Value;

/// The terminal result of an operation, handed to result handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultAction {
    /// The operation's changes were committed.
    Keep,
    /// The operation's changes were discarded.
    Rollback,
}

/// What an operation is currently doing, observable via the context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStatus {
    /// Steps are executing.
    Executing,
    /// The terminal result is `Keep`; result handlers are firing.
    Completing,
    /// The terminal result is `Rollback`; rollback and result handlers
    /// are firing.
    RollingBack,
    /// Finalization has finished.
    Done,
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionStatus::Executing => "executing",
            ExecutionStatus::Completing => "completing",
            ExecutionStatus::RollingBack => "rolling-back",
            ExecutionStatus::Done => "done",
        };
        write!(f, "{}", name)
    }
}

/// Finalize the operation: decide the result action, unwind callbacks,
/// commit or discard, and build the response.
///
/// `terminal` carries the error that halted stepping, if any; it is
/// returned to the caller after rollback completes. Recoverable failures
/// are already recorded on the context and come back as a `Failed`
/// response instead.
pub(crate) fn finalize(
    ctx: &mut OperationContext<'_>,
    terminal: Option<OperationError>,
) -> Result<OperationResponse, OperationError> {
    if let Some(err) = &terminal {
        ctx.rollback_only = true;
        if ctx.failure.is_none() {
            ctx.failure = Some(err.to_string());
        }
    }

    let action = if ctx.rollback_only {
        ResultAction::Rollback
    } else {
        ResultAction::Keep
    };
    ctx.status = match action {
        ResultAction::Keep => ExecutionStatus::Completing,
        ResultAction::Rollback => ExecutionStatus::RollingBack,
    };
    debug!(operation = %ctx.id, action = ?action, "finalizing operation");

    if action == ResultAction::Rollback {
        ctx.working_root = Arc::clone(&ctx.original_root);
        ctx.model_affected = false;
    }

    drain_notifications(ctx, action);

    if action == ResultAction::Keep && ctx.model_affected {
        ctx.controller.commit(Arc::clone(&ctx.working_root));
        info!(operation = %ctx.id, "model changes committed");
    }
    if ctx.runtime_affected {
        ctx.controller.services().settle(ctx.id, action);
    }

    synthesize_headers(ctx, action);
    embed_nested_results(ctx);

    let response = OperationResponse {
        outcome: if action == ResultAction::Keep && ctx.failure.is_none() {
            Outcome::Success
        } else {
            Outcome::Failed
        },
        result: std::mem::take(&mut ctx.responses[0].result),
        failure_description: ctx.failure.clone(),
        response_headers: std::mem::take(&mut ctx.response_headers),
        member_results: std::mem::take(&mut ctx.member_results),
    };

    ctx.status = ExecutionStatus::Done;
    ctx.guard = None;

    match terminal {
        Some(err) => Err(err),
        None => Ok(response),
    }
}

/// Fire the registered callbacks in reverse registration order. Each runs
/// with the registering step's request and response slot current, so it
/// can use the same context facilities the step itself could.
fn drain_notifications(ctx: &mut OperationContext<'_>, action: ResultAction) {
    let notifications = std::mem::take(&mut ctx.notifications);
    for notification in notifications.into_iter().rev() {
        match notification {
            Notification::Rollback {
                request,
                stage,
                response_idx,
                handler,
            } => {
                if action != ResultAction::Rollback {
                    continue;
                }
                ctx.current = Some(CurrentStep {
                    request: Arc::clone(&request),
                    response_idx,
                    stage,
                });
                let outcome = catch_unwind(AssertUnwindSafe(|| handler(&mut *ctx, &request)));
                if let Err(payload) = outcome {
                    // A broken rollback callback must not strand the rest
                    // of the unwind.
                    error!(
                        operation = %ctx.id,
                        step_operation = %request.operation,
                        message = panic_message(payload.as_ref()),
                        "rollback handler panicked"
                    );
                }
            }
            Notification::Result {
                request,
                stage,
                response_idx,
                handler,
            } => {
                ctx.current = Some(CurrentStep {
                    request: Arc::clone(&request),
                    response_idx,
                    stage,
                });
                let outcome =
                    catch_unwind(AssertUnwindSafe(|| handler(action, &mut *ctx, &request)));
                if let Err(payload) = outcome {
                    error!(
                        operation = %ctx.id,
                        step_operation = %request.operation,
                        message = panic_message(payload.as_ref()),
                        "result handler panicked"
                    );
                }
            }
        }
    }
    ctx.current = None;
}

fn synthesize_headers(ctx: &mut OperationContext<'_>, action: ResultAction) {
    if ctx.reload_count > 0 {
        ctx.response_headers
            .insert(HEADER_REQUIRES_RELOAD.into(), Value::Boolean(true));
    }
    if ctx.restart_count > 0 {
        ctx.response_headers
            .insert(HEADER_REQUIRES_RESTART.into(), Value::Boolean(true));
    }
    if action == ResultAction::Rollback {
        ctx.response_headers
            .insert(HEADER_ROLLED_BACK.into(), Value::Boolean(true));
    }
    if !ctx.messages.is_empty() {
        let messages = ctx
            .messages
            .iter()
            .map(|(severity, message)| {
                Value::object([
                    ("severity", Value::from(severity.as_str())),
                    ("message", Value::String(message.clone())),
                ])
            })
            .collect();
        ctx.response_headers
            .insert(HEADER_MESSAGES.into(), Value::List(messages));
    }
}

/// Move each nested response into its parent's result under the key it
/// was registered with. Slots are appended in creation order, so walking
/// from the back settles grandchildren before their parents.
fn embed_nested_results(ctx: &mut OperationContext<'_>) {
    for idx in (1..ctx.responses.len()).rev() {
        if let Some((parent_idx, key)) = ctx.responses[idx].embed.take() {
            let nested = std::mem::take(&mut ctx.responses[idx].result);
            if nested.is_defined() {
                ctx.responses[parent_idx].result.insert(key, nested);
            }
        }
    }
}
