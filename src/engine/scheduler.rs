//! engine::scheduler
//!
//! Drives an operation's steps through the stage sequence.
//!
//! # Architecture
//!
//! The scheduler drains the per-stage queues in stage order: all `Model`
//! steps, then `Runtime`, `Verify`, and `Domain`. Within a stage the
//! queue is FIFO, with `add_step_first` insertions going to the front.
//! A stage is left only when its queue is empty; steps a handler adds to
//! the current stage still run in this pass.
//!
//! Two drivers exist. The iterative driver is the default: a flat loop
//! with no stack growth. The recursive driver executes the remainder of
//! the operation inside each step's activation, which keeps every
//! handler's frame alive until the operation is done; it exists for
//! handlers that need work stacked below them on the call stack, and
//! produces the same execution order.
//!
//! # Failure Handling
//!
//! A recoverable handler error is recorded as the operation's failure and
//! halts stepping; finalization then rolls back. A handler panic is a
//! defect: stepping halts and the defect propagates to the caller after
//! rollback. Lock timeouts are likewise terminal.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error};

use super::context::{CurrentStep, OperationContext};
use super::controller::DriverMode;
use super::step::Step;
use super::OperationError;

/// Drive the operation until its queues are empty or it halts. Returns
/// the terminal error, if stepping ended in one.
pub(crate) fn run(ctx: &mut OperationContext<'_>, mode: DriverMode) -> Option<OperationError> {
    match mode {
        DriverMode::Iterative => run_iterative(ctx),
        DriverMode::Recursive => run_recursive(ctx),
    }
}

fn run_iterative(ctx: &mut OperationContext<'_>) -> Option<OperationError> {
    while let Some(step) = next_step(ctx) {
        if let Err(err) = execute_one(ctx, step) {
            return Some(err);
        }
        if ctx.failure.is_some() || ctx.rollback_only {
            return None;
        }
    }
    None
}

fn run_recursive(ctx: &mut OperationContext<'_>) -> Option<OperationError> {
    let step = next_step(ctx)?;
    if let Err(err) = execute_one(ctx, step) {
        return Some(err);
    }
    if ctx.failure.is_some() || ctx.rollback_only {
        return None;
    }
    run_recursive(ctx)
}

/// Pop the next runnable step, advancing the current stage across empty
/// queues. `None` once every queue is drained.
fn next_step(ctx: &mut OperationContext<'_>) -> Option<Step> {
    loop {
        let idx = ctx.current_stage.queue_index()?;
        if let Some(step) = ctx.queues[idx].pop_front() {
            return Some(step);
        }
        let next = ctx.current_stage.next()?;
        debug!(operation = %ctx.id, from = %ctx.current_stage, to = %next, "advancing stage");
        ctx.current_stage = next;
    }
}

fn execute_one(ctx: &mut OperationContext<'_>, step: Step) -> Result<(), OperationError> {
    debug!(
        operation = %ctx.id,
        step_operation = %step.request.operation,
        address = %step.request.address,
        stage = %step.stage,
        "executing step"
    );
    ctx.current = Some(CurrentStep {
        request: Arc::clone(&step.request),
        response_idx: step.response_idx,
        stage: step.stage,
    });

    let handler = step.handler;
    let request = step.request;
    let outcome = catch_unwind(AssertUnwindSafe(|| handler.execute(&mut *ctx, &request)));

    ctx.current = None;
    match outcome {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) if err.is_recoverable() => {
            debug!(operation = %ctx.id, %err, "step failed");
            ctx.record_failure(step.response_idx, err.to_string());
            Ok(())
        }
        Ok(Err(err)) => Err(err),
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(operation = %ctx.id, message, "step handler panicked");
            Err(OperationError::Defect(message.to_string()))
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "step handler panicked"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_extracts_str_payloads() {
        let payload: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");

        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("kaput"));
        assert_eq!(panic_message(payload.as_ref()), "kaput");

        let payload: Box<dyn std::any::Any + Send> = Box::new(42u8);
        assert_eq!(payload.as_ref().downcast_ref::<u8>(), Some(&42));
        assert_eq!(panic_message(payload.as_ref()), "step handler panicked");
    }
}
