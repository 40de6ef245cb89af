//! engine::stage
//!
//! The fixed, ordered sequence of stages an operation moves through.
//!
//! # Ordering
//!
//! ```text
//! Model -> Runtime -> Verify -> Domain -> Done
//! ```
//!
//! Configuration work happens in `Model`, live-service work in `Runtime`,
//! post-mutation consistency checks in `Verify`, and cross-process
//! propagation in `Domain` (legal only on a domain coordinator). Steps may
//! be queued for the current stage or any later one, never an earlier one:
//! once runtime mutation has begun, the configuration model is frozen for
//! this operation.

use serde::{Deserialize, Serialize};

/// The stage at which a step runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    /// The step reads or writes the configuration model.
    Model,
    /// The step reads or writes the runtime service container.
    Runtime,
    /// The step inspects the runtime for inconsistencies introduced by
    /// `Runtime` work. Read-only.
    Verify,
    /// The step propagates the operation to other processes. Only legal on
    /// a domain coordinator.
    Domain,
    /// Terminal pseudo-stage; no steps run here.
    Done,
}

impl Stage {
    /// All stages that can hold queued steps, in execution order.
    pub const RUNNABLE: [Stage; 4] = [Stage::Model, Stage::Runtime, Stage::Verify, Stage::Domain];

    /// Whether a later stage exists.
    pub fn has_next(self) -> bool {
        self != Stage::Done
    }

    /// The next stage in the fixed order. `Done` has no successor.
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Model => Some(Stage::Runtime),
            Stage::Runtime => Some(Stage::Verify),
            Stage::Verify => Some(Stage::Domain),
            Stage::Domain => Some(Stage::Done),
            Stage::Done => None,
        }
    }

    /// Index into per-stage queue storage. `Done` holds no queue.
    pub(crate) fn queue_index(self) -> Option<usize> {
        match self {
            Stage::Model => Some(0),
            Stage::Runtime => Some(1),
            Stage::Verify => Some(2),
            Stage::Domain => Some(3),
            Stage::Done => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Model => "model",
            Stage::Runtime => "runtime",
            Stage::Verify => "verify",
            Stage::Domain => "domain",
            Stage::Done => "done",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_order() {
        assert_eq!(Stage::Model.next(), Some(Stage::Runtime));
        assert_eq!(Stage::Runtime.next(), Some(Stage::Verify));
        assert_eq!(Stage::Verify.next(), Some(Stage::Domain));
        assert_eq!(Stage::Domain.next(), Some(Stage::Done));
        assert_eq!(Stage::Done.next(), None);
    }

    #[test]
    fn ordering_matches_execution_order() {
        assert!(Stage::Model < Stage::Runtime);
        assert!(Stage::Runtime < Stage::Verify);
        assert!(Stage::Verify < Stage::Domain);
        assert!(Stage::Domain < Stage::Done);
    }

    #[test]
    fn done_is_terminal() {
        assert!(!Stage::Done.has_next());
        assert!(Stage::Done.queue_index().is_none());
        for stage in Stage::RUNNABLE {
            assert!(stage.has_next());
            assert!(stage.queue_index().is_some());
        }
    }

    #[test]
    fn display_names() {
        assert_eq!(Stage::Model.to_string(), "model");
        assert_eq!(Stage::Done.to_string(), "done");
    }
}
