//! engine::authorize
//!
//! The authorization collaborator.
//!
//! # Architecture
//!
//! Before a step mutates configuration or runtime state it consults the
//! [`Authorizer`] with the operation, optionally a specific attribute and
//! its current value, and the set of effects the step is about to have.
//! The policy engine behind the trait is external; this crate ships only
//! the contract and a permit-all default.
//!
//! A denial is a modeled failure: the engine records the reason as the
//! operation's failure description and rolls back, which also prevents
//! any not-yet-started `Runtime`/`Verify`/`Domain` step from running.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::step::OperationRequest;
use crate::core::value::Value;

/// One effect an operation may have, used to scope authorization checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionEffect {
    /// Discover that the target resource exists at all.
    Address,
    /// Read configuration state.
    ReadConfig,
    /// Write configuration state.
    WriteConfig,
    /// Read runtime state.
    ReadRuntime,
    /// Write runtime state.
    WriteRuntime,
}

/// A set of effects. Empty means "all effects of the operation".
pub type EffectSet = BTreeSet<ActionEffect>;

/// The outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    /// The caller may proceed.
    Permit,
    /// The caller may not proceed.
    Deny {
        /// Why the check failed; becomes the operation's failure
        /// description.
        reason: String,
    },
}

impl AuthorizationDecision {
    /// Whether the decision permits the action.
    pub fn is_permitted(&self) -> bool {
        matches!(self, AuthorizationDecision::Permit)
    }

    /// The denial reason, if denied.
    pub fn denial_reason(&self) -> Option<&str> {
        match self {
            AuthorizationDecision::Permit => None,
            AuthorizationDecision::Deny { reason } => Some(reason),
        }
    }
}

/// The authorization policy collaborator.
pub trait Authorizer: Send + Sync {
    /// Check whether `operation` may proceed with the given effects,
    /// optionally narrowed to one attribute and its current value.
    fn authorize(
        &self,
        operation: &OperationRequest,
        attribute: Option<&str>,
        current_value: Option<&Value>,
        effects: &EffectSet,
    ) -> AuthorizationDecision;
}

/// Default policy: everything is permitted.
#[derive(Debug, Default, Clone, Copy)]
pub struct PermitAll;

impl Authorizer for PermitAll {
    fn authorize(
        &self,
        _operation: &OperationRequest,
        _attribute: Option<&str>,
        _current_value: Option<&Value>,
        _effects: &EffectSet,
    ) -> AuthorizationDecision {
        AuthorizationDecision::Permit
    }
}
