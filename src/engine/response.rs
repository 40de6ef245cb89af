//! engine::response
//!
//! The structured response every operation yields.
//!
//! # Shape
//!
//! ```json
//! {
//!   "outcome": "success",
//!   "result": { ... },
//!   "failure_description": null,
//!   "response_headers": { "operation-requires-reload": true },
//!   "member_results": {}
//! }
//! ```
//!
//! `member_results` is populated only on domain-coordinator processes,
//! holding per-member responses of the propagated operation.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::core::value::Value;

/// Header set when the operation leaves a reload requirement behind.
pub const HEADER_REQUIRES_RELOAD: &str = "operation-requires-reload";
/// Header set when the operation leaves a restart requirement behind.
pub const HEADER_REQUIRES_RESTART: &str = "operation-requires-restart";
/// Header set when the operation was rolled back.
pub const HEADER_ROLLED_BACK: &str = "rolled-back";
/// Header set when a handler skipped a runtime update it would normally
/// perform.
pub const HEADER_RUNTIME_UPDATE_SKIPPED: &str = "runtime-update-skipped";
/// Header carrying messages reported to the client during execution.
pub const HEADER_MESSAGES: &str = "messages";

/// Terminal outcome of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The operation committed.
    Success,
    /// The operation failed and was rolled back.
    Failed,
}

/// The structured response of one operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Terminal outcome.
    pub outcome: Outcome,
    /// Result payload produced by the operation's steps.
    pub result: Value,
    /// Description of the failure, for failed operations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_description: Option<String>,
    /// Response headers such as restart requirements.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub response_headers: BTreeMap<String, Value>,
    /// Per-member results; only populated on a domain coordinator.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub member_results: BTreeMap<String, Value>,
}

impl OperationResponse {
    /// Whether the operation committed.
    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }

    /// Read one response header.
    pub fn header(&self, name: &str) -> Option<&Value> {
        self.response_headers.get(name)
    }

    /// Whether a boolean header is present and true.
    pub fn header_flag(&self, name: &str) -> bool {
        self.header(name).and_then(Value::as_bool).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn success() -> OperationResponse {
        OperationResponse {
            outcome: Outcome::Success,
            result: Value::Undefined,
            failure_description: None,
            response_headers: BTreeMap::new(),
            member_results: BTreeMap::new(),
        }
    }

    #[test]
    fn success_flags() {
        let resp = success();
        assert!(resp.is_success());
        assert!(!resp.header_flag(HEADER_REQUIRES_RELOAD));
    }

    #[test]
    fn header_lookup() {
        let mut resp = success();
        resp.response_headers
            .insert(HEADER_REQUIRES_RELOAD.into(), Value::Boolean(true));
        assert!(resp.header_flag(HEADER_REQUIRES_RELOAD));
        assert!(resp.header(HEADER_REQUIRES_RESTART).is_none());
    }

    #[test]
    fn serde_skips_empty_sections() {
        let resp = success();
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("failure_description"));
        assert!(!json.contains("response_headers"));
        assert!(!json.contains("member_results"));

        let back: OperationResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
    }

    #[test]
    fn failed_response_round_trips() {
        let mut resp = success();
        resp.outcome = Outcome::Failed;
        resp.failure_description = Some("duplicate resource at /queue=orders".into());
        resp.response_headers
            .insert(HEADER_ROLLED_BACK.into(), Value::Boolean(true));

        let json = serde_json::to_string(&resp).unwrap();
        let back: OperationResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(back, resp);
        assert!(!back.is_success());
    }
}
