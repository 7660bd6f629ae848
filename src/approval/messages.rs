//! Approval wire messages
//!
//! Serde structures exchanged with the human-facing frontend. The transport
//! is whatever channel the composing application wires up; these types only
//! fix the JSON shape.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One action awaiting a human decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalTarget {
    /// Caller-chosen id, echoed back in the per-target decision map.
    pub id: String,
    /// Tool requesting the action, e.g. `execute_command`.
    pub tool: String,
    /// Human-readable description of what will happen.
    pub details: String,
}

/// Request sent to the frontend: one approval round over a set of targets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequestMessage {
    pub approval_id: String,
    pub targets: Vec<ApprovalTarget>,
}

/// A human decision for a single target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalDecision {
    pub approved: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ApprovalDecision {
    #[must_use]
    pub fn approve() -> Self {
        Self {
            approved: true,
            reason: None,
        }
    }

    #[must_use]
    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            approved: false,
            reason: Some(reason.into()),
        }
    }
}

/// Response from the frontend, keyed by target id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalResponseMessage {
    pub approval_id: String,
    pub results: HashMap<String, ApprovalDecision>,
}
