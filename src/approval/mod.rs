//! Human-in-the-loop approval
//!
//! Dangerous commands pause until a human decides. The coordinator holds one
//! pending round at a time and correlates out-of-band responses back to the
//! waiting tool call.

mod coordinator;
mod messages;

pub use coordinator::{ApprovalCoordinator, DEFAULT_APPROVAL_TIMEOUT};
pub use messages::{
    ApprovalDecision, ApprovalRequestMessage, ApprovalResponseMessage, ApprovalTarget,
};
