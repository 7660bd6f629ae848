//! Approval coordinator
//!
//! Bridges an async tool call to an out-of-band human decision. The tool
//! side parks on a oneshot receiver; the frontend side delivers a response
//! message that gets correlated back by approval id. At most one approval
//! round is in flight at a time.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use super::messages::{ApprovalDecision, ApprovalRequestMessage, ApprovalResponseMessage, ApprovalTarget};
use crate::error::{ExecError, Result};

/// Default wait before an unanswered request times out.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(300);

struct PendingApproval {
    approval_id: String,
    response_tx: oneshot::Sender<HashMap<String, ApprovalDecision>>,
}

/// Single-slot coordinator between tool calls and a human frontend.
///
/// Outbound requests go through the channel handed to [`new`](Self::new);
/// inbound responses arrive via [`handle_response`](Self::handle_response),
/// typically from the application's frontend message loop.
pub struct ApprovalCoordinator {
    pending: Mutex<Option<PendingApproval>>,
    timeout: Mutex<Duration>,
    outbound: mpsc::UnboundedSender<ApprovalRequestMessage>,
}

impl ApprovalCoordinator {
    /// Build a coordinator that emits requests on `outbound`.
    #[must_use]
    pub fn new(outbound: mpsc::UnboundedSender<ApprovalRequestMessage>) -> Self {
        Self {
            pending: Mutex::new(None),
            timeout: Mutex::new(DEFAULT_APPROVAL_TIMEOUT),
            outbound,
        }
    }

    /// Override the approval timeout for subsequent requests.
    pub fn set_timeout(&self, timeout: Duration) {
        *self.timeout.lock() = timeout;
    }

    /// Send an approval round and wait for the human's decisions.
    ///
    /// # Errors
    /// Returns [`ExecError::ApprovalBusy`] if a round is already in flight,
    /// [`ExecError::ApprovalChannel`] if the frontend is gone, and
    /// [`ExecError::ApprovalTimeout`] if no response arrives in time. In the
    /// timeout case the pending slot is cleared so later requests proceed.
    pub async fn request_approval(
        &self,
        targets: Vec<ApprovalTarget>,
    ) -> Result<HashMap<String, ApprovalDecision>> {
        let approval_id = Uuid::new_v4().to_string();
        let (response_tx, response_rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                return Err(ExecError::ApprovalBusy);
            }
            *pending = Some(PendingApproval {
                approval_id: approval_id.clone(),
                response_tx,
            });
        }

        let request = ApprovalRequestMessage {
            approval_id: approval_id.clone(),
            targets,
        };
        if self.outbound.send(request).is_err() {
            self.clear_if(&approval_id);
            return Err(ExecError::approval_channel("frontend channel closed"));
        }

        let timeout = *self.timeout.lock();
        log::debug!("approval {approval_id} sent, waiting up to {timeout:?}");
        match tokio::time::timeout(timeout, response_rx).await {
            Ok(Ok(results)) => Ok(results),
            Ok(Err(_)) => {
                // Sender dropped without a send: the slot was taken by a
                // response path that died, nothing left to clear.
                self.clear_if(&approval_id);
                Err(ExecError::approval_channel("response channel dropped"))
            }
            Err(_) => {
                self.clear_if(&approval_id);
                log::warn!("approval {approval_id} timed out after {timeout:?}");
                Err(ExecError::ApprovalTimeout(timeout))
            }
        }
    }

    /// Deliver a frontend response.
    ///
    /// The pending slot is cleared before the waiter is woken, so a new
    /// request can start the moment the old one resolves. Responses with a
    /// stale or unknown approval id are logged and dropped.
    pub fn handle_response(
        &self,
        approval_id: &str,
        results: HashMap<String, ApprovalDecision>,
    ) {
        let pending = {
            let mut slot = self.pending.lock();
            match slot.as_ref() {
                Some(p) if p.approval_id == approval_id => slot.take(),
                Some(p) => {
                    log::warn!(
                        "stale approval response {approval_id}, expected {}",
                        p.approval_id
                    );
                    None
                }
                None => {
                    log::warn!("approval response {approval_id} with nothing pending");
                    None
                }
            }
        };
        if let Some(p) = pending {
            // The waiter may have timed out already; a failed send is fine.
            let _ = p.response_tx.send(results);
        }
    }

    /// Convenience wrapper over [`handle_response`](Self::handle_response)
    /// for a complete wire message.
    pub fn handle_response_message(&self, msg: ApprovalResponseMessage) {
        self.handle_response(&msg.approval_id, msg.results);
    }

    /// Whether an approval round is currently in flight.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.pending.lock().is_some()
    }

    fn clear_if(&self, approval_id: &str) {
        let mut slot = self.pending.lock();
        if slot.as_ref().is_some_and(|p| p.approval_id == approval_id) {
            *slot = None;
        }
    }
}
