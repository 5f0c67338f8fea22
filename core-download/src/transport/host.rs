//! Transport driven by a platform transfer service.

use super::{TransferDelegate, TransferRequest, Transport};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::debug;

/// A request waiting for the platform to pick it up, with the delegate the
/// platform reports to.
pub struct PendingTransfer {
    pub request: TransferRequest,
    pub delegate: Arc<dyn TransferDelegate>,
}

impl std::fmt::Debug for PendingTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingTransfer")
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

/// Queues requests for the host, which runs them on its own background
/// transfer service and reports every callback through the delegate.
///
/// This is how transfers survive app suspension on platforms whose OS
/// owns the network session.
#[derive(Default)]
pub struct HostTransport {
    pending: Mutex<Vec<PendingTransfer>>,
    notify: Notify,
}

impl HostTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain every request started since the last call.
    pub fn take_pending(&self) -> Vec<PendingTransfer> {
        std::mem::take(&mut *self.pending.lock())
    }

    /// Wait until at least one request is pending, then drain.
    pub async fn next_pending(&self) -> Vec<PendingTransfer> {
        loop {
            let notified = self.notify.notified();
            let pending = self.take_pending();
            if !pending.is_empty() {
                return pending;
            }
            notified.await;
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }
}

impl Transport for HostTransport {
    fn start(&self, request: TransferRequest, delegate: Arc<dyn TransferDelegate>) {
        debug!(transfer_id = %request.id, "Transfer handed to host");
        self.pending.lock().push(PendingTransfer { request, delegate });
        self.notify.notify_waiters();
    }
}
