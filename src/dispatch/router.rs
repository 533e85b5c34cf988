//! Response routing back to the originating caller.
//!
//! Each synchronous work item carries its own one-shot correlation channel;
//! there is no shared result channel a different caller could drain.

use tokio::sync::oneshot;

use crate::dispatch::types::{DispatchError, ForwardOutcome};

/// Where the outcome of a work item goes.
#[derive(Debug)]
pub enum Reply {
    /// A caller is waiting on the other end of this channel.
    Waiting(oneshot::Sender<ForwardOutcome>),
    /// Fire-and-forget: the caller was answered at admission.
    Detached,
}

/// What happened to an outcome handed to [`Reply::deliver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Discarded,
    /// The caller stopped waiting (disconnect or inbound timeout).
    CallerGone,
}

impl Reply {
    /// Create a correlation channel for a synchronous caller.
    pub fn channel() -> (Reply, Ticket) {
        let (tx, rx) = oneshot::channel();
        (Reply::Waiting(tx), Ticket::Pending(rx))
    }

    /// Route the single outcome of a work item.
    pub fn deliver(self, request_id: &str, outcome: ForwardOutcome) -> Delivery {
        match self {
            Reply::Waiting(tx) => match tx.send(outcome) {
                Ok(()) => Delivery::Delivered,
                Err(_) => {
                    tracing::warn!(request_id = %request_id, "Caller stopped waiting, dropping result");
                    Delivery::CallerGone
                }
            },
            Reply::Detached => {
                match &outcome {
                    Ok(result) => tracing::debug!(
                        request_id = %request_id,
                        status = %result.status,
                        "Fire-and-forget forward completed"
                    ),
                    Err(e) => tracing::warn!(
                        request_id = %request_id,
                        error = %e,
                        "Fire-and-forget forward failed"
                    ),
                }
                Delivery::Discarded
            }
        }
    }
}

/// The caller's end of a submission.
#[derive(Debug)]
pub enum Ticket {
    Pending(oneshot::Receiver<ForwardOutcome>),
    Detached,
}

impl Ticket {
    /// Wait for the outcome. A detached ticket resolves to `None` at once.
    pub async fn outcome(self) -> Result<Option<ForwardOutcome>, DispatchError> {
        match self {
            Ticket::Pending(rx) => rx.await.map(Some).map_err(|_| DispatchError::WorkerGone),
            Ticket::Detached => Ok(None),
        }
    }

    pub fn is_detached(&self) -> bool {
        matches!(self, Ticket::Detached)
    }
}
