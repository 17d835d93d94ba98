use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::DeliveryError;
use crate::models::OutboundMessage;

/// What the socket writer task is asked to send next.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Message(OutboundMessage),
    /// Transport-level ping; a pong (or an app-level ping) clears the miss count.
    Probe,
}

/// Cheap, cloneable handle to one live duplex connection.
///
/// Every push is a non-blocking enqueue into a bounded channel drained by the
/// socket's writer task, so a slow peer can never stall the caller. Closing
/// goes through a separate token and never waits behind queued data.
#[derive(Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    sender: mpsc::Sender<Outbound>,
    closed: CancellationToken,
    missed_probes: Arc<AtomicU8>,
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("missed_probes", &self.missed_probes())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl ConnectionHandle {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<Outbound>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        let handle = Self {
            id: Uuid::new_v4(),
            sender,
            closed: CancellationToken::new(),
            missed_probes: Arc::new(AtomicU8::new(0)),
        };
        (handle, receiver)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn push(&self, message: OutboundMessage) -> Result<(), DeliveryError> {
        self.enqueue(Outbound::Message(message))
    }

    /// Send a liveness probe. Counts as missed until the peer answers, even
    /// when the queue is too full to take it.
    pub fn probe(&self) -> Result<(), DeliveryError> {
        self.missed_probes.fetch_add(1, Ordering::AcqRel);
        self.enqueue(Outbound::Probe)
    }

    /// Ask the socket to shut down. Takes effect even when the outbound queue
    /// is full; later pushes fail with `ChannelClosed`.
    pub fn close(&self) {
        self.closed.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Token the socket tasks wait on.
    pub fn close_signal(&self) -> CancellationToken {
        self.closed.clone()
    }

    /// Record an answer from the peer (pong or app-level ping).
    pub fn mark_alive(&self) {
        self.missed_probes.store(0, Ordering::Release);
    }

    /// Probes sent since the peer last answered.
    pub fn missed_probes(&self) -> u8 {
        self.missed_probes.load(Ordering::Acquire)
    }

    fn enqueue(&self, item: Outbound) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::ChannelClosed);
        }
        self.sender.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::Backpressure,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::ChannelClosed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MessageType;
    use serde_json::json;

    fn message() -> OutboundMessage {
        OutboundMessage::new(MessageType::IssueUpdate, json!({}))
    }

    #[test]
    fn close_lands_while_the_queue_is_full() {
        let (handle, mut rx) = ConnectionHandle::new(1);
        handle.push(message()).unwrap();
        assert_eq!(handle.push(message()), Err(DeliveryError::Backpressure));

        handle.close();
        assert!(handle.is_closed());
        assert!(handle.close_signal().is_cancelled());
        assert_eq!(handle.push(message()), Err(DeliveryError::ChannelClosed));
        // Only the data queued before the close is left.
        assert!(matches!(rx.try_recv(), Ok(Outbound::Message(_))));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn answers_reset_the_miss_count() {
        let (handle, _rx) = ConnectionHandle::new(4);
        handle.probe().unwrap();
        handle.probe().unwrap();
        assert_eq!(handle.missed_probes(), 2);

        handle.mark_alive();
        assert_eq!(handle.missed_probes(), 0);
    }
}
