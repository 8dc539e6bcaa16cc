//! Sending half of a group

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};

use super::error::SendError;
use super::id::GroupId;

/// A value in flight from a producer to the dispatch task
///
/// The dispatch task answers on `ack` with the number of receivers that
/// accepted the value, or hands the value back if the group closed first.
pub(crate) struct Envelope<T> {
    pub(crate) value: T,
    pub(crate) ack: oneshot::Sender<Result<usize, T>>,
}

/// Handle for publishing into a group
///
/// Every handle returned by [`Group::sender`](super::Group::sender), and every
/// clone of it, feeds the same input. Closing any of them closes the group.
pub struct Sender<T> {
    inbox: mpsc::Sender<Envelope<T>>,
    close: Arc<watch::Sender<bool>>,
    group: GroupId,
    name: Arc<str>,
}

impl<T> Sender<T> {
    pub(super) fn new(
        inbox: mpsc::Sender<Envelope<T>>,
        close: watch::Sender<bool>,
        group: GroupId,
        name: Arc<str>,
    ) -> Self {
        Self {
            inbox,
            close: Arc::new(close),
            group,
            name,
        }
    }

    /// Publish a value to every registered receiver
    ///
    /// Resolves once the dispatch task has offered the value to all receivers,
    /// with the number that accepted it. Receivers with a full buffer silently
    /// miss the value; that is not an error.
    ///
    /// Publishing after [`close`](Self::close) is a usage error and returns
    /// [`SendError::Closed`] with the value.
    pub async fn send(&self, value: T) -> Result<usize, SendError<T>> {
        if self.is_closed() {
            return Err(SendError::Closed(value));
        }

        let (ack, accepted) = oneshot::channel();
        if let Err(mpsc::error::SendError(envelope)) =
            self.inbox.send(Envelope { value, ack }).await
        {
            return Err(SendError::Closed(envelope.value));
        }

        match accepted.await {
            Ok(Ok(receivers)) => Ok(receivers),
            Ok(Err(value)) => Err(SendError::Closed(value)),
            Err(_) => Err(SendError::Abandoned),
        }
    }

    /// Close the group
    ///
    /// Every registered receiver is closed and the dispatch task stops for
    /// good. Values already buffered in receivers stay readable.
    pub fn close(&self) {
        if !self.close.send_replace(true) {
            tracing::debug!(
                group = %self.name,
                group_id = %self.group,
                "Close requested"
            );
        }
    }

    /// Check if the group has been closed
    pub fn is_closed(&self) -> bool {
        *self.close.borrow()
    }

    /// Group this handle publishes into
    pub fn group_id(&self) -> GroupId {
        self.group
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inbox: self.inbox.clone(),
            close: Arc::clone(&self.close),
            group: self.group,
            name: Arc::clone(&self.name),
        }
    }
}

impl<T> std::fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sender")
            .field("group", &self.group)
            .field("closed", &self.is_closed())
            .finish()
    }
}
