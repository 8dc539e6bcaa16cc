//! Receiving half of a group

use std::sync::{Arc, Weak};

use super::endpoint::Endpoint;
use super::error::TryRecvError;
use super::id::{GroupId, ReceiverHandle, ReceiverId};
use super::store::Shared;

/// Read-only handle to one receiver's queue
///
/// Created by [`Group::receiver`](super::Group::receiver). Values published
/// while the queue is full are dropped for this receiver only.
///
/// Dropping the receiver unregisters and closes it. To close it while a task
/// is reading from it, pass its [`handle`](Self::handle) to
/// [`Group::close_receiver`](super::Group::close_receiver).
pub struct Receiver<T> {
    id: ReceiverId,
    group: GroupId,
    endpoint: Arc<Endpoint<T>>,
    shared: Weak<Shared<T>>,
}

impl<T> Receiver<T> {
    pub(super) fn new(
        id: ReceiverId,
        group: GroupId,
        endpoint: Arc<Endpoint<T>>,
        shared: Weak<Shared<T>>,
    ) -> Self {
        Self {
            id,
            group,
            endpoint,
            shared,
        }
    }

    /// Identifier of this receiver within its group
    pub fn id(&self) -> ReceiverId {
        self.id
    }

    /// Group that created this receiver
    pub fn group_id(&self) -> GroupId {
        self.group
    }

    /// Copyable handle for closing this receiver from elsewhere
    pub fn handle(&self) -> ReceiverHandle {
        ReceiverHandle {
            group: self.group,
            id: self.id,
        }
    }

    /// Buffer capacity chosen at registration
    pub fn capacity(&self) -> usize {
        self.endpoint.capacity()
    }

    /// Number of values currently buffered
    pub fn len(&self) -> usize {
        self.endpoint.len()
    }

    /// Check if no values are buffered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Check if the receiver will get no further deliveries
    ///
    /// Values buffered before the close may still be readable.
    pub fn is_closed(&self) -> bool {
        self.endpoint.is_closed()
    }

    /// Receive the next value
    ///
    /// Returns `None` once the receiver is closed and its buffer drained.
    pub async fn recv(&mut self) -> Option<T> {
        self.endpoint.take().await
    }

    /// Receive a value without waiting
    pub fn try_recv(&mut self) -> Result<T, TryRecvError> {
        self.endpoint.try_take()
    }
}

impl<T> From<&Receiver<T>> for ReceiverHandle {
    fn from(receiver: &Receiver<T>) -> Self {
        receiver.handle()
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            if shared.unregister(self.id) {
                shared.counters.record_pruned();
            }
        }
        // Also covers receivers the group already closed and forgot
        self.endpoint.close(true);
    }
}

impl<T> std::fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Receiver")
            .field("id", &self.id)
            .field("group", &self.group)
            .field("capacity", &self.capacity())
            .field("closed", &self.is_closed())
            .finish()
    }
}
