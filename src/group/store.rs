//! Group implementation
//!
//! The group owns the receiver registry and the input queue, and spawns the
//! dispatch task that connects them.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};

use crate::stats::{GroupCounters, GroupStats};

use super::config::GroupConfig;
use super::dispatch::{self, DispatchState};
use super::endpoint::Endpoint;
use super::error::GroupError;
use super::id::{GroupId, ReceiverHandle, ReceiverId};
use super::receiver::Receiver;
use super::sender::Sender;

/// Receiver endpoints keyed by id
pub(crate) struct Registry<T> {
    pub(super) endpoints: HashMap<ReceiverId, Arc<Endpoint<T>>>,
    next_id: u64,
    /// Set once the dispatch task has torn the registry down
    pub(super) terminated: bool,
}

impl<T> Registry<T> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            endpoints: HashMap::with_capacity(capacity),
            next_id: 0,
            terminated: false,
        }
    }

    fn next_id(&mut self) -> ReceiverId {
        self.next_id += 1;
        ReceiverId::new(self.next_id)
    }
}

/// State shared between the group handle, its receivers and its dispatch task
///
/// The registry lock is never held across an await, so receivers can
/// unregister themselves from `Drop`.
pub(crate) struct Shared<T> {
    pub(super) id: GroupId,
    pub(super) config: GroupConfig,
    registry: Mutex<Registry<T>>,
    pub(crate) counters: GroupCounters,
    pub(super) state: watch::Sender<DispatchState>,
}

impl<T> Shared<T> {
    // Critical sections never panic while holding the lock, so a poisoned
    // mutex still guards consistent state.
    pub(super) fn registry(&self) -> MutexGuard<'_, Registry<T>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Remove a receiver and close its endpoint in one critical section
    ///
    /// Returns `true` if the receiver was registered.
    pub(crate) fn unregister(&self, id: ReceiverId) -> bool {
        let mut registry = self.registry();

        let Some(endpoint) = registry.endpoints.remove(&id) else {
            return false;
        };
        endpoint.close(true);

        tracing::debug!(
            group = %self.config.name,
            receiver = %id,
            receivers = registry.endpoints.len(),
            "Receiver unregistered"
        );
        true
    }
}

/// A typed one-to-many broadcast group
///
/// Values published through the group's [`Sender`] are copied to every
/// [`Receiver`] registered at the time. Delivery is best-effort: a receiver
/// whose buffer is full misses the value, and the producer is never held up
/// by it.
///
/// The group runs until the sender is closed, or until the group and every
/// sender handle have been dropped.
pub struct Group<T> {
    shared: Arc<Shared<T>>,
    sender: Sender<T>,
}

impl<T: Clone + Send + 'static> Group<T> {
    /// Create a new group with default configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn new() -> Self {
        Self::with_config(GroupConfig::default())
    }

    /// Create a new group whose element type is taken from `prototype`
    ///
    /// The value itself is not used.
    pub fn for_value(_prototype: &T) -> Self {
        Self::new()
    }

    /// Create a new group with custom configuration
    ///
    /// # Panics
    ///
    /// Panics if called outside of a Tokio runtime.
    pub fn with_config(config: GroupConfig) -> Self {
        let id = GroupId::next();
        let name: Arc<str> = Arc::from(config.name.as_str());

        // Rendezvous input: send() resolves only after the dispatch task acks
        let (inbox_tx, inbox_rx) = mpsc::channel(1);
        let (close_tx, close_rx) = watch::channel(false);
        let (state_tx, _) = watch::channel(DispatchState::Running);

        let shared = Arc::new(Shared {
            id,
            registry: Mutex::new(Registry::with_capacity(config.registry_capacity)),
            config,
            counters: GroupCounters::default(),
            state: state_tx,
        });

        tokio::spawn(dispatch::run(Arc::clone(&shared), inbox_rx, close_rx));

        tracing::info!(group = %name, group_id = %id, "Group created");

        Self {
            shared,
            sender: Sender::new(inbox_tx, close_tx, id, name),
        }
    }
}

impl<T> Group<T> {
    /// Get the group identifier
    pub fn id(&self) -> GroupId {
        self.shared.id
    }

    /// Get the group configuration
    pub fn config(&self) -> &GroupConfig {
        &self.shared.config
    }

    /// Get a handle for publishing into the group
    ///
    /// Every call returns a handle to the same input. Closing it closes the group.
    pub fn sender(&self) -> Sender<T> {
        self.sender.clone()
    }

    /// Register a new receiver with room for `capacity` buffered values
    ///
    /// The receiver sees every value dispatched after this call returns, and
    /// nothing published earlier. With a capacity of zero it only gets values
    /// that arrive while it is waiting in [`Receiver::recv`].
    ///
    /// If the group has already shut down, the receiver comes back closed.
    pub fn receiver(&self, capacity: usize) -> Receiver<T> {
        let mut registry = self.shared.registry();
        let id = registry.next_id();
        let shared = Arc::downgrade(&self.shared);

        if registry.terminated {
            tracing::debug!(
                group = %self.shared.config.name,
                receiver = %id,
                "Receiver requested after shutdown"
            );
            let endpoint = Arc::new(Endpoint::closed(capacity));
            return Receiver::new(id, self.shared.id, endpoint, shared);
        }

        let endpoint = Arc::new(Endpoint::new(capacity));
        registry.endpoints.insert(id, Arc::clone(&endpoint));

        tracing::debug!(
            group = %self.shared.config.name,
            receiver = %id,
            capacity = capacity,
            receivers = registry.endpoints.len(),
            "Receiver registered"
        );

        Receiver::new(id, self.shared.id, endpoint, shared)
    }

    /// Close a receiver and stop any further deliveries to it
    ///
    /// Accepts the receiver itself or its [`ReceiverHandle`], so a receiver can
    /// be closed while another task is waiting in [`Receiver::recv`]; that
    /// read then returns `None`. Anything still buffered is discarded.
    /// Closing a receiver that is already closed is a no-op.
    ///
    /// Returns an error, without changing anything, if the receiver was
    /// created by another group.
    pub fn close_receiver(&self, receiver: impl Into<ReceiverHandle>) -> Result<(), GroupError> {
        let handle = receiver.into();

        if handle.group_id() != self.shared.id {
            tracing::warn!(
                group = %self.shared.config.name,
                expected = %self.shared.id,
                actual = %handle.group_id(),
                "Close requested for foreign receiver"
            );
            return Err(GroupError::ForeignReceiver {
                expected: self.shared.id,
                actual: handle.group_id(),
            });
        }

        self.shared.unregister(handle.id());
        Ok(())
    }

    /// Get the number of registered receivers
    pub fn receiver_count(&self) -> usize {
        self.shared.registry().endpoints.len()
    }

    /// Get delivery statistics
    pub fn stats(&self) -> GroupStats {
        let receivers = self.receiver_count();
        self.shared.counters.snapshot(receivers)
    }

    /// Get the dispatch task's current state
    pub fn state(&self) -> DispatchState {
        *self.shared.state.borrow()
    }

    /// Wait until the dispatch task has shut down
    pub async fn terminated(&self) {
        let mut state = self.shared.state.subscribe();
        // Only fails if the state sender is gone, which `self.shared` rules out
        let _ = state
            .wait_for(|state| *state == DispatchState::Terminated)
            .await;
    }
}

impl<T: Clone + Send + 'static> Default for Group<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for Group<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            sender: self.sender.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Group<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("id", &self.shared.id)
            .field("name", &self.shared.config.name)
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tokio_test::{assert_pending, assert_ready_eq, task};

    use super::*;
    use crate::group::{SendError, TryRecvError};

    #[tokio::test]
    async fn test_broadcast_to_all_receivers() {
        let group = Group::new();
        let tx = group.sender();

        let mut r1 = group.receiver(2);
        let mut r2 = group.receiver(2);

        assert_eq!(tx.send(1).await.unwrap(), 2);
        assert_eq!(tx.send(2).await.unwrap(), 2);

        assert_eq!(r1.recv().await, Some(1));
        assert_eq!(r1.recv().await, Some(2));
        assert_eq!(r2.recv().await, Some(1));
        assert_eq!(r2.recv().await, Some(2));

        tx.close();

        assert_eq!(r1.recv().await, None);
        assert_eq!(r2.recv().await, None);
    }

    #[tokio::test]
    async fn test_every_receiver_sees_same_sequence() {
        let group = Group::new();
        let tx = group.sender();

        let mut receivers = Vec::new();
        for _ in 0..4 {
            receivers.push(group.receiver(16));
        }

        for i in 0..16u32 {
            tx.send(i).await.unwrap();
        }
        tx.close();

        for rx in &mut receivers {
            let mut seen = Vec::new();
            while let Some(v) = rx.recv().await {
                seen.push(v);
            }
            assert_eq!(seen, (0..16).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_send_without_receivers_does_not_block() {
        let group = Group::new();
        let tx = group.sender();

        let sent = tokio::time::timeout(Duration::from_secs(10), tx.send(0)).await;
        assert_eq!(sent.unwrap().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_full_receiver_drops_values() {
        let group = Group::new();
        let tx = group.sender();
        let mut rx = group.receiver(1);

        assert_eq!(tx.send(1).await.unwrap(), 1);
        assert_eq!(tx.send(2).await.unwrap(), 0);

        assert_eq!(rx.recv().await, Some(1));
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        let stats = group.stats();
        assert_eq!(stats.published, 2);
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.dropped, 1);
    }

    #[tokio::test]
    async fn test_no_replay_for_late_receiver() {
        let group = Group::new();
        let tx = group.sender();

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();

        let mut late = group.receiver(4);
        tx.send(3).await.unwrap();

        assert_eq!(late.recv().await, Some(3));
        assert_eq!(late.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_close_receiver() {
        let group = Group::new();
        let tx = group.sender();
        let mut r1 = group.receiver(1);
        let mut r2 = group.receiver(4);

        tx.send(1).await.unwrap();
        assert_eq!(r1.recv().await, Some(1));

        group.close_receiver(&r1).unwrap();
        assert_eq!(group.receiver_count(), 1);

        assert_eq!(tx.send(2).await.unwrap(), 1);
        assert_eq!(r1.recv().await, None);
        assert!(r1.is_closed());

        assert_eq!(r2.recv().await, Some(1));
        assert_eq!(r2.recv().await, Some(2));

        // Closing twice is a no-op
        assert!(group.close_receiver(&r1).is_ok());
        assert_eq!(group.receiver_count(), 1);
    }

    #[tokio::test]
    async fn test_close_receiver_discards_buffer() {
        let group = Group::new();
        let tx = group.sender();
        let mut rx = group.receiver(4);

        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        group.close_receiver(&rx).unwrap();

        assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
    }

    #[tokio::test]
    async fn test_close_receiver_rejects_foreign_receiver() {
        let group: Group<u32> = Group::new();
        let other: Group<u32> = Group::new();
        let tx = group.sender();

        let mut mine = group.receiver(2);
        let foreign = other.receiver(2);

        let result = group.close_receiver(&foreign);
        assert!(matches!(result, Err(GroupError::ForeignReceiver { .. })));

        assert_eq!(group.receiver_count(), 1);
        assert_eq!(other.receiver_count(), 1);
        assert!(!foreign.is_closed());

        tx.send(5).await.unwrap();
        assert_eq!(mine.recv().await, Some(5));
    }

    #[tokio::test]
    async fn test_close_wakes_waiting_receiver() {
        let group: Group<u32> = Group::new();
        let tx = group.sender();
        let mut rx = group.receiver(1);

        let waiter = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;

        tx.close();
        assert_eq!(waiter.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_buffered_values_survive_group_close() {
        let group = Group::new();
        let tx = group.sender();
        let mut rx = group.receiver(5);

        for i in 0..5 {
            tx.send(i).await.unwrap();
        }
        tx.close();
        group.terminated().await;

        let mut seen = Vec::new();
        while let Some(v) = rx.recv().await {
            seen.push(v);
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_send_after_close_returns_value() {
        let group = Group::new();
        let tx = group.sender();
        tx.close();

        match tx.send(9).await {
            Err(SendError::Closed(v)) => assert_eq!(v, 9),
            other => panic!("unexpected result: {:?}", other),
        }
        assert!(group.sender().is_closed());
    }

    #[tokio::test]
    async fn test_lifecycle_states() {
        let group: Group<u8> = Group::new();
        assert_eq!(group.state(), DispatchState::Running);

        let rx = group.receiver(1);
        group.sender().close();
        group.terminated().await;

        assert_eq!(group.state(), DispatchState::Terminated);
        assert_eq!(group.receiver_count(), 0);
        assert!(rx.is_closed());

        // Registering after shutdown yields a closed receiver
        let mut late = group.receiver(1);
        assert_eq!(late.recv().await, None);
        assert_eq!(group.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_dropping_all_senders_shuts_down() {
        let group: Group<u8> = Group::new();
        let mut rx = group.receiver(1);

        drop(group);
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn test_two_senders_share_input() {
        let group = Group::for_value(&0i64);
        let s0 = group.sender();
        let s1 = group.sender();

        let mut r1 = group.receiver(2);
        let mut r2 = group.receiver(2);

        s0.send(1).await.unwrap();
        s1.send(2).await.unwrap();

        assert_eq!(r1.recv().await, Some(1));
        assert_eq!(r1.recv().await, Some(2));
        assert_eq!(r2.recv().await, Some(1));
        assert_eq!(r2.recv().await, Some(2));

        // Closing through one handle closes the group for all of them
        s0.close();
        assert!(s1.is_closed());
        assert_eq!(r1.recv().await, None);
    }

    #[tokio::test]
    async fn test_zero_capacity_receiver() {
        let group = Group::new();
        let tx = group.sender();
        let mut rx = group.receiver(0);

        // Nobody waiting: value is lost
        assert_eq!(tx.send(1).await.unwrap(), 0);
        assert_eq!(rx.try_recv(), Err(TryRecvError::Empty));

        let mut recv = task::spawn(rx.recv());
        assert_pending!(recv.poll());

        assert_eq!(tx.send(2).await.unwrap(), 1);
        assert!(recv.is_woken());
        assert_ready_eq!(recv.poll(), Some(2));
    }

    #[tokio::test]
    async fn test_dropped_receiver_is_unregistered() {
        let group = Group::new();
        let tx = group.sender();
        let mut kept = group.receiver(2);
        let dropped = group.receiver(2);

        drop(dropped);
        assert_eq!(group.receiver_count(), 1);
        assert_eq!(group.stats().pruned, 1);

        assert_eq!(tx.send(1).await.unwrap(), 1);
        assert_eq!(kept.recv().await, Some(1));
    }

    #[tokio::test]
    async fn test_registry_does_not_grow_with_dropped_receivers() {
        let group: Group<u32> = Group::new();

        for _ in 0..1000 {
            let rx = group.receiver(4);
            drop(rx);
        }

        assert_eq!(group.receiver_count(), 0);
        assert_eq!(group.stats().pruned, 1000);
    }

    #[tokio::test]
    async fn test_close_receiver_while_read_pending() {
        let group: Group<u32> = Group::new();
        let tx = group.sender();
        let mut rx = group.receiver(4);
        let handle = rx.handle();

        let reader = tokio::spawn(async move { rx.recv().await });
        tokio::task::yield_now().await;

        group.close_receiver(handle).unwrap();
        assert_eq!(group.receiver_count(), 0);

        let read = tokio::time::timeout(Duration::from_secs(2), reader).await;
        assert_eq!(read.unwrap().unwrap(), None);

        assert_eq!(tx.send(1).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_close_foreign_handle_is_rejected() {
        let group: Group<u32> = Group::new();
        let other: Group<u32> = Group::new();
        let foreign = other.receiver(1);

        let result = group.close_receiver(foreign.handle());
        assert!(matches!(result, Err(GroupError::ForeignReceiver { .. })));
        assert_eq!(other.receiver_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_register_and_close_during_dispatch() {
        let group: Group<u64> = Group::new();
        let tx = group.sender();
        let mut steady = group.receiver(4096);

        let producer = tokio::spawn(async move {
            for i in 0..2000u64 {
                tx.send(i).await.unwrap();
            }
        });

        let mut churners = Vec::new();
        for _ in 0..4 {
            let group = group.clone();
            churners.push(tokio::spawn(async move {
                for _ in 0..100 {
                    let mut rx = group.receiver(8);
                    tokio::task::yield_now().await;

                    group.close_receiver(&rx).unwrap();
                    assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));

                    // Later passes must not reach a closed receiver
                    tokio::task::yield_now().await;
                    assert_eq!(rx.try_recv(), Err(TryRecvError::Closed));
                    assert_eq!(rx.len(), 0);
                }
            }));
        }

        for churner in churners {
            churner.await.unwrap();
        }
        producer.await.unwrap();

        assert_eq!(group.receiver_count(), 1);

        let mut seen = Vec::new();
        while let Ok(v) = steady.try_recv() {
            seen.push(v);
        }
        assert_eq!(seen, (0..2000).collect::<Vec<_>>());

        let stats = group.stats();
        assert_eq!(stats.published, 2000);
        assert_eq!(stats.pruned, 0);
    }

    #[tokio::test]
    async fn test_concurrent_producers() {
        let group = Group::with_config(GroupConfig::with_name("concurrent").trace_drops(true));
        let mut rx = group.receiver(64);

        let mut producers = Vec::new();
        for p in 0..4u32 {
            let tx = group.sender();
            producers.push(tokio::spawn(async move {
                for i in 0..8u32 {
                    tx.send(p * 100 + i).await.unwrap();
                }
            }));
        }
        for producer in producers {
            producer.await.unwrap();
        }
        group.sender().close();

        let mut seen = Vec::new();
        while let Some(v) = rx.recv().await {
            seen.push(v);
        }
        assert_eq!(seen.len(), 32);

        // Per-producer order is preserved
        for p in 0..4u32 {
            let from_p: Vec<u32> = seen.iter().copied().filter(|v| v / 100 == p).collect();
            assert_eq!(from_p, (0..8).map(|i| p * 100 + i).collect::<Vec<_>>());
        }
    }

    #[tokio::test]
    async fn test_bytes_payload_shares_allocation() {
        let group = Group::new();
        let tx = group.sender();
        let mut r1 = group.receiver(1);
        let mut r2 = group.receiver(1);

        let payload = Bytes::from(vec![0u8; 1024]);
        tx.send(payload.clone()).await.unwrap();

        let a = r1.recv().await.unwrap();
        let b = r2.recv().await.unwrap();
        assert_eq!(a.as_ptr(), payload.as_ptr());
        assert_eq!(b.as_ptr(), payload.as_ptr());
    }
}
