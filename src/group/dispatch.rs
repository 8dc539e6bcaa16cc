//! Dispatch loop
//!
//! One task per group takes values off the input and offers each one to every
//! registered receiver. The whole pass runs under the registry lock, so
//! registration and close never observe a half-finished pass. No offer waits,
//! so the lock is never held across an await, and a slow receiver only loses
//! values without holding up the others.
//!
//! ```text
//!   Running ──(close / all senders dropped)──► Closing ──(registry torn down)──► Terminated
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use super::endpoint::Offer;
use super::sender::Envelope;
use super::store::Shared;

/// Lifecycle state of a group's dispatch task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Accepting and fanning out values
    Running,
    /// Close observed, registry teardown in progress
    Closing,
    /// Registry torn down; the group is inert
    Terminated,
}

/// Run the dispatch loop until the group is closed
pub(super) async fn run<T: Clone + Send + 'static>(
    shared: Arc<Shared<T>>,
    mut inbox: mpsc::Receiver<Envelope<T>>,
    mut close: watch::Receiver<bool>,
) {
    loop {
        let envelope = tokio::select! {
            biased;
            _ = wait_closed(&mut close) => None,
            envelope = inbox.recv() => envelope,
        };

        let Some(Envelope { value, ack }) = envelope else {
            break;
        };

        let accepted = fan_out(&shared, value);

        // Producer may have given up waiting
        let _ = ack.send(Ok(accepted));
    }

    shut_down(&shared, &mut inbox);
}

async fn wait_closed(close: &mut watch::Receiver<bool>) {
    loop {
        if *close.borrow_and_update() {
            return;
        }
        if close.changed().await.is_err() {
            return;
        }
    }
}

/// Offer one value to every registered receiver
///
/// Returns the number of receivers that accepted it.
fn fan_out<T: Clone>(shared: &Shared<T>, value: T) -> usize {
    let registry = shared.registry();

    let mut accepted = 0usize;
    let mut dropped = 0u64;

    for (id, endpoint) in registry.endpoints.iter() {
        match endpoint.offer(value.clone()) {
            Offer::Accepted => accepted += 1,
            Offer::Full => {
                dropped += 1;
                if shared.config.trace_drops {
                    tracing::trace!(
                        group = %shared.config.name,
                        receiver = %id,
                        capacity = endpoint.capacity(),
                        "Value dropped, receiver full"
                    );
                }
            }
            // Unregistering closes under the same lock, so registered
            // endpoints are always open
            Offer::Closed => {}
        }
    }
    drop(registry);

    shared.counters.record_pass(accepted as u64, dropped);

    accepted
}

fn shut_down<T>(shared: &Shared<T>, inbox: &mut mpsc::Receiver<Envelope<T>>) {
    shared.state.send_replace(DispatchState::Closing);

    // Hand queued values back to their producers
    inbox.close();
    while let Ok(Envelope { value, ack }) = inbox.try_recv() {
        let _ = ack.send(Err(value));
    }

    let mut registry = shared.registry();
    let receivers = registry.endpoints.len();
    for (_, endpoint) in registry.endpoints.drain() {
        endpoint.close(false);
    }
    registry.terminated = true;
    drop(registry);

    shared.state.send_replace(DispatchState::Terminated);

    let stats = shared.counters.snapshot(0);
    tracing::info!(
        group = %shared.config.name,
        group_id = %shared.id,
        receivers_closed = receivers,
        published = stats.published,
        delivered = stats.delivered,
        dropped = stats.dropped,
        "Group shut down"
    );
}
