//! Per-receiver output queue
//!
//! An [`Endpoint`] is the bounded queue behind one [`Receiver`](super::Receiver).
//! The dispatch task only ever writes to it through [`Endpoint::offer`], which
//! never waits: the value is either queued right away or dropped.
//!
//! A capacity of zero makes the endpoint rendezvous-only. A value is accepted
//! only while the receiver is parked in `recv` with nothing queued.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::Notify;

use super::error::TryRecvError;

/// Outcome of a non-blocking delivery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Offer {
    /// Value was queued for the receiver
    Accepted,
    /// No room; the value was dropped for this receiver
    Full,
    /// Endpoint is closed; the value was dropped
    Closed,
}

struct Slots<T> {
    buffer: VecDeque<T>,
    /// Receiver is waiting in `take` with an empty buffer
    parked: bool,
    closed: bool,
}

pub(crate) struct Endpoint<T> {
    capacity: usize,
    slots: Mutex<Slots<T>>,
    notify: Notify,
}

impl<T> Endpoint<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            slots: Mutex::new(Slots {
                buffer: VecDeque::new(),
                parked: false,
                closed: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Endpoint that starts out closed, for groups that already shut down
    pub(crate) fn closed(capacity: usize) -> Self {
        let endpoint = Self::new(capacity);
        endpoint.slots().closed = true;
        endpoint
    }

    // Critical sections never panic while holding the lock, so a poisoned
    // mutex still guards consistent state.
    fn slots(&self) -> MutexGuard<'_, Slots<T>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn capacity(&self) -> usize {
        self.capacity
    }

    pub(crate) fn len(&self) -> usize {
        self.slots().buffer.len()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.slots().closed
    }

    /// Attempt to queue a value without waiting
    pub(crate) fn offer(&self, value: T) -> Offer {
        let mut slots = self.slots();

        if slots.closed {
            return Offer::Closed;
        }

        let has_room = slots.buffer.len() < self.capacity
            || (slots.parked && slots.buffer.is_empty());
        if !has_room {
            return Offer::Full;
        }

        slots.buffer.push_back(value);
        drop(slots);

        self.notify.notify_one();
        Offer::Accepted
    }

    /// Close the endpoint, optionally discarding anything still queued
    ///
    /// Returns `true` if this call closed it.
    pub(crate) fn close(&self, discard: bool) -> bool {
        let mut slots = self.slots();
        let was_open = !slots.closed;
        slots.closed = true;
        if discard {
            slots.buffer.clear();
        }
        drop(slots);

        self.notify.notify_one();
        was_open
    }

    pub(crate) fn try_take(&self) -> Result<T, TryRecvError> {
        let mut slots = self.slots();

        match slots.buffer.pop_front() {
            Some(value) => Ok(value),
            None if slots.closed => Err(TryRecvError::Closed),
            None => Err(TryRecvError::Empty),
        }
    }

    /// Wait for the next value; `None` once closed and drained
    ///
    /// Callers must not poll two `take` futures on the same endpoint at once.
    pub(crate) async fn take(&self) -> Option<T> {
        loop {
            // Registered before the check so a notify in between is not lost
            let notified = self.notify.notified();

            {
                let mut slots = self.slots();
                if let Some(value) = slots.buffer.pop_front() {
                    return Some(value);
                }
                if slots.closed {
                    return None;
                }
                slots.parked = true;
            }

            let _parked = Parked(self);
            notified.await;
        }
    }
}

/// Clears the parked flag when a waiting `take` wakes up or is dropped
struct Parked<'a, T>(&'a Endpoint<T>);

impl<T> Drop for Parked<'_, T> {
    fn drop(&mut self) {
        self.0.slots().parked = false;
    }
}
