//! Group error types
//!
//! Error types for group registry operations, publishing and receiving.

use super::id::GroupId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// Receiver was created by a different group
    ForeignReceiver {
        /// Group the operation was called on
        expected: GroupId,
        /// Group that created the receiver
        actual: GroupId,
    },
}

impl std::fmt::Display for GroupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GroupError::ForeignReceiver { expected, actual } => write!(
                f,
                "Receiver belongs to group {}, expected group {}",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for GroupError {}

/// Error returned by [`Sender::send`](super::Sender::send)
///
/// Publishing after the group was closed is a usage error: the group cannot
/// deliver the value and hands it back to the caller.
pub enum SendError<T> {
    /// The group is closed; the value was not published
    Closed(T),
    /// The dispatch task stopped before acknowledging the value
    ///
    /// Only happens while the runtime itself is shutting down.
    Abandoned,
}

impl<T> SendError<T> {
    /// Recover the unpublished value, if it is still available
    pub fn into_inner(self) -> Option<T> {
        match self {
            SendError::Closed(value) => Some(value),
            SendError::Abandoned => None,
        }
    }
}

impl<T> std::fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Closed(_) => f.write_str("Closed(..)"),
            SendError::Abandoned => f.write_str("Abandoned"),
        }
    }
}

impl<T> std::fmt::Display for SendError<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SendError::Closed(_) => write!(f, "Send on closed group"),
            SendError::Abandoned => write!(f, "Dispatch task stopped before accepting the value"),
        }
    }
}

impl<T> std::error::Error for SendError<T> {}

/// Error returned by [`Receiver::try_recv`](super::Receiver::try_recv)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryRecvError {
    /// No value is buffered right now
    Empty,
    /// The receiver is closed and drained
    Closed,
}

impl std::fmt::Display for TryRecvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TryRecvError::Empty => write!(f, "Receiver is empty"),
            TryRecvError::Closed => write!(f, "Receiver is closed"),
        }
    }
}

impl std::error::Error for TryRecvError {}
