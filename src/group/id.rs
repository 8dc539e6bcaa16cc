//! Identifiers for groups and their receivers

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_GROUP_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(u64);

impl GroupId {
    pub(crate) fn next() -> Self {
        Self(NEXT_GROUP_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Identifier of a receiver, unique within its group
///
/// Ids are handed out in increasing order and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ReceiverId(u64);

impl ReceiverId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw numeric value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ReceiverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Copyable reference to a receiver, for closing it from another task
///
/// A task parked in [`Receiver::recv`](super::Receiver::recv) holds the
/// receiver mutably; a handle lets a controller close it meanwhile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReceiverHandle {
    pub(crate) group: GroupId,
    pub(crate) id: ReceiverId,
}

impl ReceiverHandle {
    /// Group that created the receiver
    pub fn group_id(&self) -> GroupId {
        self.group
    }

    /// Identifier of the receiver within its group
    pub fn id(&self) -> ReceiverId {
        self.id
    }
}
