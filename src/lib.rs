//! Typed one-to-many broadcast groups
//!
//! Any number of producers publish values of one type into a [`Group`]; any
//! number of independently paced receivers each get a copy of every value
//! published after they registered. Delivery is best-effort: a receiver that
//! cannot take a value right now loses it, and producers never wait on slow
//! receivers.
//!
//! ```no_run
//! use broadcast_group::Group;
//!
//! # async fn demo() {
//! let group = Group::new();
//! let tx = group.sender();
//!
//! let mut rx = group.receiver(8);
//!
//! tx.send(1u32).await.unwrap();
//! assert_eq!(rx.recv().await, Some(1));
//!
//! tx.close();
//! assert_eq!(rx.recv().await, None);
//! # }
//! ```

pub mod group;
pub mod stats;

pub use group::{
    DispatchState, Group, GroupConfig, GroupError, GroupId, Receiver, ReceiverHandle, ReceiverId,
    SendError, Sender, TryRecvError,
};
pub use stats::GroupStats;
