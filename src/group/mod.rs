//! Broadcast groups
//!
//! A group takes values from any number of producers and copies each one to
//! every receiver registered at the time. Each receiver has its own bounded
//! queue. When that queue is full the value is dropped for that receiver
//! only, so a slow consumer never stalls the producers or the other consumers.
//!
//! # Architecture
//!
//! ```text
//!   [Sender] ──┐                       Arc<Shared>
//!   [Sender] ──┼──► input ──► ┌──────────────────────────────┐
//!   [Sender] ──┘  (rendezvous)│ dispatch task                │
//!                             │   lock(registry)             │
//!                             │   for each endpoint:         │
//!                             │     offer(value.clone())     │
//!                             │   unlock                     │
//!                             └──────────────┬───────────────┘
//!                                            │
//!                  ┌─────────────────────────┼─────────────────────────┐
//!                  ▼                         ▼                         ▼
//!             [Endpoint r1]             [Endpoint r2]             [Endpoint rN]
//!             rx.recv()                 rx.recv()                 rx.recv()
//! ```
//!
//! # Lifecycle
//!
//! Closing the [`Sender`] (any clone of it) closes every registered receiver
//! and stops the dispatch task. Receivers keep whatever was already buffered.
//! Dropping the group and all of its senders has the same effect.

pub mod config;
mod dispatch;
mod endpoint;
pub mod error;
pub mod id;
mod receiver;
mod sender;
mod store;

pub use config::GroupConfig;
pub use dispatch::DispatchState;
pub use error::{GroupError, SendError, TryRecvError};
pub use id::{GroupId, ReceiverHandle, ReceiverId};
pub use receiver::Receiver;
pub use sender::Sender;
pub use store::Group;
