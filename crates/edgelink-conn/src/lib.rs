//! Channel connection management.
//!
//! A [`ConnectionManager`] owns the two long-lived gateway sockets — the
//! control channel and the data channel — and keeps each alive forever:
//! connect, serve, and on any I/O failure tear down both per-channel tasks
//! and reconnect with capped exponential backoff.
//!
//! Consumers never touch a socket. They receive from the queues handed out
//! by [`ConnectionManager::open_control_channel`] and
//! [`ConnectionManager::open_data_channel`], and submit records through
//! [`ConnectionManager::send`]. All delivery queues are bounded rings
//! ([`queue`]): a slow consumer sheds the oldest entries instead of
//! stalling the socket read path.

pub mod config;
pub mod error;
pub mod manager;
pub mod queue;

pub use config::ConnConfig;
pub use error::{ConnError, Result};
pub use manager::{ConnectionManager, Signal};
pub use queue::{ring, RingReceiver, RingSender};
