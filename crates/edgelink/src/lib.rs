//! Edge workload SDK for the local gateway.
//!
//! edgelink lets a workload exchange structured messages with the gateway
//! process running on the same device: two long-lived socket channels
//! (control signals, message/receipt traffic) that survive network
//! failures, plus a small REST surface for configuration and bulk message
//! queries.
//!
//! # Crate Structure
//!
//! - [`transport`] — TCP stream and endpoint model
//! - [`wire`] — binary message codec and typed frame protocol
//! - [`conn`] — dispatch queues and channel connection management
//! - [`GatewayClient`] — the facade tying it all together
//!
//! # Quick start
//!
//! ```no_run
//! use edgelink::{GatewayClient, MessageRecord};
//!
//! # fn main() -> Result<(), edgelink::ClientError> {
//! let client = GatewayClient::from_env()?;
//! let (messages, _receipts) = client.open_data_channel()?;
//!
//! let mut record = MessageRecord::new();
//! record.info_type = "greeting".to_string();
//! record.content_data = b"hello".to_vec();
//! client.send_message(record)?;
//!
//! while let Some(incoming) = messages.recv() {
//!     println!("got {} bytes from {}", incoming.content_data.len(), incoming.publisher);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod rest;

/// Re-export transport types.
pub mod transport {
    pub use edgelink_transport::*;
}

/// Re-export wire types.
pub mod wire {
    pub use edgelink_wire::*;
}

/// Re-export channel connection types.
pub mod conn {
    pub use edgelink_conn::*;
}

pub use client::GatewayClient;
pub use edgelink_conn::{RingReceiver, Signal};
pub use edgelink_transport::Endpoint;
pub use edgelink_wire::{MessageRecord, Receipt};
pub use error::{ClientError, Result};
pub use rest::{MessageQuery, TimeFrameMessages};
