//! Gateway transport layer.
//!
//! Provides the connected-socket type used by every higher layer:
//! - [`Endpoint`] — where the local gateway lives (host, port, TLS flag)
//! - [`GatewayStream`] — a connected TCP stream with timeouts and keepalive
//!
//! This is the lowest layer of edgelink. Everything else builds on top of
//! the [`GatewayStream`] type provided here.

pub mod endpoint;
pub mod error;
pub mod stream;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use stream::GatewayStream;
