//! Wire protocol for the edgelink gateway.
//!
//! Two layers live here:
//!
//! - [`MessageRecord`] and its binary codec — a fixed 33-byte header of
//!   per-field length descriptors followed by the field values, with
//!   minimal-width big-endian integers (protocol version 4).
//! - [`Frame`] — the typed envelope multiplexing message, control-signal,
//!   acknowledgement and receipt traffic over one socket, plus
//!   [`FrameReader`]/[`FrameWriter`] for streaming frames over any
//!   `Read`/`Write`.
//!
//! The optional `serde` feature adds the gateway's JSON representation of
//! records (all-lowercase keys, base64 blobs) for the REST surface.

pub mod error;
pub mod frame;
pub mod message;
pub mod reader;
pub mod writer;

#[cfg(feature = "serde")]
pub mod json;

pub use error::{Result, WireError};
pub use frame::{
    decode_frame, encode_frame, Frame, Receipt, CODE_ACK, CODE_CONTROL_SIGNAL, CODE_MESSAGE,
    CODE_RECEIPT,
};
pub use message::{MessageRecord, HEADER_LEN, PROTOCOL_VERSION};
pub use reader::FrameReader;
pub use writer::FrameWriter;

/// Default maximum MESSAGE payload size: 16 MiB.
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;
