/// Errors that can occur during wire encoding/decoding.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// The record carries a protocol version this codec does not speak.
    #[error("incompatible message version {found} (supported: {supported})")]
    VersionMismatch { found: u16, supported: u16 },

    /// The buffer ended before a declared field length was satisfied.
    #[error("truncated record ({needed} bytes declared, {remaining} remaining)")]
    Truncated { needed: usize, remaining: usize },

    /// A length descriptor or field value is structurally invalid.
    #[error("malformed field `{field}`: {reason}")]
    Malformed {
        field: &'static str,
        reason: &'static str,
    },

    /// A field value does not fit its on-wire length descriptor.
    #[error("field `{field}` too long ({len} bytes, max {max})")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A frame type byte this protocol does not define.
    ///
    /// The decoder has already consumed the offending byte, so decoding
    /// may continue with the next frame.
    #[error("unknown frame type 0x{0:02X}")]
    UnknownFrameType(u8),

    /// The payload exceeds the configured maximum size.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("wire I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before a complete frame was received.
    #[error("connection closed (incomplete frame)")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, WireError>;
