use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// Acknowledgement of a processed frame. Bare type byte.
pub const CODE_ACK: u8 = 0x0B;
/// Out-of-band control signal. Bare type byte; the frame is the signal.
pub const CODE_CONTROL_SIGNAL: u8 = 0x0C;
/// An encoded [`MessageRecord`](crate::MessageRecord), length-prefixed.
pub const CODE_MESSAGE: u8 = 0x0D;
/// Delivery receipt carrying a message id and/or timestamp.
pub const CODE_RECEIPT: u8 = 0x0E;

/// Confirmation of a prior message submission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Receipt {
    /// Gateway-assigned message id; empty when the gateway omitted it.
    pub id: String,
    /// Gateway timestamp in milliseconds; zero when omitted.
    pub timestamp: u64,
}

/// One typed unit of traffic on a channel socket.
///
/// `ACK` and `CONTROL_SIGNAL` are a single type byte on the wire;
/// `MESSAGE` carries a 4-byte big-endian length and the codec output;
/// `RECEIPT` carries its own id/timestamp length bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Ack,
    ControlSignal,
    Message(Bytes),
    Receipt(Receipt),
}

impl Frame {
    /// The wire type code of this frame.
    pub fn type_code(&self) -> u8 {
        match self {
            Frame::Ack => CODE_ACK,
            Frame::ControlSignal => CODE_CONTROL_SIGNAL,
            Frame::Message(_) => CODE_MESSAGE,
            Frame::Receipt(_) => CODE_RECEIPT,
        }
    }

    /// The total wire size of this frame.
    pub fn wire_size(&self) -> usize {
        match self {
            Frame::Ack | Frame::ControlSignal => 1,
            Frame::Message(payload) => 1 + 4 + payload.len(),
            Frame::Receipt(receipt) => {
                1 + 2 + receipt.id.len() + timestamp_width(receipt.timestamp)
            }
        }
    }
}

fn timestamp_width(timestamp: u64) -> usize {
    if timestamp == 0 {
        0
    } else {
        8 - timestamp.leading_zeros() as usize / 8
    }
}

/// Encode a frame into the wire format.
pub fn encode_frame(frame: &Frame, dst: &mut BytesMut) -> Result<()> {
    match frame {
        Frame::Ack => dst.put_u8(CODE_ACK),
        Frame::ControlSignal => dst.put_u8(CODE_CONTROL_SIGNAL),
        Frame::Message(payload) => {
            if payload.len() > u32::MAX as usize {
                return Err(WireError::PayloadTooLarge {
                    size: payload.len(),
                    max: u32::MAX as usize,
                });
            }
            dst.reserve(1 + 4 + payload.len());
            dst.put_u8(CODE_MESSAGE);
            dst.put_u32(payload.len() as u32);
            dst.put_slice(payload);
        }
        Frame::Receipt(receipt) => {
            if receipt.id.len() > u8::MAX as usize {
                return Err(WireError::FieldTooLong {
                    field: "receipt id",
                    len: receipt.id.len(),
                    max: u8::MAX as usize,
                });
            }
            let ts_width = timestamp_width(receipt.timestamp);
            dst.reserve(3 + receipt.id.len() + ts_width);
            dst.put_u8(CODE_RECEIPT);
            dst.put_u8(receipt.id.len() as u8);
            dst.put_u8(ts_width as u8);
            dst.put_slice(receipt.id.as_bytes());
            if ts_width > 0 {
                dst.put_slice(&receipt.timestamp.to_be_bytes()[8 - ts_width..]);
            }
        }
    }
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer. An unrecognized
/// type byte is consumed and reported as [`WireError::UnknownFrameType`],
/// so the caller can drop it and keep decoding the stream.
pub fn decode_frame(src: &mut BytesMut, max_payload: usize) -> Result<Option<Frame>> {
    if src.is_empty() {
        return Ok(None);
    }

    match src[0] {
        CODE_ACK => {
            src.advance(1);
            Ok(Some(Frame::Ack))
        }
        CODE_CONTROL_SIGNAL => {
            src.advance(1);
            Ok(Some(Frame::ControlSignal))
        }
        CODE_MESSAGE => {
            if src.len() < 5 {
                return Ok(None);
            }
            let payload_len =
                u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
            if payload_len > max_payload {
                return Err(WireError::PayloadTooLarge {
                    size: payload_len,
                    max: max_payload,
                });
            }
            if src.len() < 5 + payload_len {
                return Ok(None);
            }
            src.advance(5);
            let payload = src.split_to(payload_len).freeze();
            Ok(Some(Frame::Message(payload)))
        }
        CODE_RECEIPT => {
            if src.len() < 3 {
                return Ok(None);
            }
            let id_len = src[1] as usize;
            let ts_len = src[2] as usize;
            if ts_len > 8 {
                return Err(WireError::Malformed {
                    field: "receipt timestamp",
                    reason: "integer descriptor wider than field",
                });
            }
            if src.len() < 3 + id_len + ts_len {
                return Ok(None);
            }
            src.advance(3);
            let id_bytes = src.split_to(id_len);
            let id = String::from_utf8(id_bytes.to_vec()).map_err(|_| WireError::Malformed {
                field: "receipt id",
                reason: "invalid utf-8",
            })?;
            let ts_bytes = src.split_to(ts_len);
            let timestamp = ts_bytes
                .iter()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
            Ok(Some(Frame::Receipt(Receipt { id, timestamp })))
        }
        other => {
            src.advance(1);
            Err(WireError::UnknownFrameType(other))
        }
    }
}
