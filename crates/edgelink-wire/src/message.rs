use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Result, WireError};

/// The message protocol version this codec speaks.
pub const PROTOCOL_VERSION: u16 = 4;

/// Fixed size of the descriptor header: a 2-byte version followed by one
/// length descriptor per field (1, 2 or 4 bytes each).
pub const HEADER_LEN: usize = 33;

/// One structured message exchanged with the gateway.
///
/// Every field is independently optional; an absent string or blob is
/// empty, an absent integer is zero. Field order here is wire order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct MessageRecord {
    /// Message id, assigned by the gateway on submission.
    pub id: String,
    pub tag: String,
    #[cfg_attr(feature = "serde", serde(rename = "groupid"))]
    pub group_id: String,
    #[cfg_attr(feature = "serde", serde(rename = "sequencenumber"))]
    pub sequence_number: u32,
    #[cfg_attr(feature = "serde", serde(rename = "sequencetotal"))]
    pub sequence_total: u32,
    pub priority: u32,
    /// Milliseconds since the epoch, stamped by the gateway.
    pub timestamp: u64,
    pub publisher: String,
    #[cfg_attr(feature = "serde", serde(rename = "authid"))]
    pub auth_id: String,
    #[cfg_attr(feature = "serde", serde(rename = "authgroup"))]
    pub auth_group: String,
    pub version: u16,
    #[cfg_attr(feature = "serde", serde(rename = "chainposition"))]
    pub chain_position: u64,
    pub hash: String,
    #[cfg_attr(feature = "serde", serde(rename = "previoushash"))]
    pub previous_hash: String,
    pub nonce: String,
    #[cfg_attr(feature = "serde", serde(rename = "difficultytarget"))]
    pub difficulty_target: u32,
    #[cfg_attr(feature = "serde", serde(rename = "infotype"))]
    pub info_type: String,
    #[cfg_attr(feature = "serde", serde(rename = "infoformat"))]
    pub info_format: String,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "contextdata", with = "crate::json::base64_blob")
    )]
    pub context_data: Vec<u8>,
    #[cfg_attr(
        feature = "serde",
        serde(rename = "contentdata", with = "crate::json::base64_blob")
    )]
    pub content_data: Vec<u8>,
}

impl Default for MessageRecord {
    fn default() -> Self {
        Self {
            id: String::new(),
            tag: String::new(),
            group_id: String::new(),
            sequence_number: 0,
            sequence_total: 0,
            priority: 0,
            timestamp: 0,
            publisher: String::new(),
            auth_id: String::new(),
            auth_group: String::new(),
            version: PROTOCOL_VERSION,
            chain_position: 0,
            hash: String::new(),
            previous_hash: String::new(),
            nonce: String::new(),
            difficulty_target: 0,
            info_type: String::new(),
            info_format: String::new(),
            context_data: Vec::new(),
            content_data: Vec::new(),
        }
    }
}

impl MessageRecord {
    /// A record carrying the supported protocol version and nothing else.
    pub fn new() -> Self {
        Self::default()
    }

    /// Encode this record into its binary wire representation.
    ///
    /// Layout: a [`HEADER_LEN`]-byte header (2-byte big-endian version,
    /// then one length descriptor per field in wire order) followed by the
    /// field values concatenated in the same order. Integers use
    /// minimal-width big-endian encoding; an absent blob is written as a
    /// single zero byte with descriptor 1.
    pub fn encode(&self) -> Result<Bytes> {
        if self.version != PROTOCOL_VERSION {
            return Err(WireError::VersionMismatch {
                found: self.version,
                supported: PROTOCOL_VERSION,
            });
        }

        let mut header = BytesMut::with_capacity(HEADER_LEN);
        let mut body = BytesMut::with_capacity(128);

        header.put_u16(self.version);

        put_str8("id", &self.id, &mut header, &mut body)?;
        put_str16("tag", &self.tag, &mut header, &mut body)?;
        put_str8("groupid", &self.group_id, &mut header, &mut body)?;
        put_uint_minimal(u64::from(self.sequence_number), &mut header, &mut body);
        put_uint_minimal(u64::from(self.sequence_total), &mut header, &mut body);
        put_uint_minimal(u64::from(self.priority), &mut header, &mut body);
        put_uint_minimal(self.timestamp, &mut header, &mut body);
        put_str8("publisher", &self.publisher, &mut header, &mut body)?;
        put_str16("authid", &self.auth_id, &mut header, &mut body)?;
        put_str16("authgroup", &self.auth_group, &mut header, &mut body)?;
        put_uint_minimal(self.chain_position, &mut header, &mut body);
        put_str16("hash", &self.hash, &mut header, &mut body)?;
        put_str16("previoushash", &self.previous_hash, &mut header, &mut body)?;
        put_str16("nonce", &self.nonce, &mut header, &mut body)?;
        put_uint_minimal(u64::from(self.difficulty_target), &mut header, &mut body);
        put_str8("infotype", &self.info_type, &mut header, &mut body)?;
        put_str8("infoformat", &self.info_format, &mut header, &mut body)?;
        put_blob("contextdata", &self.context_data, &mut header, &mut body)?;
        put_blob("contentdata", &self.content_data, &mut header, &mut body)?;

        debug_assert_eq!(header.len(), HEADER_LEN);

        header.unsplit(body);
        Ok(header.freeze())
    }

    /// Decode a record from its binary wire representation.
    ///
    /// The version gate runs before anything else; every length descriptor
    /// is checked against the remaining buffer, so truncated or malformed
    /// input fails cleanly instead of slicing out of bounds.
    pub fn decode(data: &[u8]) -> Result<Self> {
        if data.len() < 2 {
            return Err(WireError::Truncated {
                needed: 2,
                remaining: data.len(),
            });
        }
        let version = u16::from_be_bytes([data[0], data[1]]);
        if version != PROTOCOL_VERSION {
            return Err(WireError::VersionMismatch {
                found: version,
                supported: PROTOCOL_VERSION,
            });
        }
        if data.len() < HEADER_LEN {
            return Err(WireError::Truncated {
                needed: HEADER_LEN,
                remaining: data.len(),
            });
        }

        let mut record = Self::new();
        let mut pos = HEADER_LEN;

        record.id = take_str("id", data, &mut pos, data[2] as usize)?;
        record.tag = take_str("tag", data, &mut pos, be16(data, 3) as usize)?;
        record.group_id = take_str("groupid", data, &mut pos, data[5] as usize)?;
        record.sequence_number =
            take_u32("sequencenumber", data, &mut pos, data[6] as usize)?;
        record.sequence_total = take_u32("sequencetotal", data, &mut pos, data[7] as usize)?;
        record.priority = take_u32("priority", data, &mut pos, data[8] as usize)?;
        record.timestamp = take_u64("timestamp", data, &mut pos, data[9] as usize)?;
        record.publisher = take_str("publisher", data, &mut pos, data[10] as usize)?;
        record.auth_id = take_str("authid", data, &mut pos, be16(data, 11) as usize)?;
        record.auth_group = take_str("authgroup", data, &mut pos, be16(data, 13) as usize)?;
        record.chain_position = take_u64("chainposition", data, &mut pos, data[15] as usize)?;
        record.hash = take_str("hash", data, &mut pos, be16(data, 16) as usize)?;
        record.previous_hash =
            take_str("previoushash", data, &mut pos, be16(data, 18) as usize)?;
        record.nonce = take_str("nonce", data, &mut pos, be16(data, 20) as usize)?;
        record.difficulty_target =
            take_u32("difficultytarget", data, &mut pos, data[22] as usize)?;
        record.info_type = take_str("infotype", data, &mut pos, data[23] as usize)?;
        record.info_format = take_str("infoformat", data, &mut pos, data[24] as usize)?;
        record.context_data = take_blob(data, &mut pos, be32(data, 25))?;
        record.content_data = take_blob(data, &mut pos, be32(data, 29))?;

        Ok(record)
    }
}

fn put_str8(
    field: &'static str,
    value: &str,
    header: &mut BytesMut,
    body: &mut BytesMut,
) -> Result<()> {
    let len = value.len();
    if len > u8::MAX as usize {
        return Err(WireError::FieldTooLong {
            field,
            len,
            max: u8::MAX as usize,
        });
    }
    header.put_u8(len as u8);
    body.put_slice(value.as_bytes());
    Ok(())
}

fn put_str16(
    field: &'static str,
    value: &str,
    header: &mut BytesMut,
    body: &mut BytesMut,
) -> Result<()> {
    let len = value.len();
    if len > u16::MAX as usize {
        return Err(WireError::FieldTooLong {
            field,
            len,
            max: u16::MAX as usize,
        });
    }
    header.put_u16(len as u16);
    body.put_slice(value.as_bytes());
    Ok(())
}

/// Minimal-width big-endian integer: zero is one zero byte, anything else
/// is the fewest bytes with no leading zero. The descriptor records the
/// byte count.
fn put_uint_minimal(value: u64, header: &mut BytesMut, body: &mut BytesMut) {
    if value == 0 {
        header.put_u8(1);
        body.put_u8(0);
        return;
    }
    let width = 8 - value.leading_zeros() as usize / 8;
    header.put_u8(width as u8);
    body.put_slice(&value.to_be_bytes()[8 - width..]);
}

fn put_blob(
    field: &'static str,
    value: &[u8],
    header: &mut BytesMut,
    body: &mut BytesMut,
) -> Result<()> {
    // An absent blob still occupies one zero byte on the wire.
    let bytes: &[u8] = if value.is_empty() { &[0] } else { value };
    if bytes.len() > u32::MAX as usize {
        return Err(WireError::FieldTooLong {
            field,
            len: bytes.len(),
            max: u32::MAX as usize,
        });
    }
    header.put_u32(bytes.len() as u32);
    body.put_slice(bytes);
    Ok(())
}

fn be16(data: &[u8], offset: usize) -> u16 {
    u16::from_be_bytes([data[offset], data[offset + 1]])
}

fn be32(data: &[u8], offset: usize) -> usize {
    u32::from_be_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ]) as usize
}

fn take_bytes<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let remaining = data.len() - *pos;
    if len > remaining {
        return Err(WireError::Truncated {
            needed: len,
            remaining,
        });
    }
    let slice = &data[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}

fn take_str(field: &'static str, data: &[u8], pos: &mut usize, len: usize) -> Result<String> {
    if len == 0 {
        return Ok(String::new());
    }
    let bytes = take_bytes(data, pos, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| WireError::Malformed {
        field,
        reason: "invalid utf-8",
    })
}

fn take_uint(
    field: &'static str,
    data: &[u8],
    pos: &mut usize,
    len: usize,
    max_width: usize,
) -> Result<u64> {
    if len == 0 {
        return Ok(0);
    }
    if len > max_width {
        return Err(WireError::Malformed {
            field,
            reason: "integer descriptor wider than field",
        });
    }
    let bytes = take_bytes(data, pos, len)?;
    Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
}

fn take_u32(field: &'static str, data: &[u8], pos: &mut usize, len: usize) -> Result<u32> {
    take_uint(field, data, pos, len, 4).map(|v| v as u32)
}

fn take_u64(field: &'static str, data: &[u8], pos: &mut usize, len: usize) -> Result<u64> {
    take_uint(field, data, pos, len, 8)
}

fn take_blob(data: &[u8], pos: &mut usize, len: usize) -> Result<Vec<u8>> {
    if len == 0 {
        return Ok(Vec::new());
    }
    // Owned copy: the read buffer is reused by the transport layer, so the
    // record must not alias it.
    take_bytes(data, pos, len).map(<[u8]>::to_vec)
}
