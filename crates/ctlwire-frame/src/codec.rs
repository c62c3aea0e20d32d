use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Frame header: timestamp (8) + message type (1) + sequence (8) + body length (4) = 21 bytes.
pub const HEADER_SIZE: usize = 21;

/// Default maximum body size accepted from a peer: 1 MiB.
pub const DEFAULT_MAX_BODY: usize = 1024 * 1024;

/// The fixed header shared by every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Nanoseconds since the Unix epoch at send time.
    pub timestamp_ns: u64,
    /// Message type discriminator (see [`crate::message`]).
    pub message_type: u8,
    /// Per-session sequence number.
    pub sequence_number: u64,
    /// Exact byte count of the body that follows.
    pub body_length: u32,
}

impl Header {
    /// Create a header stamped with the current time.
    pub fn new(message_type: u8, sequence_number: u64, body_length: u32) -> Self {
        Self {
            timestamp_ns: now_timestamp_ns(),
            message_type,
            sequence_number,
            body_length,
        }
    }

    /// Encode into the fixed 21-byte wire representation.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        let mut dst = &mut out[..];
        dst.put_u64_le(self.timestamp_ns);
        dst.put_u8(self.message_type);
        dst.put_u64_le(self.sequence_number);
        dst.put_u32_le(self.body_length);
        out
    }
}

/// A header plus its body bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: Header,
    pub body: Bytes,
}

impl Frame {
    /// Build a frame whose header length is taken from `body`.
    pub fn new(message_type: u8, sequence_number: u64, body: impl Into<Bytes>) -> Result<Self> {
        let body = body.into();
        let body_length = u32::try_from(body.len()).map_err(|_| FrameError::FieldTooLong {
            field: "body",
            len: body.len(),
        })?;
        Ok(Self {
            header: Header::new(message_type, sequence_number, body_length),
            body,
        })
    }

    /// The total wire size of this frame (header + body).
    pub fn wire_size(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }
}

/// Append the encoded header to `dst`.
///
/// Wire format (all little-endian, no padding):
/// ```text
/// ┌──────────────┬──────────────┬──────────────┬──────────────┐
/// │ Timestamp ns │ Message type │ Sequence     │ Body length  │
/// │ (8B LE)      │ (1B)         │ (8B LE)      │ (4B LE)      │
/// └──────────────┴──────────────┴──────────────┴──────────────┘
/// ```
pub fn encode_header(header: &Header, dst: &mut BytesMut) {
    dst.reserve(HEADER_SIZE);
    dst.put_slice(&header.encode());
}

/// Decode a header from the first 21 bytes of `src`.
///
/// The message type is not validated against known values.
pub fn decode_header(src: &[u8]) -> Result<Header> {
    if src.len() < HEADER_SIZE {
        return Err(FrameError::Truncated {
            needed: HEADER_SIZE,
            available: src.len(),
        });
    }

    let mut buf = &src[..HEADER_SIZE];
    Ok(Header {
        timestamp_ns: buf.get_u64_le(),
        message_type: buf.get_u8(),
        sequence_number: buf.get_u64_le(),
        body_length: buf.get_u32_le(),
    })
}

/// Encode a full frame into `dst`.
///
/// Fails with [`FrameError::LengthMismatch`] when `header.body_length`
/// does not equal `body.len()`.
pub fn encode_frame(header: &Header, body: &[u8], dst: &mut BytesMut) -> Result<()> {
    if header.body_length as usize != body.len() {
        return Err(FrameError::LengthMismatch {
            declared: header.body_length as usize,
            actual: body.len(),
        });
    }
    dst.reserve(HEADER_SIZE + body.len());
    encode_header(header, dst);
    dst.put_slice(body);
    Ok(())
}

/// Decode a frame from a buffer.
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete frame yet.
/// On success, consumes the frame bytes from the buffer.
pub fn decode_frame(src: &mut BytesMut, max_body: usize) -> Result<Option<Frame>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let header = decode_header(src)?;
    let body_len = header.body_length as usize;

    if body_len > max_body {
        return Err(FrameError::BodyTooLarge {
            size: body_len,
            max: max_body,
        });
    }

    let total = HEADER_SIZE + body_len;
    if src.len() < total {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let body = src.split_to(body_len).freeze();

    Ok(Some(Frame { header, body }))
}

/// Nanoseconds since the Unix epoch, or 0 if the clock is before it.
pub fn now_timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Configuration for frame readers and writers.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum body size in bytes. Default: 1 MiB.
    pub max_body_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl FrameConfig {
    /// Same deadline for reads and writes.
    pub fn with_io_timeout(timeout: Duration) -> Self {
        Self {
            read_timeout: Some(timeout),
            write_timeout: Some(timeout),
            ..Self::default()
        }
    }
}
