//! Wire codec for the ctlwire control protocol.
//!
//! Every message is one frame: a fixed 21-byte little-endian header
//! followed by `body_length` body bytes.
//! - [`codec`] — header encode/decode and streaming frame decode
//! - [`body`] — the configuration message body (start/stop commands)
//! - [`message`] — message type discriminators and command kinds
//!
//! [`FrameReader`] and [`FrameWriter`] move whole frames over any blocking
//! `Read`/`Write` stream.

pub mod body;
pub mod codec;
pub mod error;
pub mod message;
pub mod reader;
pub mod writer;

#[cfg(test)]
mod proptest;

pub use body::{compute_body_length, decode_body, encode_body, ConfigMessage, LoggingFile, MetaData};
pub use codec::{
    decode_frame, decode_header, encode_frame, encode_header, now_timestamp_ns, Frame, FrameConfig,
    Header, DEFAULT_MAX_BODY, HEADER_SIZE,
};
pub use error::{FrameError, Result};
pub use message::{message_name, CommandKind, MessageType};
pub use reader::FrameReader;
pub use writer::FrameWriter;
