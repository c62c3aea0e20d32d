use std::io::{self, ErrorKind, Read};
use std::time::Instant;

use bytes::{Buf, Bytes, BytesMut};
use ctlwire_transport::ControlStream;

use crate::codec::{decode_header, Frame, FrameConfig, Header, HEADER_SIZE};
use crate::error::{FrameError, Result};

const INITIAL_BUFFER_CAPACITY: usize = 4 * 1024;
const READ_CHUNK_SIZE: usize = 4 * 1024;

/// Reads headers and bodies from any `Read` stream.
///
/// Handles partial reads internally. Bytes read past the current frame stay
/// buffered for the next call, so a header can be read now and its body
/// drained later.
pub struct FrameReader<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Read> FrameReader<T> {
    /// Create a new frame reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Read the next 21-byte header (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached first.
    pub fn read_header(&mut self) -> Result<Header> {
        self.fill(HEADER_SIZE)?;
        self.take_header()
    }

    /// Read exactly `len` body bytes.
    pub fn read_body(&mut self, len: u32) -> Result<Bytes> {
        let len = self.check_body_len(len)?;
        self.fill(len)?;
        Ok(self.buf.split_to(len).freeze())
    }

    /// Read and drop exactly `len` body bytes.
    pub fn discard(&mut self, len: u32) -> Result<()> {
        let len = self.check_body_len(len)?;
        self.fill(len)?;
        self.buf.advance(len);
        Ok(())
    }

    /// Read the next complete frame (blocking).
    pub fn read_frame(&mut self) -> Result<Frame> {
        let header = self.read_header()?;
        let body = self.read_body(header.body_length)?;
        Ok(Frame { header, body })
    }

    /// Bytes already read from the stream but not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn check_body_len(&self, len: u32) -> Result<usize> {
        let len = len as usize;
        if len > self.config.max_body_size {
            return Err(FrameError::BodyTooLarge {
                size: len,
                max: self.config.max_body_size,
            });
        }
        Ok(len)
    }

    fn take_header(&mut self) -> Result<Header> {
        let header = decode_header(&self.buf)?;
        self.buf.advance(HEADER_SIZE);
        Ok(header)
    }

    fn fill(&mut self, needed: usize) -> Result<()> {
        self.fill_with(needed, |_| Ok(()))
    }

    /// Read until `needed` bytes are buffered, calling `before_read` ahead
    /// of every `read` on the inner stream.
    fn fill_with<F>(&mut self, needed: usize, mut before_read: F) -> Result<()>
    where
        F: FnMut(&mut T) -> Result<()>,
    {
        while self.buf.len() < needed {
            before_read(&mut self.inner)?;
            let mut chunk = [0u8; READ_CHUNK_SIZE];
            let read = match self.inner.read(&mut chunk) {
                Ok(n) => n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            };

            if read == 0 {
                return Err(FrameError::ConnectionClosed);
            }

            self.buf.extend_from_slice(&chunk[..read]);
        }
        Ok(())
    }
}

impl FrameReader<ControlStream> {
    /// Create a frame reader for `ControlStream` and apply read timeout from config.
    pub fn with_config_stream(inner: ControlStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }

    /// Like [`read_header`](Self::read_header), but gives up at `deadline`
    /// however the bytes trickle in.
    ///
    /// The socket read timeout is shrunk to the time left before every
    /// read, so it stays shortened afterwards.
    pub fn read_header_before(&mut self, deadline: Instant) -> Result<Header> {
        self.fill_with(HEADER_SIZE, |stream| shrink_read_timeout(stream, deadline))?;
        self.take_header()
    }

    /// Like [`discard`](Self::discard), bounded by `deadline`.
    pub fn discard_before(&mut self, len: u32, deadline: Instant) -> Result<()> {
        let len = self.check_body_len(len)?;
        self.fill_with(len, |stream| shrink_read_timeout(stream, deadline))?;
        self.buf.advance(len);
        Ok(())
    }
}

fn shrink_read_timeout(stream: &mut ControlStream, deadline: Instant) -> Result<()> {
    let remaining = remaining_until(deadline)?;
    stream
        .set_read_timeout(Some(remaining))
        .map_err(transport_to_frame_error)
}

/// Time left before `deadline`, or a `TimedOut` error once it has passed.
pub(crate) fn remaining_until(deadline: Instant) -> Result<std::time::Duration> {
    let remaining = deadline.saturating_duration_since(Instant::now());
    if remaining.is_zero() {
        return Err(FrameError::Io(io::Error::new(
            ErrorKind::TimedOut,
            "exchange deadline elapsed",
        )));
    }
    Ok(remaining)
}

pub(crate) fn transport_to_frame_error(err: ctlwire_transport::TransportError) -> FrameError {
    match err {
        ctlwire_transport::TransportError::Io(io)
        | ctlwire_transport::TransportError::Accept(io) => FrameError::Io(io),
        ctlwire_transport::TransportError::Bind { source, .. }
        | ctlwire_transport::TransportError::Connect { source, .. }
        | ctlwire_transport::TransportError::Resolve { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
