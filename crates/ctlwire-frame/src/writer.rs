use std::io::{ErrorKind, Write};
use std::time::Instant;

use bytes::BytesMut;
use ctlwire_transport::ControlStream;

use crate::codec::{encode_frame, Frame, FrameConfig, Header};
use crate::error::{FrameError, Result};
use crate::reader::{remaining_until, transport_to_frame_error};

const INITIAL_BUFFER_CAPACITY: usize = 1024;

/// Writes complete frames to any `Write` stream.
pub struct FrameWriter<T> {
    inner: T,
    buf: BytesMut,
    config: FrameConfig,
}

impl<T: Write> FrameWriter<T> {
    /// Create a new frame writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(INITIAL_BUFFER_CAPACITY),
            config,
        }
    }

    /// Write a complete frame (blocking).
    pub fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        self.send(&frame.header, frame.body.as_ref())
    }

    /// Stamp a fresh header for `body` and send it.
    pub fn send_message(&mut self, message_type: u8, sequence_number: u64, body: &[u8]) -> Result<Header> {
        let header = stamp(message_type, sequence_number, body)?;
        self.send(&header, body)?;
        Ok(header)
    }

    /// Encode and send a header and its body.
    ///
    /// The whole frame is assembled before the first byte is written.
    pub fn send(&mut self, header: &Header, body: &[u8]) -> Result<()> {
        self.send_with(header, body, |_| Ok(()))
    }

    fn send_with<F>(&mut self, header: &Header, body: &[u8], mut before_write: F) -> Result<()>
    where
        F: FnMut(&mut T) -> Result<()>,
    {
        if body.len() > self.config.max_body_size {
            return Err(FrameError::BodyTooLarge {
                size: body.len(),
                max: self.config.max_body_size,
            });
        }

        self.buf.clear();
        encode_frame(header, body, &mut self.buf)?;

        let mut offset = 0usize;
        while offset < self.buf.len() {
            before_write(&mut self.inner)?;
            match self.inner.write(&self.buf[offset..]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }

        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl FrameWriter<ControlStream> {
    /// Create a frame writer for `ControlStream` and apply write timeout from config.
    pub fn with_config_stream(inner: ControlStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }

    /// Like [`send_message`](Self::send_message), but gives up at `deadline`.
    ///
    /// The socket write timeout is shrunk to the time left before every write.
    pub fn send_message_before(
        &mut self,
        message_type: u8,
        sequence_number: u64,
        body: &[u8],
        deadline: Instant,
    ) -> Result<Header> {
        let header = stamp(message_type, sequence_number, body)?;
        self.send_with(&header, body, |stream| {
            let remaining = remaining_until(deadline)?;
            stream
                .set_write_timeout(Some(remaining))
                .map_err(transport_to_frame_error)
        })?;
        Ok(header)
    }
}

fn stamp(message_type: u8, sequence_number: u64, body: &[u8]) -> Result<Header> {
    let body_length = u32::try_from(body.len()).map_err(|_| FrameError::FieldTooLong {
        field: "body",
        len: body.len(),
    })?;
    Ok(Header::new(message_type, sequence_number, body_length))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use bytes::BytesMut;

    use super::*;
    use crate::codec::{decode_frame, HEADER_SIZE};

    #[test]
    fn write_single_frame() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));

        let header = writer.send_message(19, 5, b"hello").unwrap();
        assert_eq!(header.body_length, 5);

        let inner = writer.into_inner();
        let mut wire = BytesMut::from(inner.into_inner().as_slice());
        let frame = decode_frame(&mut wire, usize::MAX).unwrap().unwrap();
        assert_eq!(frame.header, header);
        assert_eq!(frame.body.as_ref(), b"hello");
    }

    #[test]
    fn empty_body_is_header_only() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        writer.send_message(1, 1, b"").unwrap();
        assert_eq!(writer.get_ref().get_ref().len(), HEADER_SIZE);
    }

    #[test]
    fn rejects_oversized_body() {
        let cfg = FrameConfig {
            max_body_size: 4,
            ..FrameConfig::default()
        };
        let mut writer = FrameWriter::with_config(Cursor::new(Vec::<u8>::new()), cfg);

        let err = writer.send_message(19, 1, b"too long").unwrap_err();
        assert!(matches!(err, FrameError::BodyTooLarge { size: 8, max: 4 }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn rejects_header_body_mismatch() {
        let mut writer = FrameWriter::new(Cursor::new(Vec::<u8>::new()));
        let header = Header::new(19, 1, 10);
        let err = writer.send(&header, b"short").unwrap_err();
        assert!(matches!(err, FrameError::LengthMismatch { .. }));
        assert!(writer.get_ref().get_ref().is_empty());
    }

    #[test]
    fn zero_write_reports_connection_closed() {
        let mut writer = FrameWriter::new(ZeroWriter);
        let err = writer.send_message(3, 2, b"").unwrap_err();
        assert!(matches!(err, FrameError::ConnectionClosed));
    }

    #[test]
    fn broken_pipe_is_io_error() {
        let mut writer = FrameWriter::new(BrokenWriter);
        let err = writer.send_message(3, 2, b"").unwrap_err();
        assert!(matches!(err, FrameError::Io(ref io) if io.kind() == ErrorKind::BrokenPipe));
    }

    #[test]
    fn deadline_send_over_tcp() {
        let listener = ctlwire_transport::ControlListener::bind("127.0.0.1", 0).unwrap();
        let addr =
            ctlwire_transport::EndpointAddr::new("127.0.0.1", listener.local_addr().port()).unwrap();
        let client = ctlwire_transport::TcpConnector::default()
            .connect(&addr)
            .unwrap();
        let (server, _) = listener.accept().unwrap();
        let mut writer = FrameWriter::new(client);

        let late = writer
            .send_message_before(1, 1, b"", Instant::now())
            .unwrap_err();
        assert!(late.is_timeout());

        let deadline = Instant::now() + std::time::Duration::from_secs(2);
        let header = writer.send_message_before(3, 2, b"", deadline).unwrap();
        let mut reader = crate::reader::FrameReader::new(server);
        assert_eq!(reader.read_frame().unwrap().header, header);
    }

    struct ZeroWriter;

    impl Write for ZeroWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Ok(0)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::BrokenPipe, "peer reset"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}
