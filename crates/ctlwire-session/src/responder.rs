use bytes::Bytes;
use ctlwire_frame::{
    decode_body, message_name, CommandKind, ConfigMessage, FrameConfig, FrameError, FrameReader,
    FrameWriter, MessageType,
};
use ctlwire_transport::ControlStream;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::sequence::SequenceCounter;

/// What the responder saw on one inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponderEvent {
    /// A handshake request was answered with its acknowledgement.
    Handshake {
        request: MessageType,
        sequence_number: u64,
    },
    /// A start/stop command with a well-formed body.
    Command {
        kind: CommandKind,
        sequence_number: u64,
        message: ConfigMessage,
    },
    /// A command whose body failed to decode.
    Malformed {
        message_type: u8,
        sequence_number: u64,
        error: String,
    },
    /// A message type the protocol does not define. Ignored.
    Unknown {
        message_type: u8,
        sequence_number: u64,
        body_length: u32,
    },
}

/// The backend side of the protocol for one accepted connection.
///
/// Answers type 1 with 2 and type 3 with 4, and decodes start/stop
/// command bodies. Acknowledgements carry the responder's own sequence
/// numbers.
pub struct BackendResponder {
    reader: FrameReader<ControlStream>,
    writer: FrameWriter<ControlStream>,
    sequence: SequenceCounter,
    reserved_body: Bytes,
}

impl BackendResponder {
    pub fn new(stream: ControlStream, config: FrameConfig) -> Result<Self> {
        let reader_stream = stream.try_clone()?;
        Ok(Self {
            reader: FrameReader::with_config_stream(reader_stream, config.clone())?,
            writer: FrameWriter::with_config_stream(stream, config)?,
            sequence: SequenceCounter::new(),
            reserved_body: Bytes::new(),
        })
    }

    /// Attach `body` to every acknowledgement as reserved bytes.
    pub fn with_reserved_body(mut self, body: impl Into<Bytes>) -> Self {
        self.reserved_body = body.into();
        self
    }

    /// Read one frame and respond to it if it is a handshake request.
    pub fn serve_one(&mut self) -> Result<ResponderEvent> {
        let frame = self.reader.read_frame()?;
        let header = frame.header;
        debug!(
            message_type = header.message_type,
            name = message_name(header.message_type),
            seq = header.sequence_number,
            body_length = header.body_length,
            "frame received"
        );

        let event = match MessageType::from_code(header.message_type) {
            Some(request) => match request.expected_ack() {
                Some(ack) => {
                    let seq = self.sequence.reserve();
                    self.writer
                        .send_message(ack.code(), seq, &self.reserved_body)?;
                    ResponderEvent::Handshake {
                        request,
                        sequence_number: header.sequence_number,
                    }
                }
                None => self.command_event(header.message_type, header.sequence_number, &frame.body),
            },
            None => ResponderEvent::Unknown {
                message_type: header.message_type,
                sequence_number: header.sequence_number,
                body_length: header.body_length,
            },
        };
        Ok(event)
    }

    /// Serve until the client disconnects, passing each event to `on_event`.
    pub fn serve<F>(&mut self, mut on_event: F) -> Result<()>
    where
        F: FnMut(&ResponderEvent),
    {
        loop {
            match self.serve_one() {
                Ok(event) => on_event(&event),
                Err(crate::SessionError::Frame(FrameError::ConnectionClosed)) => {
                    info!("client disconnected");
                    return Ok(());
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn command_event(&self, message_type: u8, sequence_number: u64, body: &[u8]) -> ResponderEvent {
        let Some(kind) = CommandKind::from_code(message_type) else {
            return ResponderEvent::Unknown {
                message_type,
                sequence_number,
                body_length: body.len() as u32,
            };
        };
        match decode_body(body) {
            Ok(message) => ResponderEvent::Command {
                kind,
                sequence_number,
                message,
            },
            Err(err) => {
                warn!(command = %kind, seq = sequence_number, error = %err, "malformed command body");
                ResponderEvent::Malformed {
                    message_type,
                    sequence_number,
                    error: err.to_string(),
                }
            }
        }
    }
}
