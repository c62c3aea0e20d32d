use std::mem;
use std::time::{Duration, Instant};

use ctlwire_frame::{
    CommandKind, ConfigMessage, FrameError, FrameReader, FrameWriter, Header, MessageType,
};
use ctlwire_transport::{ControlStream, EndpointAddr, TcpConnector, TransportError};
use tracing::{debug, info, warn};

use crate::config::{EndpointId, SessionOptions};
use crate::error::{Result, SessionError};
use crate::sequence::SequenceCounter;
use crate::state::HandshakeState;

/// An open connection to one endpoint. Dropping it closes the socket.
struct Link {
    reader: FrameReader<ControlStream>,
    writer: FrameWriter<ControlStream>,
}

impl Link {
    fn open(addr: &EndpointAddr, options: &SessionOptions) -> Result<Self> {
        let connector = TcpConnector::new(options.connect_timeout);
        let stream = connector
            .connect(addr)
            .map_err(|err| transport_error(err, options.connect_timeout))?;
        let reader_stream = stream.try_clone()?;

        let config = options.frame_config();
        let reader = FrameReader::with_config_stream(reader_stream, config.clone())?;
        let writer = FrameWriter::with_config_stream(stream, config)?;
        Ok(Self { reader, writer })
    }

    /// Send an empty-bodied request and wait for the response header.
    ///
    /// The send and the read share one deadline, so a peer that trickles
    /// bytes cannot stretch the exchange past `exchange.timeout`.
    fn request(&mut self, message_type: MessageType, seq: u64, exchange: &Exchange) -> Result<Header> {
        self.writer
            .send_message_before(message_type.code(), seq, &[], exchange.deadline)
            .map_err(|err| frame_error(err, exchange.timeout))?;
        self.reader
            .read_header_before(exchange.deadline)
            .map_err(|err| frame_error(err, exchange.timeout))
    }

    fn drain(&mut self, header: &Header, exchange: &Exchange) -> Result<()> {
        if header.body_length > 0 {
            self.reader
                .discard_before(header.body_length, exchange.deadline)
                .map_err(|err| frame_error(err, exchange.timeout))?;
        }
        Ok(())
    }
}

/// The time budget of one handshake step.
struct Exchange {
    timeout: Duration,
    deadline: Instant,
}

impl Exchange {
    fn start(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: Instant::now() + timeout,
        }
    }
}

/// Where the handshake stands, together with whatever it owns at that point.
enum Phase {
    Disconnected,
    Connecting(Link),
    AwaitingAck1(Link, Header),
    AwaitingAck2(Link),
    Ready(Link),
}

impl Phase {
    fn state(&self) -> HandshakeState {
        match self {
            Phase::Disconnected => HandshakeState::Disconnected,
            Phase::Connecting(_) => HandshakeState::Connecting,
            Phase::AwaitingAck1(..) => HandshakeState::AwaitingAck1,
            Phase::AwaitingAck2(_) => HandshakeState::AwaitingAck2,
            Phase::Ready(_) => HandshakeState::Ready,
        }
    }
}

/// One endpoint: its address, transport, sequence counter and handshake state.
///
/// The session advances by exactly one transition per [`step`](Self::step).
/// Any failure drops the transport and returns to `Disconnected`; the next
/// step reconnects.
pub struct EndpointSession {
    id: EndpointId,
    addr: EndpointAddr,
    options: SessionOptions,
    sequence: SequenceCounter,
    phase: Phase,
    last_error: Option<String>,
}

impl EndpointSession {
    pub fn new(id: EndpointId, addr: EndpointAddr, options: SessionOptions) -> Self {
        Self {
            id,
            addr,
            options,
            sequence: SequenceCounter::new(),
            phase: Phase::Disconnected,
            last_error: None,
        }
    }

    pub fn id(&self) -> &EndpointId {
        &self.id
    }

    pub fn addr(&self) -> &EndpointAddr {
        &self.addr
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn state(&self) -> HandshakeState {
        self.phase.state()
    }

    pub fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Last sequence number reserved and not rolled back.
    pub fn last_sequence(&self) -> u64 {
        self.sequence.last()
    }

    /// Description of the most recent failure, cleared on reaching `Ready`.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Change the host used by the next connection attempt.
    ///
    /// An established transport is left alone.
    pub fn set_host(&mut self, host: &str) -> Result<()> {
        self.addr = self.addr.with_host(host)?;
        Ok(())
    }

    pub(crate) fn set_addr(&mut self, addr: EndpointAddr) {
        self.addr = addr;
    }

    /// Drop the transport and return to `Disconnected`.
    pub fn disconnect(&mut self, reason: &str) {
        if !matches!(self.phase, Phase::Disconnected) {
            info!(endpoint = %self.id, reason, "endpoint disconnected");
        }
        self.phase = Phase::Disconnected;
    }

    /// Perform one handshake transition and return the resulting state.
    ///
    /// A `Ready` session is left untouched.
    pub fn step(&mut self) -> HandshakeState {
        self.phase = match mem::replace(&mut self.phase, Phase::Disconnected) {
            Phase::Disconnected => self.connect(),
            Phase::Connecting(link) => self.request_a(link),
            Phase::AwaitingAck1(link, header) => self.accept_ack_a(link, header),
            Phase::AwaitingAck2(link) => self.exchange_b(link),
            Phase::Ready(link) => Phase::Ready(link),
        };
        self.state()
    }

    /// Demote a `Ready` session whose peer has closed or reset the connection.
    ///
    /// Does not block. Other states are left alone.
    pub fn check_link(&mut self) -> HandshakeState {
        let Phase::Ready(link) = &self.phase else {
            return self.state();
        };
        let lost = match link.reader.get_ref().peer_closed() {
            Ok(false) => None,
            Ok(true) => Some(SessionError::Frame(FrameError::ConnectionClosed)),
            Err(err) => Some(SessionError::Transport(err)),
        };
        if let Some(err) = lost {
            self.phase = self.fail(err);
        }
        self.state()
    }

    /// Send a start/stop command. Only valid in `Ready`.
    ///
    /// Returns the sequence number used. A failed send rolls the number
    /// back and demotes the session to `Disconnected`.
    pub fn send_command(&mut self, kind: CommandKind, message: &ConfigMessage) -> Result<u64> {
        let state = self.state();
        if !state.is_ready() {
            return Err(SessionError::NotReady { state });
        }
        let body = message.to_bytes()?;

        let Phase::Ready(link) = &mut self.phase else {
            return Err(SessionError::NotReady { state });
        };
        let seq = self.sequence.reserve();
        let exchange = Exchange::start(self.options.io_timeout);
        let sent =
            link.writer
                .send_message_before(kind.message_type().code(), seq, &body, exchange.deadline);

        match sent {
            Ok(_) => {
                debug!(endpoint = %self.id, command = %kind, seq, body_length = body.len(), "command sent");
                Ok(seq)
            }
            Err(err) => {
                self.sequence.rollback();
                let err = frame_error(err, self.options.io_timeout);
                self.record_failure(&err);
                self.phase = Phase::Disconnected;
                Err(err)
            }
        }
    }

    fn connect(&mut self) -> Phase {
        if self.options.reset_sequence_on_reconnect {
            self.sequence.reset();
        }
        match Link::open(&self.addr, &self.options) {
            Ok(link) => {
                debug!(endpoint = %self.id, addr = %self.addr, "transport connected");
                Phase::Connecting(link)
            }
            Err(err) => self.fail(err),
        }
    }

    fn request_a(&mut self, mut link: Link) -> Phase {
        let seq = self.sequence.reserve();
        let exchange = Exchange::start(self.options.io_timeout);
        match link.request(MessageType::HandshakeRequestA, seq, &exchange) {
            Ok(header) => {
                debug!(endpoint = %self.id, seq, response_type = header.message_type, "first handshake response");
                Phase::AwaitingAck1(link, header)
            }
            Err(err) => {
                self.sequence.rollback();
                self.fail(err)
            }
        }
    }

    fn accept_ack_a(&mut self, mut link: Link, header: Header) -> Phase {
        if let Err(err) = expect_type(&header, MessageType::HandshakeAckA) {
            return self.fail(err);
        }
        match link.drain(&header, &Exchange::start(self.options.io_timeout)) {
            Ok(()) => Phase::AwaitingAck2(link),
            Err(err) => self.fail(err),
        }
    }

    fn exchange_b(&mut self, mut link: Link) -> Phase {
        let seq = self.sequence.reserve();
        let exchange = Exchange::start(self.options.io_timeout);
        let header = match link.request(MessageType::HandshakeRequestB, seq, &exchange) {
            Ok(header) => header,
            Err(err) => {
                self.sequence.rollback();
                return self.fail(err);
            }
        };

        let checked = expect_type(&header, MessageType::HandshakeAckB)
            .and_then(|()| link.drain(&header, &exchange));
        match checked {
            Ok(()) => {
                info!(endpoint = %self.id, addr = %self.addr, seq, "endpoint ready");
                self.last_error = None;
                Phase::Ready(link)
            }
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: SessionError) -> Phase {
        self.record_failure(&err);
        Phase::Disconnected
    }

    fn record_failure(&mut self, err: &SessionError) {
        warn!(endpoint = %self.id, addr = %self.addr, error = %err, "endpoint demoted to disconnected");
        self.last_error = Some(err.to_string());
    }
}

impl std::fmt::Debug for EndpointSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointSession")
            .field("id", &self.id)
            .field("addr", &self.addr)
            .field("state", &self.state())
            .field("last_sequence", &self.sequence.last())
            .finish()
    }
}

fn expect_type(header: &Header, expected: MessageType) -> Result<()> {
    if header.message_type == expected.code() {
        Ok(())
    } else {
        Err(SessionError::ProtocolViolation {
            expected,
            actual: header.message_type,
        })
    }
}

fn frame_error(err: FrameError, timeout: Duration) -> SessionError {
    if err.is_timeout() {
        SessionError::Timeout(timeout)
    } else {
        SessionError::Frame(err)
    }
}

fn transport_error(err: TransportError, timeout: Duration) -> SessionError {
    if err.is_timeout() {
        SessionError::Timeout(timeout)
    } else {
        SessionError::Transport(err)
    }
}
