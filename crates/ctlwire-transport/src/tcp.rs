use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::addr::EndpointAddr;
use crate::error::{Result, TransportError};
use crate::stream::ControlStream;

/// Connect deadline used when none is configured.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

/// Opens outbound control streams with a bounded connect deadline.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    connect_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl TcpConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout
    }

    /// Connect to `addr` (blocking, bounded by the connect timeout).
    ///
    /// Every resolved address is tried in order while budget remains; the
    /// last failure is reported if none accepts.
    pub fn connect(&self, addr: &EndpointAddr) -> Result<ControlStream> {
        let deadline = Instant::now() + self.connect_timeout;
        let candidates: Vec<SocketAddr> = (addr.host(), addr.port())
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                addr: addr.to_string(),
                source,
            })?
            .collect();

        if candidates.is_empty() {
            return Err(TransportError::Resolve {
                addr: addr.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "host resolved to no addresses",
                ),
            });
        }

        let mut last_err = None;
        for candidate in candidates {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            match TcpStream::connect_timeout(&candidate, remaining) {
                Ok(stream) => {
                    stream.set_nodelay(true)?;
                    debug!(%addr, %candidate, "connected");
                    return Ok(ControlStream::from_tcp(stream));
                }
                Err(err) => {
                    debug!(%addr, %candidate, error = %err, "connect attempt failed");
                    last_err = Some(err);
                }
            }
        }

        Err(TransportError::Connect {
            addr: addr.to_string(),
            source: last_err.unwrap_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "connect deadline elapsed")
            }),
        })
    }
}

/// Listening side of a control connection (backend role).
pub struct ControlListener {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl ControlListener {
    /// Bind to `host:port`. Port 0 picks an ephemeral port.
    pub fn bind(host: &str, port: u16) -> Result<Self> {
        let display = format!("{host}:{port}");
        let listener = TcpListener::bind((host, port)).map_err(|source| TransportError::Bind {
            addr: display.clone(),
            source,
        })?;
        let local_addr = listener
            .local_addr()
            .map_err(|source| TransportError::Bind {
                addr: display,
                source,
            })?;

        info!(%local_addr, "listening for control connections");

        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Accept an incoming connection (blocking unless non-blocking mode is set).
    pub fn accept(&self) -> Result<(ControlStream, SocketAddr)> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        debug!(%peer, "accepted connection");
        Ok((ControlStream::from_tcp(stream), peer))
    }

    /// Toggle non-blocking accept, for accept loops that poll a stop flag.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.listener
            .set_nonblocking(nonblocking)
            .map_err(Into::into)
    }

    /// The address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl std::fmt::Debug for ControlListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlListener")
            .field("local_addr", &self.local_addr)
            .finish()
    }
}
