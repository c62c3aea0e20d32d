use std::path::PathBuf;
use std::time::Duration;

use ctlwire_frame::MessageType;

use crate::config::EndpointId;
use crate::state::HandshakeState;

/// Errors that can occur while driving an endpoint session.
///
/// Every variant is recoverable: the session is demoted to
/// `Disconnected` and the next tick retries.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Transport-level error (connect, resolve, socket options).
    #[error("transport error: {0}")]
    Transport(#[from] ctlwire_transport::TransportError),

    /// Frame-level error (malformed data, closed connection, I/O).
    #[error("frame error: {0}")]
    Frame(#[from] ctlwire_frame::FrameError),

    /// The peer answered a handshake request with the wrong message type.
    #[error("protocol violation: expected {expected}, received message type {actual}")]
    ProtocolViolation { expected: MessageType, actual: u8 },

    /// A connect, read or write deadline expired.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A command was attempted on an endpoint that has not completed its handshake.
    #[error("endpoint not ready (state: {state})")]
    NotReady { state: HandshakeState },
}

impl SessionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, SessionError::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// Invalid user-supplied configuration. Rejected before any state changes.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("host for backend '{backend}' must not be empty")]
    EmptyHost { backend: String },

    #[error("unknown backend '{0}'")]
    UnknownBackend(String),

    #[error("invalid port {port} for backend '{backend}' (expected 1-65535)")]
    InvalidPort { backend: String, port: u16 },

    #[error("no endpoints configured")]
    NoEndpoints,

    #[error("endpoint {0} configured more than once")]
    DuplicateEndpoint(EndpointId),

    #[error("failed to read configuration file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
