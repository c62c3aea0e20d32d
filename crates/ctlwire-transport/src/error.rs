/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The endpoint address is not usable (empty host, port 0).
    #[error("invalid address {addr}: {reason}")]
    InvalidAddress { addr: String, reason: &'static str },

    /// Host name resolution failed or produced no addresses.
    #[error("failed to resolve {addr}: {source}")]
    Resolve {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to bind a listening socket.
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        source: std::io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(std::io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether the error is a deadline expiry rather than a hard failure.
    pub fn is_timeout(&self) -> bool {
        let source = match self {
            TransportError::Connect { source, .. } | TransportError::Io(source) => source,
            _ => return false,
        };
        matches!(
            source.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        )
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
