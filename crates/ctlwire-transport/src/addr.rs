use std::fmt;

use crate::error::{Result, TransportError};

/// Host/port pair of one backend channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EndpointAddr {
    host: String,
    port: u16,
}

impl EndpointAddr {
    /// Build an address, rejecting an empty host or port 0.
    ///
    /// Surrounding whitespace in `host` is trimmed.
    pub fn new(host: impl AsRef<str>, port: u16) -> Result<Self> {
        let host = host.as_ref().trim();
        if host.is_empty() {
            return Err(TransportError::InvalidAddress {
                addr: format!(":{port}"),
                reason: "host must not be empty",
            });
        }
        if port == 0 {
            return Err(TransportError::InvalidAddress {
                addr: format!("{host}:0"),
                reason: "port must be in 1..=65535",
            });
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Same port, different host. Validation rules match [`EndpointAddr::new`].
    pub fn with_host(&self, host: impl AsRef<str>) -> Result<Self> {
        Self::new(host, self.port)
    }
}

impl fmt::Display for EndpointAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
