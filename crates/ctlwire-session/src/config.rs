use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::time::Duration;

use ctlwire_frame::{FrameConfig, DEFAULT_MAX_BODY};
use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 500;
const DEFAULT_IO_TIMEOUT_MS: u64 = 500;
const DEFAULT_INTERVAL_MS: u64 = 1000;
const DEFAULT_MAX_INTERVAL_MS: u64 = 10_000;

/// Identity of one endpoint: a backend name plus one of its ports.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EndpointId {
    pub backend: String,
    pub port: u16,
}

impl EndpointId {
    pub fn new(backend: impl Into<String>, port: u16) -> Self {
        Self {
            backend: backend.into(),
            port,
        }
    }
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.port)
    }
}

/// One backend host and the logical channel ports it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendConfig {
    pub name: String,
    pub host: String,
    pub ports: Vec<u16>,
}

impl BackendConfig {
    pub fn new(name: impl Into<String>, host: impl Into<String>, ports: Vec<u16>) -> Self {
        Self {
            name: name.into(),
            host: host.into(),
            ports,
        }
    }
}

/// Retry timing for the poll scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay between ticks while endpoints are making progress.
    pub interval_ms: u64,
    /// Growth factor applied after a tick that only failed. 1.0 keeps the interval constant.
    pub backoff_multiplier: f64,
    /// Upper bound on the backed-off delay.
    pub max_interval_ms: u64,
    /// Give up after this many ticks without reaching readiness. `None` retries forever.
    pub max_attempts: Option<u32>,
    /// Stop polling once every endpoint is ready.
    pub stop_when_ready: bool,
    /// Restart sequence numbering at 1 on every new connection.
    pub reset_sequence_on_reconnect: bool,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            backoff_multiplier: 1.0,
            max_interval_ms: DEFAULT_MAX_INTERVAL_MS,
            max_attempts: None,
            stop_when_ready: true,
            reset_sequence_on_reconnect: false,
        }
    }
}

impl ReconnectPolicy {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    /// The backoff cap, never below the base interval.
    pub fn max_interval(&self) -> Duration {
        Duration::from_millis(self.max_interval_ms.max(self.interval_ms))
    }
}

/// Complete coordinator configuration, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    pub backends: Vec<BackendConfig>,
    pub connect_timeout_ms: u64,
    pub io_timeout_ms: u64,
    pub max_body_size: usize,
    pub reconnect: ReconnectPolicy,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            backends: vec![
                BackendConfig::new("Backend 1", "localhost", vec![9090, 9091]),
                BackendConfig::new("Backend 2", "localhost", vec![9092, 9093]),
            ],
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            max_body_size: DEFAULT_MAX_BODY,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigurationError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    /// Parse and validate a JSON document.
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigurationError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check hosts, ports and endpoint uniqueness.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut seen = HashSet::new();
        for backend in &self.backends {
            if backend.host.trim().is_empty() {
                return Err(ConfigurationError::EmptyHost {
                    backend: backend.name.clone(),
                });
            }
            for &port in &backend.ports {
                if port == 0 {
                    return Err(ConfigurationError::InvalidPort {
                        backend: backend.name.clone(),
                        port,
                    });
                }
                let id = EndpointId::new(backend.name.clone(), port);
                if !seen.insert(id.clone()) {
                    return Err(ConfigurationError::DuplicateEndpoint(id));
                }
            }
        }
        if seen.is_empty() {
            return Err(ConfigurationError::NoEndpoints);
        }
        Ok(())
    }

    /// Every configured endpoint with its host, in configuration order.
    pub fn endpoints(&self) -> Vec<(EndpointId, &str)> {
        self.backends
            .iter()
            .flat_map(|backend| {
                backend
                    .ports
                    .iter()
                    .map(move |&port| (EndpointId::new(backend.name.clone(), port), backend.host.trim()))
            })
            .collect()
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            io_timeout: Duration::from_millis(self.io_timeout_ms),
            max_body_size: self.max_body_size,
            reset_sequence_on_reconnect: self.reconnect.reset_sequence_on_reconnect,
        }
    }
}

/// Per-session timing and limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub connect_timeout: Duration,
    /// Deadline for every individual read and write.
    pub io_timeout: Duration,
    pub max_body_size: usize,
    pub reset_sequence_on_reconnect: bool,
}

impl Default for SessionOptions {
    fn default() -> Self {
        CoordinatorConfig::default().session_options()
    }
}

impl SessionOptions {
    pub fn frame_config(&self) -> FrameConfig {
        FrameConfig {
            max_body_size: self.max_body_size,
            ..FrameConfig::with_io_timeout(self.io_timeout)
        }
    }
}

/// A new host for every endpoint of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostUpdate {
    pub backend: String,
    pub host: String,
}

impl HostUpdate {
    pub fn new(backend: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            host: host.into(),
        }
    }
}
