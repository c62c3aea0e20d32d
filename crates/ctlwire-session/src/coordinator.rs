use ctlwire_frame::{CommandKind, ConfigMessage};
use ctlwire_transport::EndpointAddr;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::command::{CommandFailure, CommandParams, CommandReport, FailureReason};
use crate::config::{CoordinatorConfig, EndpointId, HostUpdate};
use crate::error::ConfigurationError;
use crate::events::{EventSink, NoopSink};
use crate::session::EndpointSession;
use crate::state::HandshakeState;

/// Result of one [`Coordinator::tick_with_report`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub all_ready: bool,
    /// Endpoints that moved forward this tick.
    pub advanced: usize,
    /// Endpoints that ended this tick in `Disconnected`.
    pub failed: Vec<EndpointId>,
}

/// Snapshot of one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EndpointStatus {
    pub id: EndpointId,
    pub host: String,
    pub port: u16,
    pub state: HandshakeState,
    pub last_sequence: u64,
    pub last_error: Option<String>,
}

/// Snapshot of one backend. Ready only when all of its endpoints are.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendStatus {
    pub name: String,
    pub host: String,
    pub ready: bool,
    pub endpoints: usize,
    pub ready_endpoints: usize,
}

/// Owns every endpoint session and aggregates their readiness.
///
/// All operations take `&mut self`, so ticks and broadcasts never overlap.
pub struct Coordinator {
    sessions: Vec<EndpointSession>,
    sink: Box<dyn EventSink>,
    all_ready: bool,
}

impl Coordinator {
    /// Validate `config` and create one disconnected session per endpoint.
    pub fn new(config: &CoordinatorConfig) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let options = config.session_options();

        let mut sessions = Vec::new();
        for (id, host) in config.endpoints() {
            let addr = EndpointAddr::new(host, id.port).map_err(|_| ConfigurationError::EmptyHost {
                backend: id.backend.clone(),
            })?;
            sessions.push(EndpointSession::new(id, addr, options.clone()));
        }

        Ok(Self {
            sessions,
            sink: Box::new(NoopSink),
            all_ready: false,
        })
    }

    /// Replace the event sink.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sink = Box::new(sink);
        self
    }

    pub fn set_sink(&mut self, sink: Box<dyn EventSink>) {
        self.sink = sink;
    }

    pub fn sessions(&self) -> &[EndpointSession] {
        &self.sessions
    }

    pub fn session(&self, id: &EndpointId) -> Option<&EndpointSession> {
        self.sessions.iter().find(|session| session.id() == id)
    }

    pub fn is_all_ready(&self) -> bool {
        self.all_ready
    }

    /// Whether any endpoint still needs ticking.
    pub fn needs_polling(&self) -> bool {
        !self.all_ready
    }

    /// Advance every non-ready endpoint by one step. Returns whether all are ready.
    pub fn tick(&mut self) -> bool {
        self.tick_with_report().all_ready
    }

    /// Like [`tick`](Self::tick), with per-endpoint detail.
    pub fn tick_with_report(&mut self) -> TickReport {
        let mut report = TickReport::default();

        for session in &mut self.sessions {
            if session.is_ready() {
                continue;
            }
            let state = session.step();
            if state == HandshakeState::Disconnected {
                report.failed.push(session.id().clone());
            } else {
                report.advanced += 1;
            }
            if state.is_ready() {
                self.sink.readiness_changed(session.id(), true);
            }
        }

        report.all_ready = self.refresh_readiness();
        debug!(
            all_ready = report.all_ready,
            advanced = report.advanced,
            failed = report.failed.len(),
            "tick complete"
        );
        report
    }

    /// Demote every ready endpoint whose peer has gone away, without blocking.
    ///
    /// Returns the number of endpoints demoted. Polling has to be restarted
    /// by the caller to bring them back.
    pub fn check_links(&mut self) -> usize {
        let mut lost = 0;
        for session in &mut self.sessions {
            if !session.is_ready() {
                continue;
            }
            if !session.check_link().is_ready() {
                lost += 1;
                self.sink.readiness_changed(session.id(), false);
            }
        }
        if lost > 0 {
            self.refresh_readiness();
        }
        lost
    }

    /// Send a start/stop command built from `params` to every ready endpoint.
    pub fn broadcast_command(&mut self, kind: CommandKind, params: &CommandParams) -> CommandReport {
        self.broadcast_message(kind, &params.to_message())
    }

    /// Send `message` as a `kind` command to every ready endpoint.
    ///
    /// Endpoints are attempted in order and one failure never stops
    /// delivery to the rest. Endpoints that are not ready are reported as
    /// failed without an attempt.
    pub fn broadcast_message(&mut self, kind: CommandKind, message: &ConfigMessage) -> CommandReport {
        let mut report = CommandReport::new(kind);

        for session in &mut self.sessions {
            let state = session.state();
            if !state.is_ready() {
                report.failed.push(CommandFailure {
                    id: session.id().clone(),
                    reason: FailureReason::NotReady { state },
                });
                continue;
            }

            match session.send_command(kind, message) {
                Ok(seq) => {
                    debug!(endpoint = %session.id(), command = %kind, seq, "command delivered");
                    report.delivered.push(session.id().clone());
                }
                Err(err) => {
                    report.failed.push(CommandFailure {
                        id: session.id().clone(),
                        reason: FailureReason::Send(err.to_string()),
                    });
                    if !session.is_ready() {
                        self.sink.readiness_changed(session.id(), false);
                    }
                }
            }
        }

        self.refresh_readiness();
        let failed = report.failed_ids();
        if failed.is_empty() {
            info!(command = %kind, delivered = report.delivered.len(), "broadcast complete");
        } else {
            warn!(command = %kind, delivered = report.delivered.len(), failed = failed.len(), "broadcast incomplete");
        }
        self.sink.command_result(kind, &failed);
        report
    }

    /// Replace the host of every endpoint of each named backend.
    ///
    /// Every update is validated before any is applied, so a rejected
    /// batch leaves all endpoints untouched. Established sessions keep
    /// their transport; the new host is used on the next reconnection.
    /// Returns the number of endpoints updated.
    pub fn apply_configuration(&mut self, updates: &[HostUpdate]) -> Result<usize, ConfigurationError> {
        let mut staged: Vec<(usize, EndpointAddr)> = Vec::new();

        for update in updates {
            let host = update.host.trim();
            if host.is_empty() {
                return Err(ConfigurationError::EmptyHost {
                    backend: update.backend.clone(),
                });
            }

            let before = staged.len();
            for (index, session) in self.sessions.iter().enumerate() {
                if session.id().backend != update.backend {
                    continue;
                }
                let addr = session.addr().with_host(host).map_err(|_| ConfigurationError::EmptyHost {
                    backend: update.backend.clone(),
                })?;
                staged.push((index, addr));
            }
            if staged.len() == before {
                return Err(ConfigurationError::UnknownBackend(update.backend.clone()));
            }
        }

        let count = staged.len();
        for (index, addr) in staged {
            let session = &mut self.sessions[index];
            info!(endpoint = %session.id(), host = addr.host(), "endpoint host updated");
            session.set_addr(addr);
        }
        Ok(count)
    }

    /// Drop the transport of one endpoint.
    pub fn disconnect(&mut self, id: &EndpointId, reason: &str) -> bool {
        let Some(session) = self.sessions.iter_mut().find(|session| session.id() == id) else {
            return false;
        };
        let was_ready = session.is_ready();
        session.disconnect(reason);
        if was_ready {
            self.sink.readiness_changed(id, false);
        }
        self.refresh_readiness();
        true
    }

    pub fn statuses(&self) -> Vec<EndpointStatus> {
        self.sessions
            .iter()
            .map(|session| EndpointStatus {
                id: session.id().clone(),
                host: session.addr().host().to_string(),
                port: session.addr().port(),
                state: session.state(),
                last_sequence: session.last_sequence(),
                last_error: session.last_error().map(str::to_string),
            })
            .collect()
    }

    /// Per-backend readiness, in configuration order.
    pub fn backend_statuses(&self) -> Vec<BackendStatus> {
        let mut backends: Vec<BackendStatus> = Vec::new();
        for session in &self.sessions {
            let ready = session.is_ready();
            match backends
                .iter_mut()
                .find(|backend| backend.name == session.id().backend)
            {
                Some(backend) => {
                    backend.endpoints += 1;
                    backend.ready_endpoints += usize::from(ready);
                    backend.ready &= ready;
                }
                None => backends.push(BackendStatus {
                    name: session.id().backend.clone(),
                    host: session.addr().host().to_string(),
                    ready,
                    endpoints: 1,
                    ready_endpoints: usize::from(ready),
                }),
            }
        }
        backends
    }

    /// Close every transport.
    pub fn shutdown(&mut self) {
        for session in &mut self.sessions {
            let was_ready = session.is_ready();
            session.disconnect("shutdown");
            if was_ready {
                self.sink.readiness_changed(session.id(), false);
            }
        }
        self.all_ready = false;
    }

    fn refresh_readiness(&mut self) -> bool {
        let now = !self.sessions.is_empty() && self.sessions.iter().all(EndpointSession::is_ready);
        if now && !self.all_ready {
            info!(endpoints = self.sessions.len(), "all endpoints ready");
            self.sink.all_ready();
        } else if !now && self.all_ready {
            warn!("aggregate readiness lost");
        }
        self.all_ready = now;
        now
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("sessions", &self.sessions)
            .field("all_ready", &self.all_ready)
            .finish()
    }
}
