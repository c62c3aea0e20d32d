//! Endpoint sessions and readiness coordination for the ctlwire protocol.
//!
//! This is the "just works" layer. Configure a set of backend endpoints,
//! tick the [`Coordinator`] until every endpoint has completed its two-step
//! handshake, then broadcast start/stop recording commands.
//!
//! - [`EndpointSession`] — one endpoint's transport, sequence counter and
//!   handshake state machine
//! - [`Coordinator`] — aggregate readiness, command broadcast, host updates
//! - [`PollScheduler`] — drives ticks according to a [`ReconnectPolicy`]
//! - [`BackendResponder`] — the answering side of the protocol

pub mod command;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod responder;
pub mod scheduler;
pub mod sequence;
pub mod session;
pub mod state;

pub use command::{CommandFailure, CommandParams, CommandReport, FailureReason, RecordingToggle};
pub use config::{
    BackendConfig, CoordinatorConfig, EndpointId, HostUpdate, ReconnectPolicy, SessionOptions,
};
pub use coordinator::{BackendStatus, Coordinator, EndpointStatus, TickReport};
pub use error::{ConfigurationError, Result, SessionError};
pub use events::{ChannelSink, CoordinatorEvent, EventSink, NoopSink, TracingSink};
pub use responder::{BackendResponder, ResponderEvent};
pub use scheduler::{CancelToken, PollOutcome, PollScheduler};
pub use sequence::SequenceCounter;
pub use session::EndpointSession;
pub use state::HandshakeState;
