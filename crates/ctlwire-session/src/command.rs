use std::fmt;

use ctlwire_frame::{CommandKind, ConfigMessage};

use crate::config::EndpointId;
use crate::state::HandshakeState;

/// Caller-supplied fields of a start/stop command.
///
/// The logging file list and metadata are sent empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandParams {
    pub logging_directory_path: String,
    pub logging_mode: u32,
    pub history_time: u32,
    pub follow_time: u32,
    pub split_time: u32,
    pub data_length: u32,
}

impl CommandParams {
    pub fn to_message(&self) -> ConfigMessage {
        ConfigMessage {
            logging_directory_path: self.logging_directory_path.clone(),
            logging_mode: self.logging_mode,
            history_time: self.history_time,
            follow_time: self.follow_time,
            split_time: self.split_time,
            data_length: self.data_length,
            ..ConfigMessage::default()
        }
    }
}

/// Why a command did not reach an endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The endpoint had not completed its handshake; nothing was sent.
    NotReady { state: HandshakeState },
    /// The send failed and the endpoint was demoted.
    Send(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::NotReady { state } => write!(f, "not ready ({state})"),
            FailureReason::Send(err) => write!(f, "send failed: {err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandFailure {
    pub id: EndpointId,
    pub reason: FailureReason,
}

/// Outcome of one broadcast.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandReport {
    pub kind: CommandKind,
    pub delivered: Vec<EndpointId>,
    pub failed: Vec<CommandFailure>,
}

impl CommandReport {
    pub fn new(kind: CommandKind) -> Self {
        Self {
            kind,
            delivered: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// True only if every configured endpoint accepted the command.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && !self.delivered.is_empty()
    }

    pub fn failed_ids(&self) -> Vec<EndpointId> {
        self.failed.iter().map(|failure| failure.id.clone()).collect()
    }
}

/// Start/stop recording toggle.
///
/// Flips only on a fully successful broadcast; a failed start leaves
/// recording off and a failed stop leaves it on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordingToggle {
    recording: bool,
}

impl RecordingToggle {
    pub fn is_recording(self) -> bool {
        self.recording
    }

    /// The command the next toggle press would send.
    pub fn next_command(self) -> CommandKind {
        if self.recording {
            CommandKind::Stop
        } else {
            CommandKind::Start
        }
    }

    /// Fold a broadcast outcome into the toggle. Returns the new state.
    pub fn apply(&mut self, report: &CommandReport) -> bool {
        if report.is_success() {
            self.recording = report.kind == CommandKind::Start;
        }
        self.recording
    }
}
