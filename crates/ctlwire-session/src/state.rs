use std::fmt;

use serde::Serialize;

/// Handshake progress of one endpoint.
///
/// `Disconnected` is both the initial state and the state every failure
/// returns to. `Ready` is the only state in which commands may be sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandshakeState {
    #[default]
    Disconnected,
    /// Transport open, first request not yet sent.
    Connecting,
    /// First response header received, not yet validated.
    AwaitingAck1,
    /// First exchange complete, second request not yet sent.
    AwaitingAck2,
    Ready,
}

impl HandshakeState {
    pub fn is_ready(self) -> bool {
        self == HandshakeState::Ready
    }

    pub fn as_str(self) -> &'static str {
        match self {
            HandshakeState::Disconnected => "disconnected",
            HandshakeState::Connecting => "connecting",
            HandshakeState::AwaitingAck1 => "awaiting_ack1",
            HandshakeState::AwaitingAck2 => "awaiting_ack2",
            HandshakeState::Ready => "ready",
        }
    }
}

impl fmt::Display for HandshakeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
