//! Message type discriminators.
//!
//! The header carries the type as a single byte. Unknown values decode
//! fine at the codec level; rejecting them is up to whoever expects a
//! specific response.

use std::fmt;

/// Handshake request, first exchange.
pub const HANDSHAKE_REQUEST_A: u8 = 1;

/// Handshake acknowledgement, first exchange.
pub const HANDSHAKE_ACK_A: u8 = 2;

/// Handshake request, second exchange.
pub const HANDSHAKE_REQUEST_B: u8 = 3;

/// Handshake acknowledgement, second exchange.
pub const HANDSHAKE_ACK_B: u8 = 4;

/// Start data recording.
pub const START_RECORDING: u8 = 19;

/// Stop data recording.
pub const STOP_RECORDING: u8 = 21;

/// Known message kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    HandshakeRequestA,
    HandshakeAckA,
    HandshakeRequestB,
    HandshakeAckB,
    StartRecording,
    StopRecording,
}

impl MessageType {
    /// Wire value of this message type.
    pub const fn code(self) -> u8 {
        match self {
            MessageType::HandshakeRequestA => HANDSHAKE_REQUEST_A,
            MessageType::HandshakeAckA => HANDSHAKE_ACK_A,
            MessageType::HandshakeRequestB => HANDSHAKE_REQUEST_B,
            MessageType::HandshakeAckB => HANDSHAKE_ACK_B,
            MessageType::StartRecording => START_RECORDING,
            MessageType::StopRecording => STOP_RECORDING,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            HANDSHAKE_REQUEST_A => Some(MessageType::HandshakeRequestA),
            HANDSHAKE_ACK_A => Some(MessageType::HandshakeAckA),
            HANDSHAKE_REQUEST_B => Some(MessageType::HandshakeRequestB),
            HANDSHAKE_ACK_B => Some(MessageType::HandshakeAckB),
            START_RECORDING => Some(MessageType::StartRecording),
            STOP_RECORDING => Some(MessageType::StopRecording),
            _ => None,
        }
    }

    /// The acknowledgement a counterpart must send back, for handshake requests.
    pub fn expected_ack(self) -> Option<MessageType> {
        match self {
            MessageType::HandshakeRequestA => Some(MessageType::HandshakeAckA),
            MessageType::HandshakeRequestB => Some(MessageType::HandshakeAckB),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(message_name(self.code()))
    }
}

/// Post-handshake command carried by a configuration message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Start,
    Stop,
}

impl CommandKind {
    pub const fn message_type(self) -> MessageType {
        match self {
            CommandKind::Start => MessageType::StartRecording,
            CommandKind::Stop => MessageType::StopRecording,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            START_RECORDING => Some(CommandKind::Start),
            STOP_RECORDING => Some(CommandKind::Stop),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::Start => "start",
            CommandKind::Stop => "stop",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns a human-readable name for a message type code.
pub fn message_name(code: u8) -> &'static str {
    match code {
        HANDSHAKE_REQUEST_A => "HANDSHAKE_REQUEST_A",
        HANDSHAKE_ACK_A => "HANDSHAKE_ACK_A",
        HANDSHAKE_REQUEST_B => "HANDSHAKE_REQUEST_B",
        HANDSHAKE_ACK_B => "HANDSHAKE_ACK_B",
        START_RECORDING => "START_RECORDING",
        STOP_RECORDING => "STOP_RECORDING",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_wire_values() {
        assert_eq!(MessageType::HandshakeRequestA.code(), 1);
        assert_eq!(MessageType::HandshakeAckA.code(), 2);
        assert_eq!(MessageType::HandshakeRequestB.code(), 3);
        assert_eq!(MessageType::HandshakeAckB.code(), 4);
        assert_eq!(CommandKind::Start.message_type().code(), 19);
        assert_eq!(CommandKind::Stop.message_type().code(), 21);
    }

    #[test]
    fn unknown_codes_have_no_type() {
        assert_eq!(MessageType::from_code(0), None);
        assert_eq!(MessageType::from_code(20), None);
        assert_eq!(message_name(20), "UNKNOWN");
        assert_eq!(CommandKind::from_code(2), None);
    }

    #[test]
    fn handshake_requests_pair_with_acks() {
        assert_eq!(
            MessageType::HandshakeRequestA.expected_ack(),
            Some(MessageType::HandshakeAckA)
        );
        assert_eq!(
            MessageType::HandshakeRequestB.expected_ack(),
            Some(MessageType::HandshakeAckB)
        );
        assert_eq!(MessageType::StartRecording.expected_ack(), None);
    }
}
