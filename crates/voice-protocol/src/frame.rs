//! Transport frames and the decoded inbound units they carry.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// WebSocket close codes used by the session (RFC 6455 section 7.4.1).
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Server is going away (shutdown).
    pub const GOING_AWAY: u16 = 1001;
    /// Endpoint received a data type it cannot accept.
    pub const UNSUPPORTED_DATA: u16 = 1003;
    /// Endpoint received a message that violates its policy.
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Endpoint hit an unexpected condition.
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Close frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: u16,
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// `1003` close sent when the first unit is not audio.
    #[must_use]
    pub fn unsupported_data() -> Self {
        Self::new(close_code::UNSUPPORTED_DATA, "unsupported data")
    }
}

/// A transport-neutral frame as seen on the socket.
///
/// The service maps its WebSocket library's message type to and from this
/// so the session logic can be driven by plain channels in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireFrame {
    Binary(Bytes),
    Text(String),
    Ping(Bytes),
    Pong(Bytes),
    Close(Option<CloseFrame>),
}

/// A binary audio chunk received from the client.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundAudioFrame {
    pub bytes: Bytes,
    pub received_at: DateTime<Utc>,
}

/// Why an inbound frame could not be interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedFrame {
    pub reason: String,
}

/// Decoded inbound unit.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundFrame {
    /// Binary audio chunk.
    Audio(InboundAudioFrame),
    /// Client asked to end the session (close frame or text control).
    Disconnect { code: Option<u16> },
    /// Client liveness probe sent as a text control message.
    Heartbeat,
    /// Transport-level ping/pong; carries no application data.
    Keepalive,
    /// Anything else. Non-fatal.
    Malformed(MalformedFrame),
}

impl InboundFrame {
    /// True only for binary audio.
    #[must_use]
    pub const fn is_audio(&self) -> bool {
        matches!(self, InboundFrame::Audio(_))
    }
}
