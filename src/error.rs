use thiserror::Error;

/// Failure to establish a bus session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("cannot resolve broker {host}: {reason}")]
    Dns { host: String, reason: String },

    #[error("broker refused connection: {0}")]
    Refused(String),

    #[error("broker rejected credentials: {0}")]
    Auth(String),

    #[error("no CONNACK/SUBACK within {0}s")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(String),

    #[error("unexpected broker reply: {0}")]
    Protocol(String),

    #[error("session already connected")]
    AlreadyConnected,
}

/// The local session refused a write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    #[error("not connected")]
    NotConnected,

    #[error("session closed: {0}")]
    SessionClosed(String),
}

/// Malformed payload from the device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("empty payload")]
    Empty,

    #[error("{kind} payload too short: expected {expected} bytes, got {actual}")]
    TooShort {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("unknown record kind 0x{0:02x}")]
    UnknownKind(u8),

    #[error("unsupported frame version {0}")]
    UnsupportedVersion(u8),
}

/// A command that cannot be put on the wire.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("command arguments are {len} bytes, at most {max} fit in a frame")]
    ArgsTooLong { len: usize, max: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BridgeError {
    #[error("no reply from charger within {0:?}")]
    Timeout(std::time::Duration),

    #[error("bus session dropped while awaiting reply")]
    Disconnected,

    #[error("a request for charger {0} is already in flight")]
    AlreadyInFlight(String),

    #[error("publish failed: {0}")]
    Publish(#[from] PublishError),

    #[error("cannot encode command: {0}")]
    Encode(#[from] EncodeError),

    #[error("undecodable reply: {0}")]
    Decode(#[from] DecodeError),

    #[error("expected {expected} reply, got {actual}")]
    UnexpectedReply {
        expected: &'static str,
        actual: &'static str,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardianError {
    #[error("connect failed: {0}")]
    ConnectFailed(#[from] ConnectError),
}

/// Top-level error surfaced to the poller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    Guardian(#[from] GuardianError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error("a poll cycle is already running")]
    CycleInFlight,
}

/// How the caller should treat a failed exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Bus connectivity is broken; fail the cycle.
    Fatal,
    /// The bus works but the charger did not answer.
    DeviceUnresponsive,
    /// A reply arrived but could not be used.
    MalformedReply,
    /// Overlapping call; retry on the next cycle, not in a loop.
    Busy,
    /// The command was rejected before anything was sent.
    InvalidRequest,
}

impl FailureClass {
    pub fn is_fatal(&self) -> bool {
        *self == FailureClass::Fatal
    }
}

impl BridgeError {
    pub fn class(&self) -> FailureClass {
        match self {
            BridgeError::Timeout(_) => FailureClass::DeviceUnresponsive,
            BridgeError::Disconnected | BridgeError::Publish(_) => FailureClass::Fatal,
            BridgeError::AlreadyInFlight(_) => FailureClass::Busy,
            BridgeError::Encode(_) => FailureClass::InvalidRequest,
            BridgeError::Decode(_) | BridgeError::UnexpectedReply { .. } => {
                FailureClass::MalformedReply
            }
        }
    }

    /// True when the session must be rebuilt before the next exchange.
    pub fn session_lost(&self) -> bool {
        matches!(self, BridgeError::Disconnected | BridgeError::Publish(_))
    }
}

impl Error {
    pub fn class(&self) -> FailureClass {
        match self {
            Error::Guardian(_) => FailureClass::Fatal,
            Error::Bridge(e) => e.class(),
            Error::CycleInFlight => FailureClass::Busy,
        }
    }
}
