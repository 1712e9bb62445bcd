use std::error::Error;
use std::fmt;
use std::sync::PoisonError;

use crate::core::dispatcher::BroadcastReport;

#[derive(Debug)]
pub enum DispatchError {
    // Transport errors (fatal to one connection only)
    Transport(String),
    ConnectionClosed,

    // Protocol errors (frame dropped, connection keeps reading)
    Protocol(String),
    MessageTooLarge(usize),

    // Lookup errors
    RecipientNotFound(String),
    RoomNotFound(String),
    ConnectionNotFound(String),
    DuplicateConnection(String),

    // Broadcast where at least one recipient failed
    PartialDelivery(BroadcastReport),

    // Configuration errors
    Config(String),

    // Lock errors
    Lock(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "Transport error: {}", msg),
            Self::ConnectionClosed => write!(f, "Connection closed"),
            Self::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            Self::MessageTooLarge(size) => write!(f, "Frame too large: {} bytes", size),
            Self::RecipientNotFound(id) => write!(f, "Recipient '{}' doesn't exist", id),
            Self::RoomNotFound(room) => write!(f, "Room '{}' doesn't exist", room),
            Self::ConnectionNotFound(id) => write!(f, "Connection '{}' not found", id),
            Self::DuplicateConnection(id) => write!(f, "Connection '{}' is already registered", id),
            Self::PartialDelivery(report) => write!(
                f,
                "Broadcast to room '{}' failed for {} of {} recipients",
                report.room,
                report.failed.len(),
                report.recipient_count()
            ),
            Self::Config(msg) => write!(f, "Configuration error: {}", msg),
            Self::Lock(msg) => write!(f, "Lock error: {}", msg),
        }
    }
}

impl Error for DispatchError {}

impl DispatchError {
    /// Whether the error is a lookup failure (unknown recipient, room or connection)
    pub fn is_lookup(&self) -> bool {
        matches!(
            self,
            Self::RecipientNotFound(_) | Self::RoomNotFound(_) | Self::ConnectionNotFound(_)
        )
    }
}

// Converting from PoisonError to facilitate poisoned lock handling
impl<T> From<PoisonError<T>> for DispatchError {
    fn from(err: PoisonError<T>) -> Self {
        DispatchError::Lock(format!("Lock poisoned: {}", err))
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Protocol(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
