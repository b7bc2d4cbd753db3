use crate::core::line::LogEntry;
use serde::Serialize;
use std::fmt;

/// Session status enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    /// No device held
    #[default]
    Disconnected,
    /// A device is held but nothing is being logged
    Connected,
    /// The read loop is running and lines go to a log file
    Logging,
}

impl SessionState {
    pub fn has_device(&self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Logging)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::Connected => write!(f, "Connected"),
            SessionState::Logging => write!(f, "Logging"),
        }
    }
}

/// Output handed to the renderer, in production order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A classified device line
    Entry(LogEntry),
    /// Lifecycle status line such as "Logging started..."
    Status { message: String },
    /// Connection state transition
    StateChanged { state: SessionState, device: Option<String> },
    /// User comment recorded into the log
    Comment { text: String },
    /// Recoverable problem worth showing to the user
    Warning { message: String },
}

impl SessionEvent {
    pub fn status(message: impl Into<String>) -> Self {
        SessionEvent::Status {
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        SessionEvent::Warning {
            message: message.into(),
        }
    }
}
