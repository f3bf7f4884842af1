use std::fmt;
use std::time::Duration;

use sigline_frame::FrameError;

use crate::engine::EngineError;

/// Errors that end a signaling handshake.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Framing or link failure.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The expected description did not arrive in time.
    #[error("no {waiting_for} within {after:?}")]
    Timeout {
        waiting_for: &'static str,
        after: Duration,
    },

    /// The peer sent something the current state does not allow.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An envelope could not be encoded or decoded.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The media engine rejected an operation.
    #[error("media engine failed to {operation}: {source}")]
    Application {
        operation: &'static str,
        #[source]
        source: EngineError,
    },

    /// The session was cancelled by its owner.
    #[error("session cancelled")]
    Cancelled,
}

/// The coarse class of a [`SignalError`], reported through session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Transport,
    Timeout,
    Protocol,
    Application,
    Cancelled,
    /// The session task ended abnormally (it panicked).
    Internal,
}

impl SignalError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SignalError::Frame(FrameError::Timeout(_)) => ErrorKind::Timeout,
            SignalError::Frame(
                FrameError::Corrupted(_)
                | FrameError::MessageTooLarge { .. }
                | FrameError::Incomplete { .. },
            ) => ErrorKind::Protocol,
            SignalError::Frame(_) => ErrorKind::Transport,
            SignalError::Timeout { .. } => ErrorKind::Timeout,
            SignalError::Protocol(_) | SignalError::Json(_) => ErrorKind::Protocol,
            SignalError::Application { .. } => ErrorKind::Application,
            SignalError::Cancelled => ErrorKind::Cancelled,
        }
    }

    pub(crate) fn application(operation: &'static str) -> impl FnOnce(EngineError) -> Self {
        move |source| SignalError::Application { operation, source }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Transport => "transport",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Application => "application",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
        };
        f.write_str(name)
    }
}

pub type Result<T> = std::result::Result<T, SignalError>;
