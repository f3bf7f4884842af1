use std::fmt;
use std::io;

use sigline::frame::FrameError;
use sigline::signal::{ErrorKind, SignalError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::InvalidInput => USAGE,
        io::ErrorKind::TimedOut => TIMEOUT,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    let code = match &err {
        FrameError::UnitTooSmall { .. } => USAGE,
        FrameError::MessageTooLarge { .. }
        | FrameError::Corrupted(_)
        | FrameError::Incomplete { .. } => DATA_INVALID,
        FrameError::Timeout(_) => TIMEOUT,
        FrameError::Link(_) | FrameError::ConnectionClosed => TRANSPORT_ERROR,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn kind_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Transport => TRANSPORT_ERROR,
        ErrorKind::Timeout => TIMEOUT,
        ErrorKind::Protocol => DATA_INVALID,
        ErrorKind::Application | ErrorKind::Cancelled => FAILURE,
        ErrorKind::Internal => INTERNAL,
    }
}

pub fn signal_error(context: &str, err: SignalError) -> CliError {
    match err {
        SignalError::Frame(err @ FrameError::UnitTooSmall { .. }) => frame_error(context, err),
        other => CliError::new(kind_code(other.kind()), format!("{context}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sigline::link::LinkError;

    use super::*;

    #[test]
    fn frame_errors_map_to_codes() {
        assert_eq!(
            frame_error("x", FrameError::UnitTooSmall { unit: 3, min: 5 }).code,
            USAGE
        );
        assert_eq!(
            frame_error("x", FrameError::Link(LinkError::Disconnected)).code,
            TRANSPORT_ERROR
        );
        assert_eq!(
            frame_error("x", FrameError::Timeout(Duration::from_secs(1))).code,
            TIMEOUT
        );
    }

    #[test]
    fn signal_errors_map_by_kind() {
        let err = SignalError::Timeout {
            waiting_for: "answer",
            after: Duration::from_secs(1),
        };
        let cli = signal_error("loopback", err);
        assert_eq!(cli.code, TIMEOUT);
        assert_eq!(cli.message, "loopback: no answer within 1s");

        assert_eq!(
            signal_error("x", SignalError::Protocol("glare".to_string())).code,
            DATA_INVALID
        );
        assert_eq!(
            signal_error("x", SignalError::Frame(FrameError::UnitTooSmall { unit: 3, min: 5 })).code,
            USAGE
        );
    }

    #[test]
    fn failed_states_map_to_codes() {
        assert_eq!(kind_code(ErrorKind::Cancelled), FAILURE);
        assert_eq!(kind_code(ErrorKind::Internal), INTERNAL);
    }
}
