use std::time::Duration;

use sigline_link::LinkError;

/// Errors that can occur while framing or reassembling messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The link failed a write, a subscription, or reported an inbound error.
    #[error("link error: {0}")]
    Link(#[from] LinkError),

    /// The unit size leaves no room for packet content.
    #[error("unit size {unit} too small (min {min})")]
    UnitTooSmall { unit: usize, min: usize },

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// A packet could not be interpreted; the partial message was discarded.
    #[error("corrupted packet sequence: {0}")]
    Corrupted(String),

    /// The packet sequence ended without a sentinel.
    #[error("packet sequence ended without sentinel ({buffered} bytes buffered)")]
    Incomplete { buffered: usize },

    /// No complete message arrived within the deadline.
    #[error("no complete message within {0:?}")]
    Timeout(Duration),

    /// The link subscription ended.
    #[error("link closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;
