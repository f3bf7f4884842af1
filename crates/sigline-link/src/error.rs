/// Errors that can occur in link operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// A packet write was rejected or not confirmed by the link.
    #[error("link write failed: {0}")]
    Write(String),

    /// Subscribing to inbound packets failed.
    #[error("link subscribe failed: {0}")]
    Subscribe(String),

    /// The link reported an error on its inbound notification path.
    #[error("link notification error: {0}")]
    Notify(String),

    /// The packet does not fit in the link's current unit.
    #[error("packet too large for link ({size} bytes, max {max})")]
    PacketTooLarge { size: usize, max: usize },

    /// The link is no longer connected.
    #[error("link disconnected")]
    Disconnected,
}

pub type Result<T> = std::result::Result<T, LinkError>;
