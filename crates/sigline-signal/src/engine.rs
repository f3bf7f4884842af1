use std::sync::Arc;

use async_trait::async_trait;

use crate::envelope::{IceCandidate, SessionDescription};

/// Failure reported by a [`MediaEngine`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct EngineError {
    message: String,
}

impl EngineError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Receives local candidates as the engine discovers them.
pub type CandidateCallback = Box<dyn Fn(IceCandidate) + Send + Sync>;

/// The peer-connection engine whose descriptions and candidates are signaled.
///
/// Descriptions and candidates are opaque to the signaling layer; it only
/// sequences when each operation runs.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create the local offer. The engine is expected to adopt it as its
    /// local description.
    async fn create_local_offer(&self) -> Result<SessionDescription, EngineError>;

    /// Create the local answer to an applied remote offer. The engine is
    /// expected to adopt it as its local description.
    async fn create_local_answer(&self) -> Result<SessionDescription, EngineError>;

    async fn apply_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), EngineError>;

    /// Register the sink for locally discovered candidates. Replaces any
    /// previous sink.
    fn on_local_candidate(&self, callback: CandidateCallback);

    async fn apply_remote_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError>;
}

#[async_trait]
impl<E: MediaEngine + ?Sized> MediaEngine for Arc<E> {
    async fn create_local_offer(&self) -> Result<SessionDescription, EngineError> {
        (**self).create_local_offer().await
    }

    async fn create_local_answer(&self) -> Result<SessionDescription, EngineError> {
        (**self).create_local_answer().await
    }

    async fn apply_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), EngineError> {
        (**self).apply_remote_description(description).await
    }

    fn on_local_candidate(&self, callback: CandidateCallback) {
        (**self).on_local_candidate(callback)
    }

    async fn apply_remote_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        (**self).apply_remote_candidate(candidate).await
    }
}
