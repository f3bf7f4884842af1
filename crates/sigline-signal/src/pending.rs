use std::collections::VecDeque;

use crate::envelope::IceCandidate;

/// Remote candidates held back until the remote description is applied.
///
/// Drained in arrival order.
#[derive(Debug, Default)]
pub struct PendingCandidates {
    queue: VecDeque<IceCandidate>,
}

impl PendingCandidates {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, candidate: IceCandidate) {
        self.queue.push_back(candidate);
    }

    /// Take every queued candidate, oldest first.
    pub fn drain(&mut self) -> impl Iterator<Item = IceCandidate> + '_ {
        self.queue.drain(..)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}
