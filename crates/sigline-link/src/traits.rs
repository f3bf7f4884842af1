use std::task::{Context, Poll};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{LinkError, Result};

/// Identifies one subscription on a link.
pub type SubscriptionId = u64;

/// One inbound event delivered to a subscriber: a packet or a link error.
pub type LinkEvent = std::result::Result<Bytes, LinkError>;

/// A live subscription to a link's inbound packets.
///
/// Events arrive in the order the link delivered them. The stream ends
/// (`recv` returns `None`) when the link disconnects or the subscription is
/// removed with [`LinkPort::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    events: mpsc::UnboundedReceiver<LinkEvent>,
}

impl Subscription {
    /// Wrap a receiver handed out by a link implementation.
    pub fn new(id: SubscriptionId, events: mpsc::UnboundedReceiver<LinkEvent>) -> Self {
        Self { id, events }
    }

    /// The handle to pass to [`LinkPort::unsubscribe`].
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next inbound event.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.events.recv().await
    }

    /// Poll for the next inbound event.
    pub fn poll_recv(&mut self, cx: &mut Context<'_>) -> Poll<Option<LinkEvent>> {
        self.events.poll_recv(cx)
    }

    /// Drop any events that were delivered but not consumed yet.
    pub fn drain(&mut self) -> usize {
        let mut dropped = 0;
        while self.events.try_recv().is_ok() {
            dropped += 1;
        }
        dropped
    }
}

/// The transport seam every higher layer writes to and reads from.
///
/// Implemented by the concrete medium (a GATT characteristic pair, a serial
/// line, [`crate::MemoryLink`]). Packets must be delivered to subscribers in
/// the order they were written.
#[async_trait]
pub trait LinkPort: Send + Sync {
    /// Write one packet. Completes once the link confirms the write was
    /// delivered or attempted, not when the peer application consumed it.
    async fn write(&self, packet: Bytes) -> Result<()>;

    /// Subscribe to inbound packets.
    fn subscribe(&self) -> Result<Subscription>;

    /// Remove a subscription. Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);

    /// The unit size currently negotiated on the link, if known.
    fn current_unit_size(&self) -> Option<usize>;
}

#[async_trait]
impl<L: LinkPort + ?Sized> LinkPort for std::sync::Arc<L> {
    async fn write(&self, packet: Bytes) -> Result<()> {
        (**self).write(packet).await
    }

    fn subscribe(&self) -> Result<Subscription> {
        (**self).subscribe()
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        (**self).unsubscribe(id)
    }

    fn current_unit_size(&self) -> Option<usize> {
        (**self).current_unit_size()
    }
}
