use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::error::{LinkError, Result};
use crate::traits::{LinkEvent, LinkPort, Subscription, SubscriptionId};
use crate::LINK_HEADER_SIZE;

/// Subscribers of one end of the link.
#[derive(Default)]
struct Inbox {
    subscribers: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<LinkEvent>>>,
    next_id: AtomicU64,
}

impl Inbox {
    fn subscribe(&self) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().insert(id, tx);
        Subscription::new(id, rx)
    }

    fn deliver(&self, event: LinkEvent) {
        self.subscribers
            .lock()
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    fn close(&self) {
        self.subscribers.lock().clear();
    }
}

/// State both ends of a pair observe: the negotiated unit and the connection.
struct Shared {
    /// 0 means "unknown".
    unit_size: AtomicUsize,
    connected: AtomicBool,
}

/// One end of an in-process, ordered link pair.
///
/// Packets written on one end are delivered, in write order, to every
/// subscriber of the other end. The pair shares a unit size that can be
/// changed at runtime, mirroring an MTU renegotiation. Write failures and
/// inbound link errors can be injected for testing.
pub struct MemoryLink {
    inbox: Arc<Inbox>,
    peer_inbox: Arc<Inbox>,
    shared: Arc<Shared>,
    /// Remaining writes that succeed before every write fails.
    write_budget: Mutex<Option<usize>>,
    written: Mutex<Vec<Bytes>>,
}

impl MemoryLink {
    /// Create a connected pair. `unit_size` of `None` models a link that
    /// cannot report its unit.
    pub fn pair(unit_size: Option<usize>) -> (MemoryLink, MemoryLink) {
        let shared = Arc::new(Shared {
            unit_size: AtomicUsize::new(unit_size.unwrap_or(0)),
            connected: AtomicBool::new(true),
        });
        let left_inbox = Arc::new(Inbox::default());
        let right_inbox = Arc::new(Inbox::default());

        let left = MemoryLink {
            inbox: Arc::clone(&left_inbox),
            peer_inbox: Arc::clone(&right_inbox),
            shared: Arc::clone(&shared),
            write_budget: Mutex::new(None),
            written: Mutex::new(Vec::new()),
        };
        let right = MemoryLink {
            inbox: right_inbox,
            peer_inbox: left_inbox,
            shared,
            write_budget: Mutex::new(None),
            written: Mutex::new(Vec::new()),
        };
        (left, right)
    }

    /// Change the unit size for both ends.
    pub fn set_unit_size(&self, unit_size: Option<usize>) {
        debug!(?unit_size, "memory link unit size changed");
        self.shared
            .unit_size
            .store(unit_size.unwrap_or(0), Ordering::Release);
    }

    /// Let the next `count` writes on this end succeed, then fail every write.
    pub fn fail_writes_after(&self, count: usize) {
        *self.write_budget.lock() = Some(count);
    }

    /// Clear any injected write failure.
    pub fn heal_writes(&self) {
        *self.write_budget.lock() = None;
    }

    /// Deliver a link error to this end's subscribers.
    pub fn inject_error(&self, err: LinkError) {
        self.inbox.deliver(Err(err));
    }

    /// Deliver a raw packet to this end's subscribers, as if the peer wrote it.
    pub fn inject_packet(&self, packet: impl Into<Bytes>) {
        self.inbox.deliver(Ok(packet.into()));
    }

    /// Tear the link down. Subscriptions on both ends end and writes fail.
    pub fn disconnect(&self) {
        debug!("memory link disconnected");
        self.shared.connected.store(false, Ordering::Release);
        self.inbox.close();
        self.peer_inbox.close();
    }

    /// Whether the pair is still connected.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Every packet successfully written on this end, in wire order.
    pub fn written(&self) -> Vec<Bytes> {
        self.written.lock().clone()
    }

    /// Number of live subscriptions on this end.
    pub fn subscriber_count(&self) -> usize {
        self.inbox.subscribers.lock().len()
    }

    fn take_write_budget(&self) -> Result<()> {
        let mut budget = self.write_budget.lock();
        match budget.as_mut() {
            Some(0) => Err(LinkError::Write("write not confirmed".to_string())),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl LinkPort for MemoryLink {
    async fn write(&self, packet: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(LinkError::Disconnected);
        }
        if let Some(unit) = self.current_unit_size() {
            let max = unit.saturating_sub(LINK_HEADER_SIZE);
            if packet.len() > max {
                return Err(LinkError::PacketTooLarge {
                    size: packet.len(),
                    max,
                });
            }
        }
        self.take_write_budget()?;

        // Confirmation arrives asynchronously on a real link.
        tokio::task::yield_now().await;

        if !self.is_connected() {
            return Err(LinkError::Disconnected);
        }
        let mut written = self.written.lock();
        trace!(len = packet.len(), "memory link write");
        written.push(packet.clone());
        self.peer_inbox.deliver(Ok(packet));
        Ok(())
    }

    fn subscribe(&self) -> Result<Subscription> {
        if !self.is_connected() {
            return Err(LinkError::Subscribe("link is disconnected".to_string()));
        }
        Ok(self.inbox.subscribe())
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.inbox.subscribers.lock().remove(&id);
    }

    fn current_unit_size(&self) -> Option<usize> {
        match self.shared.unit_size.load(Ordering::Acquire) {
            0 => None,
            unit => Some(unit),
        }
    }
}

impl std::fmt::Debug for MemoryLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryLink")
            .field("unit_size", &self.current_unit_size())
            .field("connected", &self.is_connected())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
