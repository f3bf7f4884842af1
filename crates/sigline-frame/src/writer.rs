use std::sync::Arc;

use bytes::Bytes;
use sigline_link::LinkPort;
use tokio::sync::Mutex;
use tracing::{debug, trace, warn};

use crate::codec::{chunk, FrameConfig};
use crate::error::{FrameError, Result};

/// Writes complete messages to a link as ordered packet sequences.
///
/// Clones share one send lock, so packets of two messages are never
/// interleaved on the link no matter how many tasks send concurrently.
pub struct FrameWriter<L: ?Sized> {
    link: Arc<L>,
    send_lock: Arc<Mutex<()>>,
    config: FrameConfig,
}

impl<L: ?Sized> Clone for FrameWriter<L> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
            send_lock: Arc::clone(&self.send_lock),
            config: self.config.clone(),
        }
    }
}

impl<L: LinkPort + ?Sized> FrameWriter<L> {
    /// Create a new frame writer with default configuration.
    pub fn new(link: Arc<L>) -> Self {
        Self::with_config(link, FrameConfig::default())
    }

    /// Create a new frame writer with explicit configuration.
    pub fn with_config(link: Arc<L>, config: FrameConfig) -> Self {
        Self {
            link,
            send_lock: Arc::new(Mutex::new(())),
            config,
        }
    }

    /// Send one message. Returns the number of packets written, sentinel included.
    ///
    /// Each packet write is awaited before the next is issued. On the first
    /// failed write the send stops: neither the remaining packets nor the
    /// sentinel are written, and the peer is left holding a partial message
    /// until its own deadline discards it.
    pub async fn send(&self, message: &[u8]) -> Result<usize> {
        if message.len() > self.config.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: message.len(),
                max: self.config.max_message_size,
            });
        }

        let _exclusive = self.send_lock.lock().await;

        let unit = self.unit_size();
        let packets = chunk(message, unit)?;
        let total = packets.len();
        debug!(len = message.len(), unit, packets = total, "sending message");

        for (index, packet) in packets.into_iter().enumerate() {
            if let Err(err) = self.write_packet(packet).await {
                warn!(index, total, %err, "send aborted mid-message");
                return Err(err);
            }
            trace!(index, total, "packet confirmed");
        }

        Ok(total)
    }

    async fn write_packet(&self, packet: Bytes) -> Result<()> {
        match self.config.write_timeout {
            Some(limit) => tokio::time::timeout(limit, self.link.write(packet))
                .await
                .map_err(|_| FrameError::Timeout(limit))??,
            None => self.link.write(packet).await?,
        }
        Ok(())
    }

    /// The unit size the next send will use.
    pub fn unit_size(&self) -> usize {
        self.link
            .current_unit_size()
            .unwrap_or(self.config.default_unit_size)
    }

    /// Borrow the underlying link.
    pub fn link(&self) -> &Arc<L> {
        &self.link
    }

    /// Current frame writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use sigline_link::{LinkError, MemoryLink, Subscription, SubscriptionId};

    use super::*;
    use crate::codec::{reassemble, sentinel, PACKET_DATA, TAG_SIZE};

    fn writer_pair(unit: Option<usize>) -> (FrameWriter<MemoryLink>, Arc<MemoryLink>) {
        let (left, right) = MemoryLink::pair(unit);
        (FrameWriter::new(Arc::new(left)), Arc::new(right))
    }

    #[tokio::test]
    async fn write_single_message() {
        let (writer, _peer) = writer_pair(Some(23));

        let written = writer.send(b"hello").await.unwrap();

        assert_eq!(written, 2);
        let wire = writer.link().written();
        assert_eq!(reassemble(&wire).unwrap().as_ref(), b"hello");
    }

    #[tokio::test]
    async fn offer_sized_message_over_unit_20() {
        let (writer, _peer) = writer_pair(Some(20));
        let offer = br#"{"kind":"offer","payload":{"sdpType":"offer","sdp":"X"}}"#;

        let written = writer.send(offer).await.unwrap();

        let data_packets = offer.len().div_ceil(16);
        assert_eq!(written, data_packets + 1);
        let wire = writer.link().written();
        assert_eq!(wire.last().unwrap(), &sentinel());
        assert!(wire[..data_packets].iter().all(|p| p[0] == PACKET_DATA));
    }

    #[tokio::test]
    async fn falls_back_to_default_unit() {
        let (writer, _peer) = writer_pair(None);
        assert_eq!(writer.unit_size(), 23);

        writer.send(&[1u8; 40]).await.unwrap();

        let wire = writer.link().written();
        assert_eq!(wire[0].len(), TAG_SIZE + 19);
    }

    #[tokio::test]
    async fn picks_up_unit_change_between_sends() {
        let (writer, _peer) = writer_pair(Some(20));
        writer.send(&[0u8; 32]).await.unwrap();
        assert_eq!(writer.link().written().len(), 3);

        writer.link().set_unit_size(Some(100));
        writer.send(&[0u8; 32]).await.unwrap();
        assert_eq!(writer.link().written().len(), 5);
    }

    #[tokio::test]
    async fn message_too_large_rejected() {
        let (link, _peer) = MemoryLink::pair(Some(23));
        let config = FrameConfig {
            max_message_size: 4,
            ..FrameConfig::default()
        };
        let writer = FrameWriter::with_config(Arc::new(link), config);

        let err = writer.send(b"oversized").await.unwrap_err();
        assert!(matches!(err, FrameError::MessageTooLarge { .. }));
        assert!(writer.link().written().is_empty());
    }

    #[tokio::test]
    async fn unit_too_small_is_config_error() {
        let (writer, _peer) = writer_pair(Some(4));
        let err = writer.send(b"x").await.unwrap_err();
        assert!(matches!(err, FrameError::UnitTooSmall { .. }));
        assert!(writer.link().written().is_empty());
    }

    #[tokio::test]
    async fn failed_write_aborts_without_sentinel() {
        let (writer, _peer) = writer_pair(Some(8));
        writer.link().fail_writes_after(2);

        let err = writer.send(b"0123456789abcdef").await.unwrap_err();

        assert!(matches!(err, FrameError::Link(LinkError::Write(_))));
        let wire = writer.link().written();
        assert_eq!(wire.len(), 2);
        assert!(!wire.contains(&sentinel()));
    }

    #[tokio::test]
    async fn concurrent_sends_never_interleave() {
        let (writer, _peer) = writer_pair(Some(8));
        let a = vec![b'a'; 64];
        let b = vec![b'b'; 64];

        let other = writer.clone();

        let (ra, rb) = tokio::join!(writer.send(&a), other.send(&b));
        ra.unwrap();
        rb.unwrap();

        let wire = writer.link().written();
        let mut messages = Vec::new();
        let mut current: Option<u8> = None;
        for packet in &wire {
            if packet == &sentinel() {
                messages.push(current.take().unwrap());
                continue;
            }
            let byte = packet[1];
            match current {
                None => current = Some(byte),
                Some(prev) => assert_eq!(prev, byte, "packets of two messages interleaved"),
            }
        }
        messages.sort_unstable();
        assert_eq!(messages, vec![b'a', b'b']);
    }

    #[tokio::test]
    async fn write_timeout_surfaces_as_timeout() {
        let cfg = FrameConfig {
            write_timeout: Some(Duration::from_millis(20)),
            ..FrameConfig::default()
        };
        let writer = FrameWriter::with_config(Arc::new(StalledLink), cfg);

        let err = writer.send(b"x").await.unwrap_err();
        assert_eq!(err, FrameError::Timeout(Duration::from_millis(20)));
    }

    struct StalledLink;

    #[async_trait]
    impl LinkPort for StalledLink {
        async fn write(&self, _packet: Bytes) -> sigline_link::Result<()> {
            std::future::pending().await
        }

        fn subscribe(&self) -> sigline_link::Result<Subscription> {
            Err(LinkError::Subscribe("write-only".to_string()))
        }

        fn unsubscribe(&self, _id: SubscriptionId) {}

        fn current_unit_size(&self) -> Option<usize> {
            None
        }
    }
}
