use std::pin::Pin;
use std::sync::Arc;
use std::task::{ready, Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_core::Stream;
use sigline_link::{LinkPort, Subscription};
use tracing::{debug, trace};

use crate::codec::{FrameConfig, Reassembler};
use crate::error::{FrameError, Result};

/// Reads complete messages from a link.
///
/// Handles packet accumulation internally, so callers only ever see complete
/// messages. A partial message is never surfaced: it is discarded on link
/// error, on a rejected packet, on deadline expiry and on cancellation.
pub struct FrameReader<L: ?Sized> {
    link: Arc<L>,
    config: FrameConfig,
}

impl<L: LinkPort + ?Sized> FrameReader<L> {
    /// Create a new frame reader with default configuration.
    pub fn new(link: Arc<L>) -> Self {
        Self::with_config(link, FrameConfig::default())
    }

    /// Create a new frame reader with explicit configuration.
    pub fn with_config(link: Arc<L>, config: FrameConfig) -> Self {
        Self { link, config }
    }

    /// Subscribe to the link and stream every message it delivers.
    ///
    /// The stream keeps running across link errors and rejected packets
    /// (each surfaces as one `Err` item) and ends when the link closes or the
    /// stream is cancelled. Call again to resubscribe.
    pub fn messages(&self) -> Result<MessageStream<L>> {
        let subscription = self.link.subscribe()?;
        debug!(subscription = subscription.id(), "message stream subscribed");
        Ok(MessageStream {
            link: Arc::clone(&self.link),
            subscription: Some(subscription),
            reassembler: Reassembler::with_limit(self.config.max_message_size),
        })
    }

    /// Wait for exactly one message.
    ///
    /// Resolves on the first of: a completed message, a link error, a
    /// rejected packet, or `timeout`. The subscription is released before
    /// returning in every case.
    pub async fn await_message(&self, timeout: Duration) -> Result<Bytes> {
        let mut stream = self.messages()?;
        let result = stream.recv_timeout(timeout).await;
        stream.cancel();
        result
    }

    /// Borrow the underlying link.
    pub fn link(&self) -> &Arc<L> {
        &self.link
    }

    /// Current frame reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// A continuous subscription yielding reassembled messages.
///
/// Owns the accumulation buffer for its subscription; nothing else touches
/// it. Dropping the stream unsubscribes from the link.
pub struct MessageStream<L: LinkPort + ?Sized> {
    link: Arc<L>,
    subscription: Option<Subscription>,
    reassembler: Reassembler,
}

impl<L: LinkPort + ?Sized> MessageStream<L> {
    /// Wait for the next message. `None` once the link closed or the stream was cancelled.
    pub async fn recv(&mut self) -> Option<Result<Bytes>> {
        std::future::poll_fn(|cx| self.poll_message(cx)).await
    }

    /// Wait for the next message for at most `timeout`.
    ///
    /// On expiry the partial message is discarded and
    /// [`FrameError::Timeout`] is returned; the stream stays subscribed.
    pub async fn recv_timeout(&mut self, timeout: Duration) -> Result<Bytes> {
        match tokio::time::timeout(timeout, self.recv()).await {
            Ok(Some(result)) => result,
            Ok(None) => Err(FrameError::ConnectionClosed),
            Err(_) => {
                let dropped = self.reassembler.reset();
                debug!(dropped, ?timeout, "deadline expired, partial message discarded");
                Err(FrameError::Timeout(timeout))
            }
        }
    }

    /// Unsubscribe from the link and drop any partial message.
    pub fn cancel(mut self) {
        self.release();
    }

    /// True while the stream still holds a link subscription.
    pub fn is_subscribed(&self) -> bool {
        self.subscription.is_some()
    }

    /// Bytes of the partial message currently buffered.
    pub fn pending_bytes(&self) -> usize {
        self.reassembler.buffered()
    }

    fn release(&mut self) {
        if let Some(mut subscription) = self.subscription.take() {
            self.link.unsubscribe(subscription.id());
            let dropped = subscription.drain();
            debug!(
                subscription = subscription.id(),
                dropped, "message stream released"
            );
        }
        self.reassembler.reset();
    }

    fn poll_message(&mut self, cx: &mut Context<'_>) -> Poll<Option<Result<Bytes>>> {
        loop {
            let Some(subscription) = self.subscription.as_mut() else {
                return Poll::Ready(None);
            };

            match ready!(subscription.poll_recv(cx)) {
                Some(Ok(packet)) => match self.reassembler.push(&packet) {
                    Ok(Some(message)) => {
                        trace!(len = message.len(), "message reassembled");
                        return Poll::Ready(Some(Ok(message)));
                    }
                    Ok(None) => continue,
                    Err(err) => return Poll::Ready(Some(Err(err))),
                },
                Some(Err(err)) => {
                    let dropped = self.reassembler.reset();
                    debug!(dropped, %err, "link error, partial message discarded");
                    return Poll::Ready(Some(Err(FrameError::Link(err))));
                }
                None => {
                    self.release();
                    return Poll::Ready(None);
                }
            }
        }
    }
}

impl<L: LinkPort + ?Sized> Stream for MessageStream<L> {
    type Item = Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.get_mut().poll_message(cx)
    }
}

impl<L: LinkPort + ?Sized> Drop for MessageStream<L> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use sigline_link::{LinkError, MemoryLink};

    use super::*;
    use crate::codec::{chunk, sentinel};
    use crate::writer::FrameWriter;

    fn pair(unit: usize) -> (FrameWriter<MemoryLink>, FrameReader<MemoryLink>) {
        let (left, right) = MemoryLink::pair(Some(unit));
        (
            FrameWriter::new(Arc::new(left)),
            FrameReader::new(Arc::new(right)),
        )
    }

    #[tokio::test]
    async fn read_single_message() {
        let (writer, reader) = pair(20);
        let mut stream = reader.messages().unwrap();

        writer.send(b"hello, sigline!").await.unwrap();

        let message = stream.recv().await.unwrap().unwrap();
        assert_eq!(message.as_ref(), b"hello, sigline!");
    }

    #[tokio::test]
    async fn read_multiple_messages_in_order() {
        let (writer, reader) = pair(9);
        let mut stream = reader.messages().unwrap();

        for message in ["one", "two", "a somewhat longer third message"] {
            writer.send(message.as_bytes()).await.unwrap();
        }

        let received: Vec<Bytes> = stream
            .by_ref()
            .take(3)
            .map(|item| item.unwrap())
            .collect()
            .await;
        assert_eq!(
            received,
            vec![
                Bytes::from("one"),
                Bytes::from("two"),
                Bytes::from("a somewhat longer third message")
            ]
        );
    }

    #[tokio::test]
    async fn peer_reader_emits_exactly_one_offer() {
        let (writer, reader) = pair(20);
        let mut stream = reader.messages().unwrap();
        let offer = br#"{"kind":"offer","payload":{"sdpType":"offer","sdp":"X"}}"#;

        writer.send(offer).await.unwrap();
        writer.link().disconnect();

        assert_eq!(stream.recv().await.unwrap().unwrap().as_ref(), offer);
        assert!(stream.recv().await.is_none());
    }

    #[tokio::test]
    async fn await_message_returns_one_message() {
        let (writer, reader) = pair(23);

        let (message, sent) = tokio::join!(
            reader.await_message(Duration::from_secs(2)),
            async {
                tokio::task::yield_now().await;
                writer.send(b"answer").await
            }
        );

        sent.unwrap();
        assert_eq!(message.unwrap().as_ref(), b"answer");
        assert_eq!(reader.link().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn await_message_times_out_and_discards_partial() {
        let (_writer, reader) = pair(23);
        let link = Arc::clone(reader.link());

        let wait = reader.await_message(Duration::from_millis(50));
        let feed = async {
            tokio::task::yield_now().await;
            link.inject_packet(&b"Dpartial"[..]);
        };
        let (result, ()) = tokio::join!(wait, feed);

        assert_eq!(result.unwrap_err(), FrameError::Timeout(Duration::from_millis(50)));
        assert_eq!(link.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn timeout_leaves_no_residue_for_next_message() {
        let (writer, reader) = pair(23);
        let mut stream = reader.messages().unwrap();
        let link = Arc::clone(reader.link());

        link.inject_packet(&b"Dstale bytes"[..]);
        let err = stream
            .recv_timeout(Duration::from_millis(30))
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Timeout(_)));
        assert_eq!(stream.pending_bytes(), 0);

        writer.send(b"fresh").await.unwrap();
        let message = stream.recv_timeout(Duration::from_secs(2)).await.unwrap();
        assert_eq!(message.as_ref(), b"fresh");
    }

    #[tokio::test]
    async fn link_error_mid_message_discards_partial() {
        let (writer, reader) = pair(8);
        let mut stream = reader.messages().unwrap();
        let link = Arc::clone(reader.link());

        for packet in chunk(b"abcdefgh", 8).unwrap().into_iter().take(1) {
            link.inject_packet(packet);
        }
        link.inject_error(LinkError::Notify("notify failed".to_string()));

        let err = stream.recv().await.unwrap().unwrap_err();
        assert!(matches!(err, FrameError::Link(LinkError::Notify(_))));
        assert_eq!(stream.pending_bytes(), 0);

        writer.send(b"clean").await.unwrap();
        assert_eq!(stream.recv().await.unwrap().unwrap().as_ref(), b"clean");
    }

    #[tokio::test]
    async fn await_message_surfaces_link_error() {
        let (_writer, reader) = pair(23);
        let link = Arc::clone(reader.link());

        let wait = reader.await_message(Duration::from_secs(2));
        let feed = async {
            tokio::task::yield_now().await;
            link.inject_error(LinkError::Notify("gone".to_string()));
        };
        let (result, ()) = tokio::join!(wait, feed);

        assert!(matches!(result, Err(FrameError::Link(_))));
        assert_eq!(link.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn corrupted_packet_is_reported_and_stream_continues() {
        let (writer, reader) = pair(23);
        let mut stream = reader.messages().unwrap();
        let link = Arc::clone(reader.link());

        link.inject_packet(&b"?garbage"[..]);
        assert!(matches!(
            stream.recv().await.unwrap(),
            Err(FrameError::Corrupted(_))
        ));

        writer.send(b"next").await.unwrap();
        assert_eq!(stream.recv().await.unwrap().unwrap().as_ref(), b"next");
    }

    #[tokio::test]
    async fn oversized_message_rejected_by_reader() {
        let (left, right) = MemoryLink::pair(Some(23));
        let writer = FrameWriter::new(Arc::new(left));
        let cfg = FrameConfig {
            max_message_size: 16,
            ..FrameConfig::default()
        };
        let reader = FrameReader::with_config(Arc::new(right), cfg);
        let mut stream = reader.messages().unwrap();

        writer.send(&[9u8; 40]).await.unwrap();
        writer.send(b"small").await.unwrap();

        assert!(matches!(
            stream.recv().await.unwrap(),
            Err(FrameError::MessageTooLarge { .. })
        ));
        assert_eq!(stream.recv().await.unwrap().unwrap().as_ref(), b"small");
    }

    #[tokio::test]
    async fn link_close_ends_stream() {
        let (writer, reader) = pair(23);
        let mut stream = reader.messages().unwrap();

        writer.link().disconnect();

        assert!(stream.recv().await.is_none());
        assert!(!stream.is_subscribed());
        let err = stream
            .recv_timeout(Duration::from_millis(10))
            .await
            .unwrap_err();
        assert_eq!(err, FrameError::ConnectionClosed);
    }

    #[tokio::test]
    async fn cancel_releases_subscription_and_resubscribe_works() {
        let (writer, reader) = pair(23);
        let stream = reader.messages().unwrap();
        assert_eq!(reader.link().subscriber_count(), 1);

        stream.cancel();
        assert_eq!(reader.link().subscriber_count(), 0);

        let mut again = reader.messages().unwrap();
        writer.send(b"after restart").await.unwrap();
        assert_eq!(
            again.recv().await.unwrap().unwrap().as_ref(),
            b"after restart"
        );
    }

    #[tokio::test]
    async fn link_error_resets_before_late_sentinel() {
        let (_writer, reader) = pair(23);
        let mut stream = reader.messages().unwrap();
        let link = Arc::clone(reader.link());

        link.inject_packet(&b"Dfirst"[..]);
        link.inject_error(LinkError::Notify("drop".to_string()));
        link.inject_packet(sentinel());

        assert!(matches!(stream.recv().await.unwrap(), Err(FrameError::Link(_))));
        assert!(matches!(
            stream.recv().await.unwrap(),
            Err(FrameError::Corrupted(_))
        ));
    }
}
