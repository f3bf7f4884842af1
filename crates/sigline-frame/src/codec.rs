use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use sigline_link::{DEFAULT_UNIT_SIZE, LINK_HEADER_SIZE};

use crate::error::{FrameError, Result};

/// Tag byte of a data packet.
pub const PACKET_DATA: u8 = 0x44;

/// Tag byte of the end-of-message sentinel.
pub const PACKET_END: u8 = 0x45;

/// Bytes the codec spends on each packet's tag.
pub const TAG_SIZE: usize = 1;

/// Bytes of every unit not available to message content: link header + tag.
pub const FRAME_OVERHEAD: usize = LINK_HEADER_SIZE + TAG_SIZE;

/// Default maximum reassembled message size: 64 KiB.
pub const DEFAULT_MAX_MESSAGE: usize = 64 * 1024;

/// The end-of-message sentinel packet.
pub fn sentinel() -> Bytes {
    Bytes::from_static(&[PACKET_END])
}

/// Content bytes one packet carries for a given unit size.
pub fn packet_capacity(unit_size: usize) -> Result<usize> {
    if unit_size <= FRAME_OVERHEAD {
        return Err(FrameError::UnitTooSmall {
            unit: unit_size,
            min: FRAME_OVERHEAD + 1,
        });
    }
    Ok(unit_size - FRAME_OVERHEAD)
}

/// Split a message into the packet sequence for one unit size.
///
/// Every packet but the last two is full; the second-to-last carries the
/// remainder (an empty message still yields one empty data packet) and the
/// last is always the [`sentinel`].
///
/// ```text
/// ┌──────┬──────────────────────┐        ┌──────┐
/// │ 0x44 │ ≤ unit - 4 bytes      │  ...   │ 0x45 │
/// └──────┴──────────────────────┘        └──────┘
/// ```
pub fn chunk(message: &[u8], unit_size: usize) -> Result<Vec<Bytes>> {
    let capacity = packet_capacity(unit_size)?;
    let data_packets = message.len().div_ceil(capacity).max(1);
    let mut packets = Vec::with_capacity(data_packets + 1);

    if message.is_empty() {
        packets.push(Bytes::from_static(&[PACKET_DATA]));
    }
    for part in message.chunks(capacity) {
        let mut packet = BytesMut::with_capacity(TAG_SIZE + part.len());
        packet.put_u8(PACKET_DATA);
        packet.put_slice(part);
        packets.push(packet.freeze());
    }
    packets.push(sentinel());

    Ok(packets)
}

/// Reassemble one message from an ordered packet sequence.
///
/// Packets after the first sentinel are ignored. Fails with
/// [`FrameError::Incomplete`] if the sequence ends before a sentinel.
pub fn reassemble<I, B>(packets: I) -> Result<Bytes>
where
    I: IntoIterator<Item = B>,
    B: AsRef<[u8]>,
{
    let mut reassembler = Reassembler::with_limit(usize::MAX);
    for packet in packets {
        if let Some(message) = reassembler.push(packet.as_ref())? {
            return Ok(message);
        }
    }
    Err(FrameError::Incomplete {
        buffered: reassembler.buffered(),
    })
}

/// Incremental accumulator turning inbound packets into messages.
///
/// The buffer is cleared when a sentinel completes a message and whenever a
/// packet is rejected, so bytes never carry over from one message to the next.
/// After an oversized message the rest of its packets are skipped up to and
/// including its sentinel.
#[derive(Debug)]
pub struct Reassembler {
    buf: BytesMut,
    packets: usize,
    max_message_size: usize,
    discarding: bool,
}

impl Reassembler {
    /// Create a reassembler with the default message size limit.
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_MAX_MESSAGE)
    }

    /// Create a reassembler with an explicit message size limit.
    pub fn with_limit(max_message_size: usize) -> Self {
        Self {
            buf: BytesMut::new(),
            packets: 0,
            max_message_size,
            discarding: false,
        }
    }

    /// Feed one packet. Returns the message when the packet is the sentinel.
    pub fn push(&mut self, packet: &[u8]) -> Result<Option<Bytes>> {
        let Some((&tag, content)) = packet.split_first() else {
            self.reset();
            return Err(FrameError::Corrupted("empty packet".to_string()));
        };

        match tag {
            PACKET_DATA if self.discarding => Ok(None),
            PACKET_END if self.discarding && content.is_empty() => {
                self.discarding = false;
                Ok(None)
            }
            PACKET_DATA => {
                let size = self.buf.len() + content.len();
                if size > self.max_message_size {
                    self.reset();
                    self.discarding = true;
                    return Err(FrameError::MessageTooLarge {
                        size,
                        max: self.max_message_size,
                    });
                }
                self.buf.extend_from_slice(content);
                self.packets += 1;
                Ok(None)
            }
            PACKET_END if content.is_empty() => {
                if self.packets == 0 {
                    return Err(FrameError::Corrupted(
                        "sentinel without preceding data packet".to_string(),
                    ));
                }
                self.packets = 0;
                Ok(Some(self.buf.split().freeze()))
            }
            PACKET_END => {
                self.reset();
                Err(FrameError::Corrupted(format!(
                    "sentinel carries {} unexpected bytes",
                    content.len()
                )))
            }
            other => {
                self.reset();
                Err(FrameError::Corrupted(format!(
                    "unknown packet tag 0x{other:02x}"
                )))
            }
        }
    }

    /// Discard any partial message. Returns the number of bytes dropped.
    pub fn reset(&mut self) -> usize {
        let dropped = self.buf.len();
        self.buf.clear();
        self.packets = 0;
        self.discarding = false;
        dropped
    }

    /// Bytes of the current partial message.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// True when no partial message is pending.
    pub fn is_idle(&self) -> bool {
        self.packets == 0 && !self.discarding
    }
}

impl Default for Reassembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration shared by [`crate::FrameWriter`] and [`crate::FrameReader`].
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Unit size used when the link cannot report one. Default: 23.
    pub default_unit_size: usize,
    /// Maximum message size in bytes, enforced on both send and receive. Default: 64 KiB.
    pub max_message_size: usize,
    /// Per-packet write confirmation timeout.
    pub write_timeout: Option<Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            default_unit_size: DEFAULT_UNIT_SIZE,
            max_message_size: DEFAULT_MAX_MESSAGE,
            write_timeout: None,
        }
    }
}
