//! Chunked message framing over unit-size-limited links.
//!
//! A logical message is split into packets that each fit the link's current
//! unit, followed by an end-of-message sentinel. Every packet starts with a
//! one-byte tag:
//! - `0x44` ("D") data packet, followed by up to `unit - FRAME_OVERHEAD` bytes
//! - `0x45` ("E") sentinel, with no body
//!
//! Content bytes never reach the tag position, so no payload can be mistaken
//! for the sentinel.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

pub use codec::{
    chunk, packet_capacity, reassemble, sentinel, FrameConfig, Reassembler, DEFAULT_MAX_MESSAGE,
    FRAME_OVERHEAD, PACKET_DATA, PACKET_END, TAG_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::{FrameReader, MessageStream};
pub use writer::FrameWriter;
