//! Packet-size-constrained link abstraction.
//!
//! A link is an ordered, bidirectional channel that moves small packets
//! between two peers, bounded by a unit size the link reports at runtime
//! (for example a BLE ATT MTU). This is the lowest layer of sigline.
//! Everything else builds on top of the [`LinkPort`] trait defined here.
//!
//! [`MemoryLink`] is an in-process implementation used by tests and by the
//! CLI loopback demo.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{LinkError, Result};
pub use memory::MemoryLink;
pub use traits::{LinkEvent, LinkPort, Subscription, SubscriptionId};

/// Per-write header the link itself spends out of every unit (ATT opcode + handle).
pub const LINK_HEADER_SIZE: usize = 3;

/// Unit size assumed when the link cannot report one.
pub const DEFAULT_UNIT_SIZE: usize = 23;
