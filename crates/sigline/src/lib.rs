//! Message framing and peer-connection signaling over MTU-limited links.
//!
//! sigline carries arbitrarily long messages over a link that only moves
//! small packets (a BLE GATT characteristic, a serial line), and uses that to
//! run the offer/answer/candidate exchange two peers need before opening a
//! direct media session.
//!
//! # Crate Structure
//!
//! - [`link`]: the packet link seam and an in-memory link pair
//! - [`frame`]: chunking, reassembly and the frame reader/writer
//! - [`signal`]: the signaling state machine and its wire envelope

/// Re-export link types.
pub mod link {
    pub use sigline_link::*;
}

/// Re-export frame types.
pub mod frame {
    pub use sigline_frame::*;
}

/// Re-export signaling types.
pub mod signal {
    pub use sigline_signal::*;
}
