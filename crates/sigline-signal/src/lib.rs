//! Peer-connection signaling over a narrow link.
//!
//! Sequences the offer/answer/candidate exchange two endpoints need before
//! they can open a direct media session. One side starts as the initiator
//! (creates and sends the offer), the other as the responder (applies the
//! offer and answers). Description and candidate handling is delegated to a
//! [`MediaEngine`]; messages travel as framed JSON envelopes.

pub mod config;
pub mod controller;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod pending;
pub mod session;
pub mod state;

pub use config::SignalConfig;
pub use controller::Role;
pub use engine::{CandidateCallback, EngineError, MediaEngine};
pub use envelope::{Envelope, IceCandidate, SdpType, SessionDescription};
pub use error::{ErrorKind, Result, SignalError};
pub use pending::PendingCandidates;
pub use session::{start_as_initiator, start_as_responder, Session};
pub use state::SessionState;
