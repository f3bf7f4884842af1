use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SignalError};

/// Whether a session description is an offer or an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl SdpType {
    pub fn as_str(self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

/// An opaque session description produced or consumed by the media engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    #[serde(rename = "sdpType")]
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// One network-path candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid")]
    pub mid: String,
    #[serde(rename = "sdpMLineIndex")]
    pub m_line_index: u32,
}

impl IceCandidate {
    pub fn new(candidate: impl Into<String>, mid: impl Into<String>, m_line_index: u32) -> Self {
        Self {
            candidate: candidate.into(),
            mid: mid.into(),
            m_line_index,
        }
    }
}

/// A signaling message as it travels over the link.
///
/// Serialized as `{"kind": "offer" | "answer" | "candidate", "payload": {...}}`.
/// The message type is always read from `kind`; payload shape is never used
/// to guess it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "lowercase")]
pub enum Envelope {
    Offer(SessionDescription),
    Answer(SessionDescription),
    Candidate(IceCandidate),
}

impl Envelope {
    /// Wrap a description under the kind its type names.
    pub fn description(description: SessionDescription) -> Self {
        match description.sdp_type {
            SdpType::Offer => Envelope::Offer(description),
            SdpType::Answer => Envelope::Answer(description),
        }
    }

    /// The wire `kind` of this envelope.
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Offer(_) => "offer",
            Envelope::Answer(_) => "answer",
            Envelope::Candidate(_) => "candidate",
        }
    }

    /// Serialize to the JSON bytes handed to the frame writer.
    pub fn encode(&self) -> Result<Vec<u8>> {
        self.validate()?;
        Ok(serde_json::to_vec(self)?)
    }

    /// Parse one reassembled message.
    pub fn decode(message: &[u8]) -> Result<Self> {
        let envelope: Envelope = serde_json::from_slice(message)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Take the description out of an offer or answer.
    pub fn into_description(self) -> Option<SessionDescription> {
        match self {
            Envelope::Offer(description) | Envelope::Answer(description) => Some(description),
            Envelope::Candidate(_) => None,
        }
    }

    fn validate(&self) -> Result<()> {
        let (kind, description) = match self {
            Envelope::Offer(d) => (SdpType::Offer, d),
            Envelope::Answer(d) => (SdpType::Answer, d),
            Envelope::Candidate(_) => return Ok(()),
        };
        if description.sdp_type != kind {
            return Err(SignalError::Protocol(format!(
                "envelope kind {kind} carries a description of type {}",
                description.sdp_type
            )));
        }
        Ok(())
    }
}
