use std::time::Duration;

use sigline_frame::FrameConfig;

/// Configuration for a signaling session.
#[derive(Debug, Clone)]
pub struct SignalConfig {
    /// How long an initiator waits for the answer after sending its offer.
    /// Default: 30s.
    pub answer_timeout: Duration,
    /// How long a responder waits for an offer. Default: 60s.
    pub offer_timeout: Duration,
    /// Framing configuration for the session's reader and writer.
    pub frame: FrameConfig,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            answer_timeout: Duration::from_secs(30),
            offer_timeout: Duration::from_secs(60),
            frame: FrameConfig::default(),
        }
    }
}
