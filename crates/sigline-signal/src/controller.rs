use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use sigline_frame::{FrameError, FrameReader, FrameWriter, MessageStream};
use sigline_link::LinkPort;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SignalConfig;
use crate::engine::MediaEngine;
use crate::envelope::{Envelope, IceCandidate, SdpType, SessionDescription};
use crate::error::{ErrorKind, Result, SignalError};
use crate::pending::PendingCandidates;
use crate::state::{SessionState, StateCell};

/// Which side of the exchange a session plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Creates and sends the offer.
    Initiator,
    /// Waits for an offer and answers it.
    Responder,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Initiator => f.write_str("initiator"),
            Role::Responder => f.write_str("responder"),
        }
    }
}

/// Drives one signaling session to `Connected` or `Failed`.
///
/// Built synchronously so the inbound subscription and the local candidate
/// sink exist before anything is sent; [`SignalingController::run`] does the
/// rest on the session task.
pub(crate) struct SignalingController<L: LinkPort + ?Sized, E: ?Sized> {
    exchange: Exchange<L, E>,
    inbound: MessageStream<L>,
    local_candidates: mpsc::UnboundedReceiver<IceCandidate>,
}

/// The offer/answer sequencing, separated from the inbound stream so both can
/// be borrowed mutably at once.
struct Exchange<L: ?Sized, E: ?Sized> {
    role: Role,
    engine: Arc<E>,
    writer: FrameWriter<L>,
    state: Arc<StateCell>,
    config: SignalConfig,
    pending: PendingCandidates,
    remote_applied: bool,
}

impl<L, E> SignalingController<L, E>
where
    L: LinkPort + ?Sized,
    E: MediaEngine + ?Sized,
{
    pub(crate) fn new(
        role: Role,
        link: Arc<L>,
        engine: Arc<E>,
        state: Arc<StateCell>,
        config: SignalConfig,
    ) -> Result<Self> {
        let reader = FrameReader::with_config(Arc::clone(&link), config.frame.clone());
        let inbound = reader.messages()?;
        let writer = FrameWriter::with_config(link, config.frame.clone());

        let (candidate_tx, local_candidates) = mpsc::unbounded_channel();
        engine.on_local_candidate(Box::new(move |candidate| {
            // The receiver is gone once the session has ended.
            let _ = candidate_tx.send(candidate);
        }));

        Ok(Self {
            exchange: Exchange {
                role,
                engine,
                writer,
                state,
                config,
                pending: PendingCandidates::new(),
                remote_applied: false,
            },
            inbound,
            local_candidates,
        })
    }

    /// Run until the session settles and, once connected, keep relaying
    /// trickled candidates until the link closes or the session is cancelled.
    pub(crate) async fn run(self, cancel: CancellationToken) -> Result<()> {
        let SignalingController {
            mut exchange,
            mut inbound,
            mut local_candidates,
        } = self;
        let role = exchange.role;
        let state = Arc::clone(&exchange.state);
        let _settle = SettleOnExit(Arc::clone(&state));
        let writer = exchange.writer.clone();

        let outcome = tokio::select! {
            _ = cancel.cancelled() => Err(SignalError::Cancelled),
            result = exchange.drive(&mut inbound) => result,
            result = pump_local_candidates(&writer, &mut local_candidates, &state) => result,
        };

        let current = state.get();
        match outcome {
            Ok(()) => Ok(()),
            Err(SignalError::Cancelled) if current == SessionState::Connected => {
                debug!(%role, "connected session stopped by owner");
                Ok(())
            }
            Err(err) if current.is_settled() => {
                warn!(%role, state = %current, %err, "signaling ended with error");
                Err(err)
            }
            Err(err) => {
                warn!(%role, state = %current, %err, "signaling failed");
                state.set(SessionState::Failed(err.kind()));
                Err(err)
            }
        }
    }
}

/// Leaves the session settled however the task ends, including a panic or
/// the runtime dropping the task.
struct SettleOnExit(Arc<StateCell>);

impl Drop for SettleOnExit {
    fn drop(&mut self) {
        let current = self.0.get();
        if current.is_settled() {
            return;
        }
        let kind = if std::thread::panicking() {
            ErrorKind::Internal
        } else {
            ErrorKind::Cancelled
        };
        warn!(state = %current, %kind, "session task ended before settling");
        self.0.set(SessionState::Failed(kind));
    }
}

/// Send every locally discovered candidate as its own envelope, in discovery
/// order. Candidates share the writer with descriptions, so a candidate is
/// never split around another message.
///
/// A failed send ends the session only during the handshake; once connected
/// the candidate is dropped and the pump keeps going.
async fn pump_local_candidates<L: LinkPort + ?Sized>(
    writer: &FrameWriter<L>,
    candidates: &mut mpsc::UnboundedReceiver<IceCandidate>,
    state: &StateCell,
) -> Result<()> {
    while let Some(candidate) = candidates.recv().await {
        let wire = Envelope::Candidate(candidate).encode()?;
        match writer.send(&wire).await {
            Ok(_) => debug!("local candidate sent"),
            Err(err) if state.get() == SessionState::Connected => {
                warn!(%err, "local candidate dropped");
            }
            Err(err) => return Err(err.into()),
        }
    }
    // The engine dropped its sink; nothing more will be trickled.
    std::future::pending().await
}

impl<L, E> Exchange<L, E>
where
    L: LinkPort + ?Sized,
    E: MediaEngine + ?Sized,
{
    async fn drive(&mut self, inbound: &mut MessageStream<L>) -> Result<()> {
        match self.role {
            Role::Initiator => self.initiate(inbound).await?,
            Role::Responder => self.respond(inbound).await?,
        }
        info!(role = %self.role, "signaling connected");
        self.serve_connected(inbound).await
    }

    async fn initiate(&mut self, inbound: &mut MessageStream<L>) -> Result<()> {
        self.advance(SessionState::CreatingLocalOffer)?;
        let offer = self
            .engine
            .create_local_offer()
            .await
            .map_err(SignalError::application("create local offer"))?;
        expect_type(&offer, SdpType::Offer)?;
        self.advance(SessionState::OfferReady)?;

        let wire = Envelope::description(offer).encode()?;
        self.advance(SessionState::Sending)?;
        self.writer.send(&wire).await?;
        self.advance(SessionState::AwaitingAnswer)?;

        let answer = self
            .await_description(inbound, SdpType::Answer, self.config.answer_timeout)
            .await?;
        self.advance(SessionState::ApplyingAnswer)?;
        self.apply_remote_description(answer).await?;
        self.advance(SessionState::Connected)
    }

    async fn respond(&mut self, inbound: &mut MessageStream<L>) -> Result<()> {
        let offer = self
            .await_description(inbound, SdpType::Offer, self.config.offer_timeout)
            .await?;
        self.advance(SessionState::OfferReceived)?;
        self.advance(SessionState::CreatingAnswer)?;
        self.apply_remote_description(offer).await?;
        let answer = self
            .engine
            .create_local_answer()
            .await
            .map_err(SignalError::application("create local answer"))?;
        expect_type(&answer, SdpType::Answer)?;
        self.advance(SessionState::AnswerReady)?;

        let wire = Envelope::description(answer).encode()?;
        self.advance(SessionState::Sending)?;
        self.writer.send(&wire).await?;
        self.advance(SessionState::Connected)
    }

    /// Wait for one description of the `expected` type, handling candidates
    /// that arrive first. Any other description is a protocol error.
    async fn await_description(
        &mut self,
        inbound: &mut MessageStream<L>,
        expected: SdpType,
        timeout: Duration,
    ) -> Result<SessionDescription> {
        // A timeout too large to add to the clock means no deadline.
        let deadline = Instant::now().checked_add(timeout);
        loop {
            let next = match deadline {
                Some(deadline) => {
                    inbound
                        .recv_timeout(deadline.saturating_duration_since(Instant::now()))
                        .await
                }
                None => inbound
                    .recv()
                    .await
                    .unwrap_or(Err(FrameError::ConnectionClosed)),
            };
            let message = match next {
                Ok(message) => message,
                Err(FrameError::Timeout(_)) => {
                    return Err(SignalError::Timeout {
                        waiting_for: expected.as_str(),
                        after: timeout,
                    })
                }
                Err(err) => return Err(err.into()),
            };

            match Envelope::decode(&message)? {
                Envelope::Candidate(candidate) => self.accept_remote_candidate(candidate).await?,
                envelope => {
                    let kind = envelope.kind();
                    match envelope.into_description() {
                        Some(description) if description.sdp_type == expected => {
                            debug!(%expected, len = description.sdp.len(), "description received");
                            return Ok(description);
                        }
                        _ => {
                            return Err(SignalError::Protocol(format!(
                                "received {kind} while {} waits for {expected}",
                                self.role
                            )))
                        }
                    }
                }
            }
        }
    }

    /// Apply a remote candidate now, or hold it until the remote description
    /// is in place.
    async fn accept_remote_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        if self.remote_applied {
            return self
                .engine
                .apply_remote_candidate(candidate)
                .await
                .map_err(SignalError::application("apply remote candidate"));
        }
        self.pending.push(candidate);
        debug!(queued = self.pending.len(), "remote candidate queued");
        Ok(())
    }

    async fn apply_remote_description(&mut self, description: SessionDescription) -> Result<()> {
        self.engine
            .apply_remote_description(description)
            .await
            .map_err(SignalError::application("apply remote description"))?;
        self.remote_applied = true;

        let queued: Vec<IceCandidate> = self.pending.drain().collect();
        if !queued.is_empty() {
            debug!(count = queued.len(), "applying queued remote candidates");
        }
        for candidate in queued {
            self.engine
                .apply_remote_candidate(candidate)
                .await
                .map_err(SignalError::application("apply remote candidate"))?;
        }
        Ok(())
    }

    /// After connecting only trickled candidates are meaningful. Everything
    /// else is logged and dropped; the session ends quietly with the link.
    async fn serve_connected(&mut self, inbound: &mut MessageStream<L>) -> Result<()> {
        while let Some(item) = inbound.recv().await {
            let message = match item {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "inbound message dropped");
                    continue;
                }
            };
            match Envelope::decode(&message) {
                Ok(Envelope::Candidate(candidate)) => {
                    if let Err(err) = self.engine.apply_remote_candidate(candidate).await {
                        warn!(%err, "remote candidate rejected by media engine");
                    }
                }
                Ok(envelope) => {
                    warn!(kind = envelope.kind(), "description after connect ignored");
                }
                Err(err) => warn!(%err, "malformed envelope ignored"),
            }
        }
        debug!(role = %self.role, "link closed");
        Ok(())
    }

    fn advance(&self, next: SessionState) -> Result<()> {
        let current = self.state.get();
        if !current.can_advance_to(next) {
            return Err(SignalError::Protocol(format!(
                "illegal transition {current} -> {next}"
            )));
        }
        self.state.set(next);
        Ok(())
    }
}

fn expect_type(description: &SessionDescription, expected: SdpType) -> Result<()> {
    if description.sdp_type != expected {
        return Err(SignalError::Protocol(format!(
            "media engine produced {} where {expected} was requested",
            description.sdp_type
        )));
    }
    Ok(())
}
