use std::sync::Arc;

use sigline_link::LinkPort;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info_span, Instrument};

use crate::config::SignalConfig;
use crate::controller::{Role, SignalingController};
use crate::engine::MediaEngine;
use crate::error::{Result, SignalError};
use crate::state::{SessionState, StateCell};

/// Handle to a running signaling session.
///
/// The exchange itself runs on a spawned task. Dropping the handle cancels it.
pub struct Session {
    role: Role,
    state: Arc<StateCell>,
    cancel: CancellationToken,
    task: Option<JoinHandle<Result<()>>>,
}

/// Start a session that creates and sends the offer.
///
/// Must be called from within a Tokio runtime. Fails only if the link
/// refuses the inbound subscription.
pub fn start_as_initiator<L, E>(link: Arc<L>, engine: Arc<E>, config: SignalConfig) -> Result<Session>
where
    L: LinkPort + ?Sized + 'static,
    E: MediaEngine + ?Sized + 'static,
{
    Session::start(Role::Initiator, link, engine, config)
}

/// Start a session that waits for an offer and answers it.
///
/// Must be called from within a Tokio runtime. Candidates that arrive before
/// the offer are held and applied right after it.
pub fn start_as_responder<L, E>(link: Arc<L>, engine: Arc<E>, config: SignalConfig) -> Result<Session>
where
    L: LinkPort + ?Sized + 'static,
    E: MediaEngine + ?Sized + 'static,
{
    Session::start(Role::Responder, link, engine, config)
}

impl Session {
    fn start<L, E>(role: Role, link: Arc<L>, engine: Arc<E>, config: SignalConfig) -> Result<Self>
    where
        L: LinkPort + ?Sized + 'static,
        E: MediaEngine + ?Sized + 'static,
    {
        let state = Arc::new(StateCell::new());
        let controller =
            SignalingController::new(role, link, engine, Arc::clone(&state), config)?;
        let cancel = CancellationToken::new();

        debug!(%role, "starting signaling session");
        let task = tokio::spawn(
            controller
                .run(cancel.clone())
                .instrument(info_span!("signal", %role)),
        );

        Ok(Self {
            role,
            state,
            cancel,
            task: Some(task),
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// The current state.
    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    /// A receiver that observes every state change.
    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Call `callback` with each new state, on the session task.
    ///
    /// Changes that happened before registration are not replayed.
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(SessionState) + Send + Sync + 'static,
    {
        self.state.add_listener(Arc::new(callback));
    }

    /// Wait until the session is `Connected` or `Failed` and return that state.
    pub async fn settled(&self) -> SessionState {
        let mut rx = self.state.subscribe();
        let settled = match rx.wait_for(|state| state.is_settled()).await {
            Ok(state) => *state,
            Err(_) => self.state.get(),
        };
        settled
    }

    /// Stop the session. An unsettled session moves to `Failed(Cancelled)`;
    /// a connected one stops relaying candidates and stays `Connected`.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the session task to end and return how it ended.
    ///
    /// A connected session ends when the link closes or it is cancelled.
    pub async fn wait(mut self) -> Result<()> {
        let Some(task) = self.task.take() else {
            return Ok(());
        };
        match task.await {
            Ok(result) => result,
            Err(join) if join.is_cancelled() => Err(SignalError::Cancelled),
            Err(join) => std::panic::resume_unwind(join.into_panic()),
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("role", &self.role)
            .field("state", &self.state())
            .finish()
    }
}
