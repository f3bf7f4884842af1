use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::error::ErrorKind;

/// Where a session is in the offer/answer exchange.
///
/// ```text
/// initiator: Idle → CreatingLocalOffer → OfferReady → Sending → AwaitingAnswer
///                 → ApplyingAnswer → Connected
/// responder: Idle → OfferReceived → CreatingAnswer → AnswerReady → Sending
///                 → Connected
/// ```
///
/// Any state short of `Connected` may move to `Failed`. `Connected` and
/// `Failed` are settled: no transition leaves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    CreatingLocalOffer,
    OfferReady,
    Sending,
    AwaitingAnswer,
    ApplyingAnswer,
    OfferReceived,
    CreatingAnswer,
    AnswerReady,
    Connected,
    Failed(ErrorKind),
}

impl SessionState {
    /// True for `Connected` and `Failed`.
    pub fn is_settled(self) -> bool {
        matches!(self, SessionState::Connected | SessionState::Failed(_))
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(self, next: SessionState) -> bool {
        use SessionState::*;
        match (self, next) {
            (Connected | Failed(_), _) => false,
            (_, Failed(_)) => true,
            (Idle, CreatingLocalOffer | OfferReceived) => true,
            (CreatingLocalOffer, OfferReady) => true,
            (OfferReady, Sending) => true,
            (Sending, AwaitingAnswer | Connected) => true,
            (AwaitingAnswer, ApplyingAnswer) => true,
            (ApplyingAnswer, Connected) => true,
            (OfferReceived, CreatingAnswer) => true,
            (CreatingAnswer, AnswerReady) => true,
            (AnswerReady, Sending) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => f.write_str("idle"),
            SessionState::CreatingLocalOffer => f.write_str("creating-local-offer"),
            SessionState::OfferReady => f.write_str("offer-ready"),
            SessionState::Sending => f.write_str("sending"),
            SessionState::AwaitingAnswer => f.write_str("awaiting-answer"),
            SessionState::ApplyingAnswer => f.write_str("applying-answer"),
            SessionState::OfferReceived => f.write_str("offer-received"),
            SessionState::CreatingAnswer => f.write_str("creating-answer"),
            SessionState::AnswerReady => f.write_str("answer-ready"),
            SessionState::Connected => f.write_str("connected"),
            SessionState::Failed(kind) => write!(f, "failed({kind})"),
        }
    }
}

pub(crate) type StateListener = Arc<dyn Fn(SessionState) + Send + Sync>;

/// Current state plus everyone observing it.
pub(crate) struct StateCell {
    tx: watch::Sender<SessionState>,
    listeners: Mutex<Vec<StateListener>>,
}

impl StateCell {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Idle);
        Self {
            tx,
            listeners: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn get(&self) -> SessionState {
        *self.tx.borrow()
    }

    /// Store `next` and notify listeners. Callers check legality first.
    ///
    /// Listeners run on the session task after the list lock is released, so
    /// a listener may register further listeners; those see later changes only.
    pub(crate) fn set(&self, next: SessionState) {
        let previous = self.tx.send_replace(next);
        debug!(from = %previous, to = %next, "session state");
        let listeners: Vec<StateListener> = self.listeners.lock().clone();
        for listener in listeners {
            listener(next);
        }
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    pub(crate) fn add_listener(&self, listener: StateListener) {
        self.listeners.lock().push(listener);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settled_states_never_move() {
        for settled in [SessionState::Connected, SessionState::Failed(ErrorKind::Timeout)] {
            assert!(settled.is_settled());
            assert!(!settled.can_advance_to(SessionState::CreatingLocalOffer));
            assert!(!settled.can_advance_to(SessionState::Failed(ErrorKind::Protocol)));
        }
    }

    #[test]
    fn every_unsettled_state_can_fail() {
        use SessionState::*;
        for state in [
            Idle,
            CreatingLocalOffer,
            OfferReady,
            Sending,
            AwaitingAnswer,
            ApplyingAnswer,
            OfferReceived,
            CreatingAnswer,
            AnswerReady,
        ] {
            assert!(!state.is_settled());
            assert!(state.can_advance_to(Failed(ErrorKind::Transport)));
        }
    }

    #[test]
    fn skipping_steps_is_illegal() {
        assert!(!SessionState::Idle.can_advance_to(SessionState::Connected));
        assert!(!SessionState::AwaitingAnswer.can_advance_to(SessionState::CreatingLocalOffer));
        assert!(!SessionState::OfferReady.can_advance_to(SessionState::AwaitingAnswer));
    }

    #[test]
    fn display_names() {
        assert_eq!(SessionState::AwaitingAnswer.to_string(), "awaiting-answer");
        assert_eq!(
            SessionState::Failed(ErrorKind::Timeout).to_string(),
            "failed(timeout)"
        );
    }

    #[test]
    fn cell_notifies_watchers_and_listeners() {
        let cell = StateCell::new();
        let rx = cell.subscribe();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        cell.add_listener(Arc::new(move |state| sink.lock().push(state)));

        cell.set(SessionState::CreatingLocalOffer);
        cell.set(SessionState::OfferReady);

        assert_eq!(cell.get(), SessionState::OfferReady);
        assert_eq!(*rx.borrow(), SessionState::OfferReady);
        assert_eq!(
            *seen.lock(),
            vec![SessionState::CreatingLocalOffer, SessionState::OfferReady]
        );
    }

    #[test]
    fn listener_may_register_another_listener() {
        let cell = Arc::new(StateCell::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let registrar = Arc::clone(&cell);
        let sink = Arc::clone(&seen);
        cell.add_listener(Arc::new(move |state| {
            if state == SessionState::CreatingLocalOffer {
                let late = Arc::clone(&sink);
                registrar.add_listener(Arc::new(move |state| late.lock().push(state)));
            }
        }));

        cell.set(SessionState::CreatingLocalOffer);
        cell.set(SessionState::OfferReady);

        assert_eq!(*seen.lock(), vec![SessionState::OfferReady]);
    }
}
