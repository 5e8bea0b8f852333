//! Session lifecycle states.
//!
//! ```text
//! Handshaking ──▶ Active ──▶ Draining ──▶ Closed
//!      │                                    ▲
//!      └────────────────────────────────────┘   (rejected or timed-out handshake)
//! ```
//!
//! `Closed` is terminal. The current state is published on a
//! `tokio::sync::watch` channel so the manager and tests can observe
//! transitions without polling the session. A watch receiver only sees
//! the latest value, so the tracker also keeps the full path taken.

use std::fmt;
use std::sync::{Mutex, PoisonError};
use tokio::sync::watch;
use tracing::warn;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the first inbound frame.
    Handshaking,
    /// Both pumps running.
    Active,
    /// A pump exited; the sibling is being cancelled and the connection closed.
    Draining,
    /// Pumps joined, connection released.
    Closed,
}

impl SessionState {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionState::Handshaking => "handshaking",
            SessionState::Active => "active",
            SessionState::Draining => "draining",
            SessionState::Closed => "closed",
        }
    }

    /// Whether `self -> next` is a legal transition.
    #[must_use]
    pub const fn can_transition_to(&self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (SessionState::Handshaking, SessionState::Active)
                | (SessionState::Handshaking, SessionState::Closed)
                | (SessionState::Active, SessionState::Draining)
                | (SessionState::Draining, SessionState::Closed)
        )
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// Owner side of the state channel.
#[derive(Debug)]
pub struct StateTracker {
    tx: watch::Sender<SessionState>,
    history: Mutex<Vec<SessionState>>,
}

impl Default for StateTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StateTracker {
    /// Start in [`SessionState::Handshaking`].
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::Handshaking);
        Self {
            tx,
            history: Mutex::new(vec![SessionState::Handshaking]),
        }
    }

    #[must_use]
    pub fn current(&self) -> SessionState {
        *self.tx.borrow()
    }

    /// Observe transitions. Works even after all other receivers dropped.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Every state entered so far, starting with `Handshaking`.
    #[must_use]
    pub fn history(&self) -> Vec<SessionState> {
        self.history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Apply a transition, rejecting anything outside the table.
    pub fn advance(&self, next: SessionState) -> Result<(), InvalidTransition> {
        let mut result = Ok(());
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                *current = next;
                true
            } else {
                result = Err(InvalidTransition {
                    from: *current,
                    to: next,
                });
                false
            }
        });

        match &result {
            Ok(()) => self
                .history
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(next),
            Err(err) => {
                warn!(target: "vs.session", error = %err, "Rejected session state change");
            }
        }
        result
    }
}
