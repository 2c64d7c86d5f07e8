//! Connection state machine - lifecycle of one vendor session
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Authenticating -> Ready
//!                     \______________\____________\______________\---> Failed
//! any ---------------------------------------------------------------> Closed
//! ```
//!
//! Transitions are a pure table (`next`); the machine only serialises them.

use parking_lot::Mutex;
use std::fmt;

use crate::core::error::{Error, Result};
use crate::core::types::SessionState;

/// Lifecycle inputs, one per vendor signal or local request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Connect,
    Connected,
    LoginRequested,
    LoginSucceeded,
    LoginFailed,
    ConnectFailure,
    ConnectTimeout,
    HeartbeatTimeout,
    EndOfConnection,
    Logout,
    Close,
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connect => "connect",
            Self::Connected => "connected",
            Self::LoginRequested => "login_requested",
            Self::LoginSucceeded => "login_succeeded",
            Self::LoginFailed => "login_failed",
            Self::ConnectFailure => "connect_failure",
            Self::ConnectTimeout => "connect_timeout",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::EndOfConnection => "end_of_connection",
            Self::Logout => "logout",
            Self::Close => "close",
        };
        f.write_str(name)
    }
}

/// Transition table. `None` means the event is not valid in `state`.
pub fn next(state: SessionState, event: SessionEvent) -> Option<SessionState> {
    use SessionEvent as E;
    use SessionState as S;

    match (state, event) {
        (S::Closed, _) => None,
        (_, E::Close) => Some(S::Closed),

        (S::Disconnected | S::Failed, E::Connect) => Some(S::Connecting),
        (S::Connecting, E::Connected) => Some(S::Connected),
        (S::Connected, E::LoginRequested) => Some(S::Authenticating),
        (S::Authenticating, E::LoginSucceeded) => Some(S::Ready),
        (S::Authenticating, E::LoginFailed) => Some(S::Failed),

        (S::Connecting | S::Connected | S::Authenticating, E::ConnectFailure | E::ConnectTimeout) => {
            Some(S::Failed)
        }
        (
            S::Connecting | S::Connected | S::Authenticating | S::Ready,
            E::HeartbeatTimeout | E::EndOfConnection,
        ) => Some(S::Failed),

        (S::Ready, E::Logout) => Some(S::Connected),

        _ => None,
    }
}

/// An applied transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SessionState,
    pub to: SessionState,
    /// First entry into `Ready` for this machine's lifetime
    pub first_ready: bool,
}

#[derive(Debug)]
struct Inner {
    state: SessionState,
    reached_ready: bool,
}

/// Shared between caller threads and the vendor callback thread.
#[derive(Debug)]
pub struct ConnectionStateMachine {
    inner: Mutex<Inner>,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: SessionState::Disconnected,
                reached_ready: false,
            }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn is_closed(&self) -> bool {
        self.state() == SessionState::Closed
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    /// Apply one event atomically. The state is unchanged on error.
    pub fn apply(&self, event: SessionEvent) -> Result<Transition> {
        let mut inner = self.inner.lock();
        let from = inner.state;
        let to = next(from, event).ok_or_else(|| Error::InvalidTransition {
            state: from,
            event: event.to_string(),
        })?;

        inner.state = to;
        let first_ready = to == SessionState::Ready && !inner.reached_ready;
        if first_ready {
            inner.reached_ready = true;
        }
        Ok(Transition { from, to, first_ready })
    }

    /// Operations that talk to the venue are only valid once logged in.
    pub fn ensure_ready(&self) -> Result<()> {
        match self.state() {
            SessionState::Ready => Ok(()),
            state => Err(Error::NotReady { state }),
        }
    }
}
