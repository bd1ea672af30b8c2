//! Session lifecycle state.
//!
//! `None → Started → Running → Shutdown`, and back to `None` from anywhere
//! once the server process is gone. [`StateMachine::advance`] is the only way
//! the state changes; it rejects every other transition.

use std::fmt;

/// Lifecycle state of a language server session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No server process.
    #[default]
    None,
    /// Process spawned, `initialize` handshake in flight.
    Started,
    /// Handshake complete; requests are accepted.
    Running,
    /// `shutdown`/`exit` issued; no further requests are accepted.
    Shutdown,
}

impl SessionState {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Started => "started",
            Self::Running => "running",
            Self::Shutdown => "shutdown",
        }
    }

    /// Whether `self → next` is a legal transition. Staying put is not a
    /// transition.
    #[must_use]
    pub fn can_advance_to(self, next: SessionState) -> bool {
        matches!(
            (self, next),
            (Self::None, Self::Started)
                | (Self::Started, Self::Running)
                | (Self::Running, Self::Shutdown)
                | (Self::Started | Self::Running | Self::Shutdown, Self::None)
        )
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal session transition {from} -> {to}")]
pub struct IllegalTransition {
    pub from: SessionState,
    pub to: SessionState,
}

/// A state change that actually happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Transition {
    pub previous: SessionState,
    pub current: SessionState,
}

#[derive(Debug, Default)]
pub(crate) struct StateMachine {
    state: SessionState,
}

impl StateMachine {
    pub fn current(&self) -> SessionState {
        self.state
    }

    /// Whether outbound requests and notifications may be sent.
    pub fn accepts_traffic(&self) -> bool {
        self.state == SessionState::Running
    }

    /// Move to `next`.
    ///
    /// Returns `Ok(None)` when already in `next`, so repeated observations
    /// (e.g. two exit reports) stay silent.
    pub fn advance(&mut self, next: SessionState) -> Result<Option<Transition>, IllegalTransition> {
        if self.state == next {
            return Ok(None);
        }
        if !self.state.can_advance_to(next) {
            return Err(IllegalTransition {
                from: self.state,
                to: next,
            });
        }
        let previous = std::mem::replace(&mut self.state, next);
        tracing::debug!("LSP session state {previous} -> {next}");
        Ok(Some(Transition {
            previous,
            current: next,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path() {
        let mut sm = StateMachine::default();
        assert_eq!(sm.current(), SessionState::None);
        assert!(!sm.accepts_traffic());

        for next in [
            SessionState::Started,
            SessionState::Running,
            SessionState::Shutdown,
            SessionState::None,
        ] {
            let transition = sm.advance(next).unwrap().unwrap();
            assert_eq!(transition.current, next);
            assert_eq!(sm.accepts_traffic(), next == SessionState::Running);
        }
    }

    #[test]
    fn test_any_state_can_drop_to_none() {
        for from in [
            SessionState::Started,
            SessionState::Running,
            SessionState::Shutdown,
        ] {
            assert!(from.can_advance_to(SessionState::None));
        }
    }

    #[test]
    fn test_repeated_state_is_silent() {
        let mut sm = StateMachine::default();
        assert_eq!(sm.advance(SessionState::None), Ok(None));
        sm.advance(SessionState::Started).unwrap();
        assert_eq!(sm.advance(SessionState::Started), Ok(None));
    }

    #[test]
    fn test_illegal_transitions_rejected() {
        let mut sm = StateMachine::default();
        let err = sm.advance(SessionState::Running).unwrap_err();
        assert_eq!(err.from, SessionState::None);
        assert_eq!(err.to, SessionState::Running);
        assert_eq!(sm.current(), SessionState::None);

        sm.advance(SessionState::Started).unwrap();
        assert!(sm.advance(SessionState::Shutdown).is_err());
        sm.advance(SessionState::Running).unwrap();
        assert!(sm.advance(SessionState::Started).is_err());
        sm.advance(SessionState::Shutdown).unwrap();
        assert!(sm.advance(SessionState::Running).is_err());
    }

    #[test]
    fn test_error_message() {
        let err = IllegalTransition {
            from: SessionState::None,
            to: SessionState::Shutdown,
        };
        assert_eq!(err.to_string(), "illegal session transition none -> shutdown");
    }
}
