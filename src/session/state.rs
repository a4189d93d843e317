//! Session lifecycle states.

use std::fmt;

/// Lifecycle state of a camera session.
///
/// `Closed -> Opening -> Open -> Closing -> Closed`, with `Failed` reachable
/// from `Opening` and `Open`. `Failed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Not capturing; initial and final state.
    Closed,
    /// Resolving settings and starting the backend.
    Opening,
    /// Frames are being produced.
    Open,
    /// Cancelling waiters and stopping the capture thread.
    Closing,
    /// The backend faulted.
    Failed,
}

impl SessionState {
    /// Returns true if the transition `self -> next` is allowed.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Closed, Opening)
                | (Opening, Open)
                | (Opening, Failed)
                | (Open, Closing)
                | (Open, Failed)
                | (Closing, Closed)
        )
    }

    /// Returns true if no further transition is possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Closed => "closed",
            SessionState::Opening => "opening",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionState::*;

    #[test]
    fn test_happy_path() {
        let path = [Closed, Opening, Open, Closing, Closed];
        for pair in path.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{:?}", pair);
        }
    }

    #[test]
    fn test_failed_is_terminal() {
        assert!(Opening.can_transition_to(Failed));
        assert!(Open.can_transition_to(Failed));
        assert!(Failed.is_terminal());
        for next in [Closed, Opening, Open, Closing] {
            assert!(!Failed.can_transition_to(next));
        }
    }

    #[test]
    fn test_no_shortcuts() {
        assert!(!Closed.can_transition_to(Open));
        assert!(!Open.can_transition_to(Closed));
        assert!(!Closing.can_transition_to(Open));
        assert!(!Closing.can_transition_to(Failed));
    }
}
