/// Lifecycle of a consultation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    Connecting,
    Waiting,
    Active,
    Ended,
    Failed,
}

impl CallState {
    pub fn is_terminal(self) -> bool {
        self == CallState::Ended
    }
}

/// Outcome of a requested transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Changed { from: CallState, to: CallState },
    Unchanged,
    Rejected { from: CallState, to: CallState },
}

/// Owns the current `CallState`. `transition` is the only way to change it.
#[derive(Debug)]
pub struct CallStateMachine {
    state: CallState,
}

impl CallStateMachine {
    pub fn new() -> Self {
        Self {
            state: CallState::Connecting,
        }
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn transition(&mut self, to: CallState) -> Transition {
        use CallState::*;

        let from = self.state;
        if from == to {
            return Transition::Unchanged;
        }

        let allowed = match (from, to) {
            (Ended, _) => false,
            (_, Ended) => true,
            (Connecting, Waiting | Active | Failed) => true,
            (Waiting, Active) | (Active, Waiting) => true,
            _ => false,
        };

        if allowed {
            self.state = to;
            tracing::info!("call state: {from:?} -> {to:?}");
            Transition::Changed { from, to }
        } else {
            tracing::warn!("rejected call state transition {from:?} -> {to:?}");
            Transition::Rejected { from, to }
        }
    }
}

impl Default for CallStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
