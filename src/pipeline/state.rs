use serde::{Deserialize, Serialize};

/// Stages of one analysis run. A run only ever moves forward.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Loading,
    Processing,
    Windowing,
    Analyzing,
    Completed,
    Error,
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Loading
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Error)
    }

    /// The stage after this one on the success path.
    pub fn next(&self) -> Option<RunState> {
        match self {
            RunState::Loading => Some(RunState::Processing),
            RunState::Processing => Some(RunState::Windowing),
            RunState::Windowing => Some(RunState::Analyzing),
            RunState::Analyzing => Some(RunState::Completed),
            RunState::Completed | RunState::Error => None,
        }
    }

    /// Success moves one step forward; any live stage may fail.
    pub fn can_transition_to(&self, target: RunState) -> bool {
        if self.is_terminal() {
            return false;
        }
        target == RunState::Error || self.next() == Some(target)
    }
}
