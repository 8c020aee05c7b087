use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a call is in the turn cycle.
///
/// ```text
/// New ─► AwaitingInput ─► ProcessingTurn ─► Responding ─► AwaitingInput
///                              │                 └──────► HandedOff
///                              └─► Errored ─► (next event) ProcessingTurn
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallPhase {
    New,
    AwaitingInput,
    ProcessingTurn,
    Responding,
    HandedOff,
    Errored,
}

impl CallPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CallPhase::HandedOff)
    }

    pub fn can_transition_to(&self, next: CallPhase) -> bool {
        use CallPhase::*;
        matches!(
            (self, next),
            (New, AwaitingInput)
                | (New, Errored)
                | (AwaitingInput, ProcessingTurn)
                | (ProcessingTurn, AwaitingInput)
                | (ProcessingTurn, Responding)
                | (ProcessingTurn, Errored)
                | (Responding, AwaitingInput)
                | (Responding, HandedOff)
                | (Errored, ProcessingTurn)
                | (Errored, AwaitingInput)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallPhase::New => "new",
            CallPhase::AwaitingInput => "awaiting_input",
            CallPhase::ProcessingTurn => "processing_turn",
            CallPhase::Responding => "responding",
            CallPhase::HandedOff => "handed_off",
            CallPhase::Errored => "errored",
        }
    }
}

impl fmt::Display for CallPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
