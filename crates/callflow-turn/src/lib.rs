//! Per-call turn processing: the state machine that turns one telephony
//! event into the next response script.

pub mod event;
pub mod handoff;
pub mod phase;
pub mod processor;

pub use event::{TurnEvent, Utterance, UtteranceSource};
pub use handoff::detect_handoff;
pub use phase::CallPhase;
pub use processor::{TurnOutcome, TurnProcessor};
