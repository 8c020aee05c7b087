//! What the telephony gateway should do next, as a small instruction tree,
//! and its rendering to Twilio TwiML.

pub mod builder;
pub mod error;
pub mod script;
pub mod twiml;

pub use builder::{Decision, ScriptBuilder};
pub use error::{Result, ScriptError};
pub use script::{InputMode, Listen, ResponseScript, ScriptNode, Speak, Transfer};
pub use twiml::RenderVars;
