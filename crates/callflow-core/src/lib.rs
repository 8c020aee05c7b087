//! Shared building blocks for the callflow workspace: configuration, the
//! per-call data model, identifiers and the top-level error type.

pub mod config;
pub mod conversation;
pub mod error;
pub mod phone;
pub mod types;

pub use config::CallflowConfig;
pub use conversation::{
    ConversationState, FullTranscriptPayload, HandoffDirective, NluResult, Speaker,
    TranscriptEntry,
};
pub use error::{CallflowError, Result};
pub use types::{CallId, SessionId, TenantId};
