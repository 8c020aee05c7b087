use thiserror::Error;

/// Errors that can occur while persisting conversation state.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The stored `state_json` column could not be (de)serialized.
    #[error("state serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The write carried an older turn index than the stored state.
    #[error("stale write for call {call_id}: stored turn {stored}, attempted {attempted}")]
    Conflict {
        call_id: String,
        stored: u32,
        attempted: u32,
    },
}

impl SessionError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, SessionError::Conflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
