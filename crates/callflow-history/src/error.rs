use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The archive answered with a non-success status.
    #[error("archive rejected transcript ({status}): {message}")]
    Status { status: u16, message: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, HistoryError>;
