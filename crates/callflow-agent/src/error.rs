#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("cannot read credentials: {0}")]
    Credentials(String),

    #[error("token exchange failed ({status}): {message}")]
    Exchange { status: u16, message: String },

    #[error("signing failed: {0}")]
    Signing(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum NluError {
    /// The engine rejected the session path or request shape (HTTP 400/404).
    #[error("invalid NLU session {session_id}: {message}")]
    InvalidSession { session_id: String, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("NLU request timed out after {ms}ms")]
    Timeout { ms: u64 },

    #[error("NLU unavailable: {0}")]
    Unavailable(String),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("embedding generation is disabled")]
    Disabled,

    #[error("embedding model unavailable: {0}")]
    Unavailable(String),

    #[error("expected {expected}-dimensional embedding, got {actual}")]
    Dimension { expected: usize, actual: usize },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
}

#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("vector index unavailable: {0}")]
    Unavailable(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
}
