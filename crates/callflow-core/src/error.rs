use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallflowError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid request: {0}")]
    InvalidEvent(String),

    #[error("Authentication failed: {0}")]
    Unauthorized(String),

    #[error("{0} is disabled")]
    Disabled(String),

    #[error("Storage error: {0}")]
    Store(String),

    #[error("Script rendering error: {0}")]
    Render(String),
}

impl CallflowError {
    /// Short error code string returned in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            CallflowError::Config(_) => "CONFIG_ERROR",
            CallflowError::InvalidEvent(_) => "INVALID_EVENT",
            CallflowError::Unauthorized(_) => "UNAUTHORIZED",
            CallflowError::Disabled(_) => "DISABLED",
            CallflowError::Store(_) => "STORE_ERROR",
            CallflowError::Render(_) => "RENDER_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, CallflowError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(CallflowError::InvalidEvent("x".into()).code(), "INVALID_EVENT");
        assert_eq!(
            CallflowError::Disabled("archive".into()).to_string(),
            "archive is disabled"
        );
    }
}
