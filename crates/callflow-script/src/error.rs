use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("XML write error: {0}")]
    Xml(String),

    #[error("rendered script is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

pub type Result<T> = std::result::Result<T, ScriptError>;
