use async_trait::async_trait;
use callflow_core::NluResult;

use crate::error::NluError;

/// One utterance sent to the NLU engine.
#[derive(Debug, Clone, PartialEq)]
pub struct NluRequest {
    pub session_id: String,
    pub text: String,
    pub language_code: String,
    /// Prior-conversation context block; `None` when retrieval found nothing.
    pub context: Option<String>,
}

/// Common interface for NLU engines.
#[async_trait]
pub trait NluClient: Send + Sync {
    /// Client name for logging and error messages.
    fn name(&self) -> &str;

    async fn detect_intent(&self, req: &NluRequest) -> Result<NluResult, NluError>;
}

/// Wired in when no NLU agent is configured. Every call fails, so callers
/// hear the apology prompt instead of silence.
pub struct NullNluClient;

#[async_trait]
impl NluClient for NullNluClient {
    fn name(&self) -> &str {
        "null"
    }

    async fn detect_intent(&self, _req: &NluRequest) -> Result<NluResult, NluError> {
        Err(NluError::Unavailable("no NLU agent configured".into()))
    }
}
