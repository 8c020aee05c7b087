use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Form,
};
use callflow_core::CallflowError;
use callflow_script::{twiml, RenderVars};
use callflow_turn::TurnEvent;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{error, warn};

use crate::app::AppState;

/// Fields of Twilio's voice webhook that drive a turn. Twilio posts many more;
/// they are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VoiceWebhook {
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub speech_result: Option<String>,
    #[serde(default)]
    pub digits: Option<String>,
    /// Decimal string; blank or unparseable values are treated as absent.
    #[serde(default)]
    pub confidence: Option<String>,
}

impl VoiceWebhook {
    /// `None` when the request carries no call identifier.
    pub fn into_event(self) -> Option<TurnEvent> {
        let call_sid = self.call_sid.filter(|s| !s.trim().is_empty())?;
        let mut event = TurnEvent::new(
            call_sid,
            self.from.unwrap_or_default(),
            self.to.unwrap_or_default(),
        );
        event.speech = self.speech_result;
        event.digits = self.digits;
        event.speech_confidence = self
            .confidence
            .as_deref()
            .and_then(|c| c.trim().parse::<f64>().ok());
        Some(event)
    }
}

/// POST /voice
///
/// Twilio voice webhook. Answers with TwiML for every call event; only a
/// request without `CallSid` is rejected (400).
pub async fn voice_handler(
    State(state): State<Arc<AppState>>,
    Form(hook): Form<VoiceWebhook>,
) -> Response {
    let Some(event) = hook.into_event() else {
        let err = CallflowError::InvalidEvent("missing CallSid".into());
        warn!(error = %err, "voice webhook rejected");
        return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
    };

    let outcome = state.processor.handle(&event).await;
    let vars = RenderVars::new(&event.from, &event.to);

    match twiml::render(&outcome.script, &vars) {
        Ok(xml) => ([(header::CONTENT_TYPE, "application/xml")], xml).into_response(),
        Err(e) => {
            let err = CallflowError::Render(e.to_string());
            error!(call_id = %event.call_id, error = %err, "failed to render TwiML");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    }
}
