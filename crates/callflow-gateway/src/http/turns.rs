use axum::{extract::State, http::StatusCode, Json};
use callflow_core::{CallflowError, HandoffDirective};
use callflow_script::{Decision, ResponseScript};
use callflow_turn::{CallPhase, TurnEvent};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::http::{api_error, ApiError};

#[derive(Debug, Serialize)]
pub struct TurnResponse {
    pub phase: CallPhase,
    pub decision: Decision,
    pub script: ResponseScript,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub turn_index: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handoff: Option<HandoffDirective>,
}

/// POST /v1/turns
///
/// Transport-neutral variant of `/voice`: a JSON `TurnEvent` in, the
/// resulting phase and script out.
pub async fn turn_handler(
    State(state): State<Arc<AppState>>,
    Json(event): Json<TurnEvent>,
) -> Result<Json<TurnResponse>, ApiError> {
    if event.call_id.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            CallflowError::InvalidEvent("call_id is required".into()),
        ));
    }

    let outcome = state.processor.handle(&event).await;
    Ok(Json(TurnResponse {
        phase: outcome.phase,
        decision: outcome.decision,
        script: outcome.script,
        turn_index: outcome.state.map(|s| s.turn_index),
        handoff: outcome.handoff,
    }))
}
