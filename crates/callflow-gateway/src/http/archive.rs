use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};
use callflow_core::{CallflowError, FullTranscriptPayload};
use callflow_history::signature::{verify, SIGNATURE_HEADER};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, warn};

use crate::app::AppState;
use crate::http::{api_error, ApiError};

/// POST /save-transcript
///
/// Archive ingestion. 404 when the archive is disabled, 401 on a bad
/// signature, 400 on a malformed payload, 500 when storing fails.
pub async fn save_transcript_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let Some(archive) = state.archive.as_ref() else {
        warn!("transcript received but archive is disabled");
        return Err(api_error(
            StatusCode::NOT_FOUND,
            CallflowError::Disabled("archive".into()),
        ));
    };

    if let Some(secret) = state.config.archive.secret.as_deref().filter(|s| !s.is_empty()) {
        let header = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
        if let Err(reason) = verify(secret, header, &body) {
            warn!(reason = %reason, "transcript signature rejected");
            return Err(api_error(
                StatusCode::UNAUTHORIZED,
                CallflowError::Unauthorized(reason),
            ));
        }
    }

    let payload: FullTranscriptPayload = serde_json::from_slice(&body).map_err(|e| {
        warn!(error = %e, "invalid transcript payload");
        api_error(
            StatusCode::BAD_REQUEST,
            CallflowError::InvalidEvent(e.to_string()),
        )
    })?;

    let id = archive.ingest(&payload).map_err(|e| {
        error!(call_id = %payload.call_id, error = %e, "failed to archive transcript");
        api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            CallflowError::Store(e.to_string()),
        )
    })?;

    Ok(Json(json!({"status": "success", "id": id})))
}
