use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use callflow_core::CallflowError;
use callflow_sessions::CallSummary;
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::app::AppState;
use crate::http::{api_error, ApiError};

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 200;

#[derive(Debug, Deserialize)]
pub struct RecentCallsQuery {
    pub limit: Option<usize>,
}

/// GET /v1/calls?limit=N
///
/// Most recently active calls, newest first.
pub async fn recent_calls_handler(
    State(state): State<Arc<AppState>>,
    Query(q): Query<RecentCallsQuery>,
) -> Result<Json<Vec<CallSummary>>, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT);
    state
        .processor
        .store()
        .list_recent(limit)
        .await
        .map(Json)
        .map_err(|e| {
            warn!(error = %e, "failed to list recent calls");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                CallflowError::Store(e.to_string()),
            )
        })
}
