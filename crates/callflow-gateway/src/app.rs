use axum::{
    routing::{get, post},
    Router,
};
use callflow_core::CallflowConfig;
use callflow_history::TranscriptArchive;
use callflow_turn::TurnProcessor;
use std::sync::Arc;
use std::time::Instant;

/// Central shared state, passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: Arc<CallflowConfig>,
    pub processor: TurnProcessor,
    /// Present only when `archive.enabled`.
    pub archive: Option<TranscriptArchive>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(
        config: Arc<CallflowConfig>,
        processor: TurnProcessor,
        archive: Option<TranscriptArchive>,
    ) -> Self {
        Self {
            config,
            processor,
            archive,
            started_at: Instant::now(),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/voice", post(crate::http::voice::voice_handler))
        .route("/v1/turns", post(crate::http::turns::turn_handler))
        .route("/v1/calls", get(crate::http::calls::recent_calls_handler))
        .route(
            "/save-transcript",
            post(crate::http::archive::save_transcript_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
