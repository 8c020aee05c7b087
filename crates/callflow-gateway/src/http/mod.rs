pub mod archive;
pub mod calls;
pub mod health;
pub mod turns;
pub mod voice;

use axum::{http::StatusCode, Json};
use callflow_core::CallflowError;
use serde_json::{json, Value};

/// JSON error body shared by the non-TwiML endpoints.
pub type ApiError = (StatusCode, Json<Value>);

pub fn api_error(status: StatusCode, err: CallflowError) -> ApiError {
    (
        status,
        Json(json!({"error": err.to_string(), "code": err.code()})),
    )
}
