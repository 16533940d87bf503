//! API handlers

pub mod campaigns;
pub mod dashboard;
pub mod health;
pub mod tracking;
pub mod users;

use axum::http::StatusCode;
use axum::Json;
use mailburst_common::Error;
use serde::Serialize;

/// Error response
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Map a core error onto its HTTP representation
pub fn error_response(e: &Error) -> (StatusCode, Json<ErrorResponse>) {
    let status =
        StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (
        status,
        Json(ErrorResponse {
            error: e.code().to_lowercase(),
            message: e.to_string(),
        }),
    )
}
