//! User handlers
//!
//! Authentication is handled outside this service; users exist so
//! campaigns have an owner to hang dashboards and reports off.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use mailburst_common::types::EmailAddress;
use mailburst_storage::{CreateUser, User, UserRepository};
use serde::Deserialize;
use tracing::info;

use crate::handlers::{error_response, ErrorResponse};
use crate::AppState;

/// Request body for creating a user
#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub email: String,
    pub name: Option<String>,
}

/// Create a new user
///
/// POST /api/v1/users
pub async fn create_user(
    State(state): State<Arc<AppState>>,
    Json(input): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), (StatusCode, Json<ErrorResponse>)> {
    if EmailAddress::parse(&input.email).is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "validation_error".to_string(),
                message: "Invalid email address".to_string(),
            }),
        ));
    }

    let user = UserRepository::new(state.store.clone())
        .create(CreateUser {
            email: input.email,
            name: input.name,
        })
        .await
        .map_err(|e| error_response(&e))?;

    info!(user = %user.email, "User created");

    Ok((StatusCode::CREATED, Json(user)))
}
