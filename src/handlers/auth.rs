//! Login handler.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use metrics::counter;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;

use crate::auth::authenticate;
use crate::errors::GalleryError;
use crate::metrics::LOGIN_ATTEMPTS_TOTAL;
use crate::AppState;

/// Login request body.
#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// Login response body. No other account fields are ever returned.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub token: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
}

/// `POST /api/login` -- exchange email and password for a bearer token.
#[utoipa::path(
    post,
    path = "/api/login",
    tag = "Auth",
    operation_id = "Login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token issued", body = LoginResponse),
        (status = 400, description = "Malformed body"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal error")
    )
)]
pub async fn login(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<LoginResponse>, GalleryError> {
    let Json(req) = payload.map_err(|e| GalleryError::validation(e.body_text()))?;

    match authenticate(state.metadata.as_ref(), &state.tokens, &req.email, &req.password).await {
        Ok(grant) => {
            counter!(LOGIN_ATTEMPTS_TOTAL, "outcome" => "success").increment(1);
            info!(email = %req.email, admin = grant.is_admin, "Login succeeded");
            Ok(Json(LoginResponse {
                token: grant.token,
                is_admin: grant.is_admin,
            }))
        }
        Err(err) => {
            counter!(LOGIN_ATTEMPTS_TOTAL, "outcome" => "failure").increment(1);
            Err(err)
        }
    }
}
