//! services/api/src/web/auth.rs
//!
//! Authentication endpoints for registration, login, and logout.

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::{
    gate_error_response,
    middleware::{session_id_from_headers, SESSION_COOKIE},
    state::AppState,
};

const SESSION_LIFETIME_DAYS: i64 = 30;

//=========================================================================================
// Request/Response Types
//=========================================================================================

// No `Debug` derives: these carry plaintext secrets.
#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub identity: String,
    pub secret: String,
    pub secret_confirmation: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub identity: String,
    pub secret: String,
}

#[derive(Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub account_id: Uuid,
    pub identity: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

/// Creates a login session for `account_id` and returns its `Set-Cookie` value.
async fn start_session(state: &AppState, account_id: Uuid) -> Result<String, (StatusCode, String)> {
    let auth_session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_LIFETIME_DAYS);

    state
        .sessions
        .create_auth_session(&auth_session_id, account_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to create session".to_string())
        })?;

    Ok(format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        auth_session_id,
        Duration::days(SESSION_LIFETIME_DAYS).num_seconds()
    ))
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/register - Create a new account
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AuthResponse),
        (status = 400, description = "Missing identity or secret, or confirmation mismatch"),
        (status = 409, description = "Identity already registered"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // 1. Validate the form
    if req.identity.trim().is_empty() || req.secret.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Identity and secret are required".to_string(),
        ));
    }
    if req.secret != req.secret_confirmation {
        return Err((
            StatusCode::BAD_REQUEST,
            "Secret and confirmation do not match".to_string(),
        ));
    }

    // 2. Create the account (hashing happens in the gate)
    let account = state
        .gate
        .register(&req.identity, &req.secret)
        .await
        .map_err(gate_error_response)?;

    // 3. Log the new account in
    let cookie = start_session(&state, account.id).await?;

    let response = AuthResponse {
        account_id: account.id,
        identity: account.identity,
    };
    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/login - Login with an existing account
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let account = state
        .gate
        .authenticate(&req.identity, &req.secret)
        .await
        .map_err(gate_error_response)?
        .ok_or((
            StatusCode::UNAUTHORIZED,
            "Invalid identity or secret".to_string(),
        ))?;

    let cookie = start_session(&state, account.id).await?;

    let response = AuthResponse {
        account_id: account.id,
        identity: account.identity,
    };
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie)],
        Json(response),
    ))
}

/// POST /auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let auth_session_id = session_id_from_headers(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .sessions
        .delete_auth_session(auth_session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
        })?;

    let cookie = format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    );
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)]))
}
