//! Auth routes — register, login, validate, and the bearer extractor.

use axum::extract::{FromRef, FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::services::auth::{self, AuthError};
use crate::state::AppState;

// =============================================================================
// AUTH EXTRACTOR
// =============================================================================

/// Identity proven by an `Authorization: Bearer <jwt>` header.
/// Use as a handler parameter to require authentication.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
    pub name: String,
}

/// Pull the token out of an `Authorization: Bearer` header, if well-formed.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

impl<S> FromRequestParts<S> for AuthUser
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or(StatusCode::UNAUTHORIZED)?;
        let app_state = AppState::from_ref(state);
        let claims = app_state
            .tokens
            .verify(token)
            .map_err(|_| StatusCode::UNAUTHORIZED)?;

        Ok(Self {
            user_id: claims.sub,
            name: claims.name,
        })
    }
}

// =============================================================================
// HANDLERS
// =============================================================================

#[derive(Deserialize)]
pub struct RegisterBody {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

/// `POST /api/v1/auth/register` — create an account.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    if body.email.trim().is_empty() || body.password.is_empty() || body.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let user = auth::register_user(&state.pool, &body.email, &body.name, &body.password)
        .await
        .map_err(auth_error_to_status)?;

    Ok((StatusCode::CREATED, Json(json!({ "user": user }))))
}

/// `POST /api/v1/auth/login` — exchange credentials for a bearer token.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginBody>,
) -> Result<Json<serde_json::Value>, StatusCode> {
    let user = auth::login_user(&state.pool, &body.email, &body.password)
        .await
        .map_err(auth_error_to_status)?;
    let token = state
        .tokens
        .issue(user.id, &user.name)
        .map_err(auth_error_to_status)?;

    Ok(Json(json!({
        "user": user,
        "accessToken": token,
        "tokenType": "Bearer",
        "expiresIn": state.tokens.ttl_secs(),
    })))
}

/// `GET /api/v1/auth/validate` — confirm a bearer token is still good.
pub async fn validate(auth: AuthUser) -> Json<serde_json::Value> {
    Json(json!({
        "valid": true,
        "userId": auth.user_id,
        "name": auth.name,
    }))
}

pub(crate) fn auth_error_to_status(err: AuthError) -> StatusCode {
    match err {
        AuthError::InvalidCredentials | AuthError::InvalidToken => StatusCode::UNAUTHORIZED,
        AuthError::EmailTaken => StatusCode::CONFLICT,
        AuthError::Token(_) | AuthError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod tests;
