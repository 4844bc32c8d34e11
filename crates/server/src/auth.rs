//! Bearer session tokens.
//!
//! Tokens are HS256 JWTs carrying the user id and role. The role is trusted
//! for the lifetime of the token; a role change takes effect at next login.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use server_api::Actor;
use shared::{
    domain::{Role, UserId},
    error::{ApiError, ErrorCode},
    protocol::UserSummary,
};
use tracing::debug;

use crate::app_state::AppState;

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl_seconds: i64,
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct Claims {
    pub(crate) sub: String,
    pub(crate) role: Role,
    pub(crate) iat: i64,
    pub(crate) exp: i64,
}

pub fn mint_token(
    cfg: &TokenConfig,
    user: &UserSummary,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::seconds(cfg.ttl_seconds);
    let claims = Claims {
        sub: format!("user:{}", user.id.0),
        role: user.role,
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(cfg.secret.as_bytes()),
    )
}

pub fn verify_token(cfg: &TokenConfig, token: &str) -> Result<Actor, ApiError> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(cfg.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|err| {
        debug!(error = %err, "rejected session token");
        ApiError::new(ErrorCode::Unauthorized, "invalid or expired session token")
    })?;

    let user_id = data
        .claims
        .sub
        .strip_prefix("user:")
        .and_then(|id| id.parse::<i64>().ok())
        .map(UserId)
        .ok_or_else(|| ApiError::new(ErrorCode::Unauthorized, "malformed token subject"))?;
    Ok(Actor {
        user_id,
        role: data.claims.role,
    })
}

pub(crate) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Extractor for routes that require a signed-in user.
pub(crate) struct Authenticated(pub(crate) Actor);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for Authenticated {
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers).ok_or_else(|| {
            (
                StatusCode::UNAUTHORIZED,
                Json(ApiError::new(
                    ErrorCode::Unauthorized,
                    "missing bearer token",
                )),
            )
        })?;
        verify_token(&state.tokens, token)
            .map(Authenticated)
            .map_err(|err| (StatusCode::UNAUTHORIZED, Json(err)))
    }
}

#[cfg(test)]
#[path = "tests/auth_tests.rs"]
mod tests;
