use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use axum_extra::extract::cookie::CookieJar;
use lumen_core::AppState;
use lumen_models::user::UserSnapshot;

use crate::error::ApiError;

pub const TOKEN_COOKIE: &str = "token";
pub const TOKEN_HEADER: &str = "x-auth-token";

/// The caller's bearer token: `Authorization: Bearer`, then the `token`
/// cookie, then `x-auth-token`.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let bearer = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty());
    if let Some(token) = bearer {
        return Some(token.to_string());
    }

    if let Some(cookie) = CookieJar::from_headers(headers).get(TOKEN_COOKIE) {
        if !cookie.value().is_empty() {
            return Some(cookie.value().to_string());
        }
    }

    headers
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

pub struct AuthUser {
    pub user_id: i64,
    pub user: UserSnapshot,
    pub token: String,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_token(&parts.headers).ok_or(ApiError::Unauthorized)?;
        let user = state
            .sessions
            .get_session_by_token(&token)
            .ok_or(ApiError::Unauthorized)?;

        // Fire-and-forget; never delays the request.
        state.presence.touch(user.id);

        Ok(AuthUser {
            user_id: user.id,
            user,
            token,
        })
    }
}
