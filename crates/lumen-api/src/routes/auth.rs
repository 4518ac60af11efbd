use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{AppendHeaders, IntoResponse},
    Json,
};
use lumen_core::{auth, AppState};
use serde::Deserialize;
use serde_json::json;

use crate::error::ApiError;
use crate::middleware::{AuthUser, TOKEN_COOKIE};

const TOKEN_COOKIE_PATH: &str = "/";

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

fn build_token_cookie(token: &str, max_age_secs: i64) -> String {
    format!(
        "{name}={value}; HttpOnly; Path={path}; SameSite=Lax; Max-Age={max_age}",
        name = TOKEN_COOKIE,
        value = token,
        path = TOKEN_COOKIE_PATH,
        max_age = max_age_secs,
    )
}

fn build_token_cookie_clear() -> String {
    format!(
        "{name}=; HttpOnly; Path={path}; SameSite=Lax; Max-Age=0",
        name = TOKEN_COOKIE,
        path = TOKEN_COOKIE_PATH,
    )
}

fn header_value(raw: &str) -> Result<HeaderValue, ApiError> {
    HeaderValue::from_str(raw).map_err(|e| ApiError::Internal(anyhow::anyhow!(e)))
}

fn session_response(
    state: &AppState,
    status: StatusCode,
    login: auth::LoginResult,
) -> Result<impl IntoResponse, ApiError> {
    let cookie = build_token_cookie(&login.token, state.config.session_ttl.as_secs() as i64);
    Ok((
        status,
        AppendHeaders([(header::SET_COOKIE, header_value(&cookie)?)]),
        Json(json!({
            "token": login.token,
            "user": login.user,
        })),
    ))
}

pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let login = auth::register(&state, &body.username, &body.password).await?;
    session_response(&state, StatusCode::CREATED, login)
}

pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let login = auth::login(&state, &body.username, &body.password).await?;
    session_response(&state, StatusCode::OK, login)
}

pub async fn logout(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    auth::logout(&state, &auth.token).await?;
    Ok((
        StatusCode::NO_CONTENT,
        AppendHeaders([(header::SET_COOKIE, header_value(&build_token_cookie_clear())?)]),
    ))
}

pub async fn logout_all(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<impl IntoResponse, ApiError> {
    let revoked = auth::logout_all(&state, auth.user_id).await?;
    Ok((
        AppendHeaders([(header::SET_COOKIE, header_value(&build_token_cookie_clear())?)]),
        Json(json!({ "revoked": revoked })),
    ))
}
