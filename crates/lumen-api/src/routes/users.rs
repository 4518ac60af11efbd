use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use lumen_core::{direct_messages, user, AppState};
use lumen_models::user::UserSnapshot;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserSnapshot>, ApiError> {
    Ok(Json(user::get_profile(&state, auth.user_id).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UpdateMeRequest>,
) -> Result<Json<UserSnapshot>, ApiError> {
    let updated = user::update_profile(
        &state,
        auth.user_id,
        body.display_name.as_deref(),
        body.avatar_url.as_deref(),
    )
    .await?;
    Ok(Json(updated))
}

pub async fn list_blocked(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<UserSnapshot>>, ApiError> {
    Ok(Json(direct_messages::list_blocked(&state, auth.user_id).await?))
}

pub async fn block_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    direct_messages::block_user(&state, auth.user_id, target_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unblock_user(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(target_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let removed = direct_messages::unblock_user(&state, auth.user_id, target_id).await?;
    Ok(Json(json!({ "removed": removed })))
}
