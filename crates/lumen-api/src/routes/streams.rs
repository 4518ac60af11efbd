use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use lumen_core::{streams, AppState};
use lumen_models::stream::Stream;
use serde::Deserialize;

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
pub struct CreateStreamRequest {
    pub title: String,
}

pub async fn create_stream(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateStreamRequest>,
) -> Result<(StatusCode, Json<Stream>), ApiError> {
    let stream = streams::create_stream(&state, auth.user_id, &body.title).await?;
    Ok((StatusCode::CREATED, Json(stream)))
}

pub async fn get_stream(
    State(state): State<AppState>,
    Path(stream_id): Path<i64>,
) -> Result<Json<Stream>, ApiError> {
    let mut stream = streams::get_stream(&state, stream_id).await?;
    if stream.is_live {
        stream.viewer_count = state.connections.stream_viewer_count(stream_id) as i64;
    }
    Ok(Json(stream))
}

pub async fn end_stream(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(stream_id): Path<i64>,
) -> Result<Json<Stream>, ApiError> {
    Ok(Json(
        streams::end_stream(&state, auth.user_id, stream_id).await?,
    ))
}
