use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use lumen_core::direct_messages::{self, SendOutcome};
use lumen_core::AppState;
use lumen_models::message::{ConversationSummary, DirectMessage, MessageRequest, MessageType, RequestAction};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    #[serde(with = "lumen_models::id")]
    pub recipient_id: i64,
    pub content: String,
    #[serde(default)]
    pub message_type: Option<MessageType>,
}

#[derive(Deserialize)]
pub struct RespondRequest {
    pub action: RequestAction,
}

#[derive(Deserialize)]
pub struct RequestsQuery {
    pub direction: Option<String>,
}

#[derive(Deserialize)]
pub struct ThreadQuery {
    pub before: Option<i64>,
    pub limit: Option<i64>,
}

/// 201 when the message lands in a conversation, 202 when it became a
/// message request awaiting the recipient.
pub async fn send_message(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = direct_messages::send_message(
        &state,
        auth.user_id,
        body.recipient_id,
        &body.content,
        body.message_type.unwrap_or(MessageType::Text),
    )
    .await?;
    Ok(match outcome {
        SendOutcome::Delivered(message) => (
            StatusCode::CREATED,
            Json(json!({ "status": "delivered", "message": message })),
        ),
        SendOutcome::RequestCreated(request) => (
            StatusCode::ACCEPTED,
            Json(json!({ "status": "request_created", "request": request })),
        ),
    })
}

pub async fn list_conversations(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    Ok(Json(
        direct_messages::list_conversations(&state, auth.user_id).await?,
    ))
}

pub async fn list_requests(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<RequestsQuery>,
) -> Result<Json<Vec<MessageRequest>>, ApiError> {
    let requests = match query.direction.as_deref() {
        None | Some("incoming") => {
            direct_messages::list_incoming_requests(&state, auth.user_id).await?
        }
        Some("outgoing") => direct_messages::list_outgoing_requests(&state, auth.user_id).await?,
        Some(other) => {
            return Err(ApiError::BadRequest(format!("unknown direction '{other}'")));
        }
    };
    Ok(Json(requests))
}

pub async fn respond_to_request(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<i64>,
    Json(body): Json<RespondRequest>,
) -> Result<Json<Value>, ApiError> {
    let response =
        direct_messages::respond_to_request(&state, request_id, auth.user_id, body.action).await?;
    Ok(Json(json!({
        "request": response.request,
        "conversationId": response.conversation_id.map(|id| id.to_string()),
        "message": response.message,
    })))
}

pub async fn get_thread(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(other_id): Path<i64>,
    Query(query): Query<ThreadQuery>,
) -> Result<Json<Vec<DirectMessage>>, ApiError> {
    let messages =
        direct_messages::get_thread(&state, auth.user_id, other_id, query.before, query.limit)
            .await?;
    Ok(Json(messages))
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(other_id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let updated = direct_messages::mark_thread_read(&state, auth.user_id, other_id).await?;
    Ok(Json(json!({ "updated": updated })))
}
