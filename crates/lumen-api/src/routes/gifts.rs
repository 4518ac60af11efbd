use axum::{
    extract::{Query, State},
    Json,
};
use lumen_core::{ledger, AppState};
use lumen_models::stream::PointTransaction;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendGiftRequest {
    #[serde(with = "lumen_models::id")]
    pub recipient_id: i64,
    #[serde(with = "lumen_models::id")]
    pub gift_id: i64,
    #[serde(default, with = "lumen_models::id::option")]
    pub stream_id: Option<i64>,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[derive(Serialize)]
pub struct GiftView {
    #[serde(with = "lumen_models::id")]
    pub id: i64,
    pub name: String,
    pub cost: i64,
}

pub async fn list_gifts(State(state): State<AppState>) -> Result<Json<Vec<GiftView>>, ApiError> {
    let gifts = lumen_db::ledger::list_gifts(&state.db).await?;
    Ok(Json(
        gifts
            .into_iter()
            .map(|g| GiftView {
                id: g.id,
                name: g.name,
                cost: g.cost,
            })
            .collect(),
    ))
}

pub async fn get_balance(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Value>, ApiError> {
    let points = ledger::balance(&state, auth.user_id).await?;
    Ok(Json(json!({ "points": points })))
}

pub async fn get_transactions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<PointTransaction>>, ApiError> {
    Ok(Json(
        ledger::history(&state, auth.user_id, query.limit).await?,
    ))
}

pub async fn send_gift(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendGiftRequest>,
) -> Result<Json<Value>, ApiError> {
    let receipt = ledger::send_gift(
        &state,
        auth.user_id,
        body.recipient_id,
        body.gift_id,
        body.stream_id,
    )
    .await?;
    Ok(Json(json!({
        "gift": receipt.gift,
        "balance": receipt.sender_balance,
    })))
}
