use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Stream {
    #[serde(with = "crate::id")]
    pub id: i64,
    #[serde(with = "crate::id")]
    pub owner_id: i64,
    pub title: String,
    pub is_live: bool,
    pub viewer_count: i64,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(with = "crate::id")]
    pub id: i64,
    #[serde(with = "crate::id")]
    pub stream_id: i64,
    #[serde(with = "crate::id")]
    pub user_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// A completed gift transfer as announced to a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GiftEvent {
    #[serde(with = "crate::id")]
    pub transfer_id: i64,
    #[serde(with = "crate::id")]
    pub gift_id: i64,
    pub name: String,
    pub cost: i64,
    #[serde(with = "crate::id")]
    pub recipient_id: i64,
    #[serde(default, with = "crate::id::option")]
    pub stream_id: Option<i64>,
}

/// One signed entry in a user's point ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointTransaction {
    #[serde(with = "crate::id")]
    pub id: i64,
    pub amount: i64,
    pub kind: String,
    #[serde(default, with = "crate::id::option")]
    pub reference_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}
