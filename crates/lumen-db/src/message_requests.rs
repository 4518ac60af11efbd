use crate::{DbConn, DbError, DbPool};
use chrono::{DateTime, Utc};
use lumen_models::message::{MessageRequest, MessageType, RequestStatus};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MessageRequestRow {
    pub id: i64,
    pub sender_id: i64,
    pub receiver_id: i64,
    pub initial_message: String,
    pub message_type: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl MessageRequestRow {
    pub fn status(&self) -> Option<RequestStatus> {
        RequestStatus::parse(&self.status)
    }

    pub fn message_type(&self) -> MessageType {
        MessageType::parse(&self.message_type).unwrap_or_default()
    }

    pub fn to_model(&self) -> MessageRequest {
        MessageRequest {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            initial_message: self.initial_message.clone(),
            message_type: self.message_type(),
            status: self.status().unwrap_or(RequestStatus::Pending),
            created_at: self.created_at,
            responded_at: self.responded_at,
        }
    }
}

const REQUEST_COLUMNS: &str = "id, sender_id, receiver_id, initial_message, message_type, \
     status, created_at, responded_at";

/// Insert a pending request. A second pending request for the same ordered
/// pair fails with a unique violation.
pub async fn create_request(
    pool: &DbPool,
    id: i64,
    sender_id: i64,
    receiver_id: i64,
    initial_message: &str,
    message_type: MessageType,
) -> Result<MessageRequestRow, DbError> {
    let row = sqlx::query_as::<_, MessageRequestRow>(&format!(
        "INSERT INTO message_requests
             (id, sender_id, receiver_id, initial_message, message_type, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6)
         RETURNING {REQUEST_COLUMNS}"
    ))
    .bind(id)
    .bind(sender_id)
    .bind(receiver_id)
    .bind(initial_message)
    .bind(message_type.as_str())
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_request(pool: &DbPool, id: i64) -> Result<Option<MessageRequestRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRequestRow>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM message_requests WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Most recent request from `sender_id` to `receiver_id`, whatever its status.
pub async fn latest_between(
    pool: &DbPool,
    sender_id: i64,
    receiver_id: i64,
) -> Result<Option<MessageRequestRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRequestRow>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM message_requests
         WHERE sender_id = ?1 AND receiver_id = ?2
         ORDER BY created_at DESC, id DESC
         LIMIT 1"
    ))
    .bind(sender_id)
    .bind(receiver_id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// True when a request between the pair, in either direction, was accepted.
pub async fn accepted_between(pool: &DbPool, a: i64, b: i64) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (
             SELECT 1 FROM message_requests
             WHERE status = 'accepted'
               AND ((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))
         )",
    )
    .bind(a)
    .bind(b)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

/// Move a pending request to `status`. Returns `None` when the request was
/// not pending any more, so two racing responders cannot both win.
pub async fn resolve_on(
    conn: &mut DbConn,
    id: i64,
    status: RequestStatus,
    responded_at: DateTime<Utc>,
) -> Result<Option<MessageRequestRow>, DbError> {
    let row = sqlx::query_as::<_, MessageRequestRow>(&format!(
        "UPDATE message_requests SET status = ?2, responded_at = ?3
         WHERE id = ?1 AND status = 'pending'
         RETURNING {REQUEST_COLUMNS}"
    ))
    .bind(id)
    .bind(status.as_str())
    .bind(responded_at)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Flip any pending request between the pair, in either direction, to blocked.
pub async fn block_pending_between_on(conn: &mut DbConn, a: i64, b: i64) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE message_requests SET status = 'blocked', responded_at = ?3
         WHERE status = 'pending'
           AND ((sender_id = ?1 AND receiver_id = ?2) OR (sender_id = ?2 AND receiver_id = ?1))",
    )
    .bind(a)
    .bind(b)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn list_incoming_pending(
    pool: &DbPool,
    receiver_id: i64,
) -> Result<Vec<MessageRequestRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRequestRow>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM message_requests
         WHERE receiver_id = ?1 AND status = 'pending'
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(receiver_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn list_outgoing(pool: &DbPool, sender_id: i64) -> Result<Vec<MessageRequestRow>, DbError> {
    let rows = sqlx::query_as::<_, MessageRequestRow>(&format!(
        "SELECT {REQUEST_COLUMNS} FROM message_requests
         WHERE sender_id = ?1
         ORDER BY created_at DESC, id DESC"
    ))
    .bind(sender_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
