use crate::{DbConn, DbError, DbPool};
use chrono::{DateTime, Utc};
use lumen_models::message::{DirectMessage, MessageType};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct DirectMessageRow {
    pub id: i64,
    pub conversation_id: i64,
    pub seq: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub content: String,
    pub message_type: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

impl From<DirectMessageRow> for DirectMessage {
    fn from(row: DirectMessageRow) -> Self {
        DirectMessage {
            id: row.id,
            conversation_id: row.conversation_id,
            seq: row.seq,
            sender_id: row.sender_id,
            recipient_id: row.recipient_id,
            content: row.content,
            message_type: MessageType::parse(&row.message_type).unwrap_or_default(),
            is_read: row.is_read,
            created_at: row.created_at,
        }
    }
}

pub struct NewDirectMessage<'a> {
    pub id: i64,
    pub conversation_id: i64,
    pub seq: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub content: &'a str,
    pub message_type: MessageType,
    pub created_at: DateTime<Utc>,
}

const MESSAGE_COLUMNS: &str = "id, conversation_id, seq, sender_id, recipient_id, content, \
     message_type, is_read, created_at";

pub async fn insert_on(
    conn: &mut DbConn,
    msg: &NewDirectMessage<'_>,
) -> Result<DirectMessageRow, DbError> {
    let row = sqlx::query_as::<_, DirectMessageRow>(&format!(
        "INSERT INTO direct_messages
             (id, conversation_id, seq, sender_id, recipient_id, content, message_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         RETURNING {MESSAGE_COLUMNS}"
    ))
    .bind(msg.id)
    .bind(msg.conversation_id)
    .bind(msg.seq)
    .bind(msg.sender_id)
    .bind(msg.recipient_id)
    .bind(msg.content)
    .bind(msg.message_type.as_str())
    .bind(msg.created_at)
    .fetch_one(&mut *conn)
    .await?;
    Ok(row)
}

/// Page of a conversation ordered by `seq` ascending. `before_seq` pages
/// backwards from the newest message.
pub async fn get_page(
    pool: &DbPool,
    conversation_id: i64,
    before_seq: Option<i64>,
    limit: i64,
) -> Result<Vec<DirectMessageRow>, DbError> {
    let mut rows = sqlx::query_as::<_, DirectMessageRow>(&format!(
        "SELECT {MESSAGE_COLUMNS} FROM direct_messages
         WHERE conversation_id = ?1 AND (?2 IS NULL OR seq < ?2)
         ORDER BY seq DESC
         LIMIT ?3"
    ))
    .bind(conversation_id)
    .bind(before_seq)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.reverse();
    Ok(rows)
}

/// Flip every unread message from `sender_id` to `recipient_id`.
/// Returns the number of rows that changed, so repeating is a no-op.
pub async fn mark_read(pool: &DbPool, recipient_id: i64, sender_id: i64) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE direct_messages SET is_read = 1
         WHERE recipient_id = ?1 AND sender_id = ?2 AND is_read = 0",
    )
    .bind(recipient_id)
    .bind(sender_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{conversations, test_support};

    async fn seed(pool: &DbPool, count: i64) -> i64 {
        test_support::user(pool, 1, "a").await;
        test_support::user(pool, 2, "b").await;
        let mut tx = pool.begin().await.unwrap();
        let convo = conversations::get_or_create_on(&mut tx, 100, 1, 2).await.unwrap();
        for i in 0..count {
            let now = Utc::now();
            let seq = conversations::advance_on(&mut tx, convo.id, "hi", now)
                .await
                .unwrap();
            insert_on(
                &mut tx,
                &NewDirectMessage {
                    id: 1000 + i,
                    conversation_id: convo.id,
                    seq,
                    sender_id: 1,
                    recipient_id: 2,
                    content: "hi",
                    message_type: MessageType::Text,
                    created_at: now,
                },
            )
            .await
            .unwrap();
        }
        tx.commit().await.unwrap();
        convo.id
    }

    #[tokio::test]
    async fn pages_backwards_in_seq_order() {
        let pool = test_support::pool().await;
        let convo = seed(&pool, 5).await;

        let latest = get_page(&pool, convo, None, 2).await.unwrap();
        assert_eq!(latest.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![4, 5]);

        let older = get_page(&pool, convo, Some(4), 10).await.unwrap();
        assert_eq!(older.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn mark_read_is_idempotent() {
        let pool = test_support::pool().await;
        seed(&pool, 3).await;

        assert_eq!(mark_read(&pool, 2, 1).await.unwrap(), 3);
        assert_eq!(mark_read(&pool, 2, 1).await.unwrap(), 0);
        // Nothing travels the other way.
        assert_eq!(mark_read(&pool, 1, 2).await.unwrap(), 0);
    }
}
