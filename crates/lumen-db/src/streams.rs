use crate::{DbError, DbPool};
use chrono::{DateTime, Utc};
use lumen_models::stream::{ChatMessage, Stream};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct StreamRow {
    pub id: i64,
    pub owner_id: i64,
    pub title: String,
    pub is_live: bool,
    pub viewer_count: i64,
    pub created_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl From<StreamRow> for Stream {
    fn from(row: StreamRow) -> Self {
        Stream {
            id: row.id,
            owner_id: row.owner_id,
            title: row.title,
            is_live: row.is_live,
            viewer_count: row.viewer_count,
            created_at: row.created_at,
            ended_at: row.ended_at,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ChatMessageRow {
    pub id: i64,
    pub stream_id: i64,
    pub user_id: i64,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

impl From<ChatMessageRow> for ChatMessage {
    fn from(row: ChatMessageRow) -> Self {
        ChatMessage {
            id: row.id,
            stream_id: row.stream_id,
            user_id: row.user_id,
            text: row.text,
            created_at: row.created_at,
        }
    }
}

const STREAM_COLUMNS: &str = "id, owner_id, title, is_live, viewer_count, created_at, ended_at";

pub async fn create_stream(
    pool: &DbPool,
    id: i64,
    owner_id: i64,
    title: &str,
) -> Result<StreamRow, DbError> {
    let row = sqlx::query_as::<_, StreamRow>(&format!(
        "INSERT INTO streams (id, owner_id, title, is_live, viewer_count, created_at)
         VALUES (?1, ?2, ?3, 1, 0, ?4)
         RETURNING {STREAM_COLUMNS}"
    ))
    .bind(id)
    .bind(owner_id)
    .bind(title)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_stream(pool: &DbPool, id: i64) -> Result<Option<StreamRow>, DbError> {
    let row = sqlx::query_as::<_, StreamRow>(&format!(
        "SELECT {STREAM_COLUMNS} FROM streams WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Mark a live stream ended. Returns `None` if it was not live.
pub async fn end_stream(
    pool: &DbPool,
    id: i64,
    ended_at: DateTime<Utc>,
) -> Result<Option<StreamRow>, DbError> {
    let row = sqlx::query_as::<_, StreamRow>(&format!(
        "UPDATE streams SET is_live = 0, viewer_count = 0, ended_at = ?2
         WHERE id = ?1 AND is_live = 1
         RETURNING {STREAM_COLUMNS}"
    ))
    .bind(id)
    .bind(ended_at)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn set_viewer_count(pool: &DbPool, id: i64, count: i64) -> Result<(), DbError> {
    sqlx::query("UPDATE streams SET viewer_count = ?2 WHERE id = ?1")
        .bind(id)
        .bind(count.max(0))
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn create_chat_message(
    pool: &DbPool,
    id: i64,
    stream_id: i64,
    user_id: i64,
    text: &str,
) -> Result<ChatMessageRow, DbError> {
    let row = sqlx::query_as::<_, ChatMessageRow>(
        "INSERT INTO stream_chat_messages (id, stream_id, user_id, text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         RETURNING id, stream_id, user_id, text, created_at",
    )
    .bind(id)
    .bind(stream_id)
    .bind(user_id)
    .bind(text)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

/// Latest chat lines for a stream, oldest first.
pub async fn recent_chat_messages(
    pool: &DbPool,
    stream_id: i64,
    limit: i64,
) -> Result<Vec<ChatMessageRow>, DbError> {
    let mut rows = sqlx::query_as::<_, ChatMessageRow>(
        "SELECT id, stream_id, user_id, text, created_at FROM stream_chat_messages
         WHERE stream_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )
    .bind(stream_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    rows.reverse();
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn stream_lifecycle() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "host").await;

        let stream = create_stream(&pool, 42, 1, "hello").await.unwrap();
        assert!(stream.is_live);

        set_viewer_count(&pool, 42, 3).await.unwrap();
        set_viewer_count(&pool, 42, -1).await.unwrap();
        assert_eq!(get_stream(&pool, 42).await.unwrap().unwrap().viewer_count, 0);

        let ended = end_stream(&pool, 42, Utc::now()).await.unwrap().unwrap();
        assert!(!ended.is_live);
        assert!(ended.ended_at.is_some());
        assert!(end_stream(&pool, 42, Utc::now()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn chat_history_is_oldest_first() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "host").await;
        create_stream(&pool, 42, 1, "hello").await.unwrap();

        for (id, text) in [(1, "one"), (2, "two"), (3, "three")] {
            create_chat_message(&pool, id, 42, 1, text).await.unwrap();
        }
        let recent = recent_chat_messages(&pool, 42, 2).await.unwrap();
        let texts: Vec<_> = recent.iter().map(|m| m.text.as_str()).collect();
        assert_eq!(texts, vec!["two", "three"]);
    }
}
