use crate::{DbConn, DbError, DbPool};
use chrono::{DateTime, Utc};
use lumen_models::message::ConversationSummary;
use lumen_models::user::UserSnapshot;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationRow {
    pub id: i64,
    pub user_low: i64,
    pub user_high: i64,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub last_seq: i64,
    pub created_at: DateTime<Utc>,
}

impl ConversationRow {
    pub fn other_participant(&self, me: i64) -> i64 {
        if self.user_low == me {
            self.user_high
        } else {
            self.user_low
        }
    }
}

/// A conversation joined with the other participant and my unread count.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ConversationListRow {
    pub id: i64,
    pub other_id: i64,
    pub other_username: String,
    pub other_display_name: Option<String>,
    pub other_avatar_url: Option<String>,
    pub other_points: i64,
    pub last_message: Option<String>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub unread_count: i64,
}

impl From<ConversationListRow> for ConversationSummary {
    fn from(row: ConversationListRow) -> Self {
        ConversationSummary {
            id: row.id,
            other_user: UserSnapshot {
                id: row.other_id,
                username: row.other_username,
                display_name: row.other_display_name,
                avatar_url: row.other_avatar_url,
                points: row.other_points,
            },
            last_message: row.last_message,
            last_message_at: row.last_message_at,
            unread_count: row.unread_count,
        }
    }
}

/// Canonical storage order for an unordered pair.
pub fn ordered_pair(a: i64, b: i64) -> (i64, i64) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

const CONVERSATION_COLUMNS: &str =
    "id, user_low, user_high, last_message, last_message_at, last_seq, created_at";

pub async fn find_between(pool: &DbPool, a: i64, b: i64) -> Result<Option<ConversationRow>, DbError> {
    let mut conn = pool.acquire().await?;
    find_between_on(&mut conn, a, b).await
}

pub async fn find_between_on(
    conn: &mut DbConn,
    a: i64,
    b: i64,
) -> Result<Option<ConversationRow>, DbError> {
    let (low, high) = ordered_pair(a, b);
    let row = sqlx::query_as::<_, ConversationRow>(&format!(
        "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE user_low = ?1 AND user_high = ?2"
    ))
    .bind(low)
    .bind(high)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Return the conversation for the pair, creating it under `id` if absent.
pub async fn get_or_create_on(
    conn: &mut DbConn,
    id: i64,
    a: i64,
    b: i64,
) -> Result<ConversationRow, DbError> {
    let (low, high) = ordered_pair(a, b);
    sqlx::query(
        "INSERT INTO conversations (id, user_low, user_high, created_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (user_low, user_high) DO NOTHING",
    )
    .bind(id)
    .bind(low)
    .bind(high)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    find_between_on(conn, a, b).await?.ok_or(DbError::NotFound)
}

/// Reserve the next sequence number and record the latest message preview.
/// Must run inside the transaction that inserts the message.
pub async fn advance_on(
    conn: &mut DbConn,
    conversation_id: i64,
    last_message: &str,
    at: DateTime<Utc>,
) -> Result<i64, DbError> {
    let seq: Option<i64> = sqlx::query_scalar(
        "UPDATE conversations
         SET last_seq = last_seq + 1, last_message = ?2, last_message_at = ?3
         WHERE id = ?1
         RETURNING last_seq",
    )
    .bind(conversation_id)
    .bind(last_message)
    .bind(at)
    .fetch_optional(&mut *conn)
    .await?;
    seq.ok_or(DbError::NotFound)
}

/// Conversations involving `user_id`, most recently active first.
pub async fn list_for_user(pool: &DbPool, user_id: i64) -> Result<Vec<ConversationListRow>, DbError> {
    let rows = sqlx::query_as::<_, ConversationListRow>(
        "SELECT c.id,
                u.id AS other_id, u.username AS other_username,
                u.display_name AS other_display_name, u.avatar_url AS other_avatar_url,
                u.points AS other_points,
                c.last_message, c.last_message_at,
                (SELECT COUNT(*) FROM direct_messages m
                  WHERE m.conversation_id = c.id AND m.recipient_id = ?1 AND m.is_read = 0)
                    AS unread_count
         FROM conversations c
         INNER JOIN users u
                 ON u.id = CASE WHEN c.user_low = ?1 THEN c.user_high ELSE c.user_low END
         WHERE c.user_low = ?1 OR c.user_high = ?1
         ORDER BY COALESCE(c.last_message_at, c.created_at) DESC, c.id DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn one_conversation_per_unordered_pair() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "a").await;
        test_support::user(&pool, 2, "b").await;

        let mut tx = pool.begin().await.unwrap();
        let first = get_or_create_on(&mut tx, 100, 2, 1).await.unwrap();
        let second = get_or_create_on(&mut tx, 101, 1, 2).await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(first.id, 100);
        assert_eq!(second.id, 100);
        assert_eq!((first.user_low, first.user_high), (1, 2));
        assert_eq!(first.other_participant(1), 2);
    }

    #[tokio::test]
    async fn advance_is_monotonic() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "a").await;
        test_support::user(&pool, 2, "b").await;

        let mut conn = pool.acquire().await.unwrap();
        let convo = get_or_create_on(&mut conn, 100, 1, 2).await.unwrap();
        let now = Utc::now();
        assert_eq!(advance_on(&mut conn, convo.id, "one", now).await.unwrap(), 1);
        assert_eq!(advance_on(&mut conn, convo.id, "two", now).await.unwrap(), 2);
        drop(conn);

        let convo = find_between(&pool, 2, 1).await.unwrap().unwrap();
        assert_eq!(convo.last_seq, 2);
        assert_eq!(convo.last_message.as_deref(), Some("two"));

        let listed = list_for_user(&pool, 2).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].other_id, 1);
        assert_eq!(listed[0].unread_count, 0);
    }
}
