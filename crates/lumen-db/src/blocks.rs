use crate::{DbConn, DbError, DbPool};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BlockRow {
    pub blocker_id: i64,
    pub blocked_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Insert a directed block. Blocking twice is a no-op.
pub async fn create_block_on(
    conn: &mut DbConn,
    blocker_id: i64,
    blocked_id: i64,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO blocks (blocker_id, blocked_id, created_at) VALUES (?1, ?2, ?3)
         ON CONFLICT (blocker_id, blocked_id) DO NOTHING",
    )
    .bind(blocker_id)
    .bind(blocked_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Returns true when a block was actually removed.
pub async fn delete_block(pool: &DbPool, blocker_id: i64, blocked_id: i64) -> Result<bool, DbError> {
    let result = sqlx::query("DELETE FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2")
        .bind(blocker_id)
        .bind(blocked_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Directional: has `blocker_id` blocked `blocked_id`?
pub async fn is_blocked(pool: &DbPool, blocker_id: i64, blocked_id: i64) -> Result<bool, DbError> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM blocks WHERE blocker_id = ?1 AND blocked_id = ?2)",
    )
    .bind(blocker_id)
    .bind(blocked_id)
    .fetch_one(pool)
    .await?;
    Ok(exists)
}

pub async fn list_blocked(pool: &DbPool, blocker_id: i64) -> Result<Vec<BlockRow>, DbError> {
    let rows = sqlx::query_as::<_, BlockRow>(
        "SELECT blocker_id, blocked_id, created_at FROM blocks
         WHERE blocker_id = ?1
         ORDER BY created_at",
    )
    .bind(blocker_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
