use crate::{DbConn, DbError, DbPool};
use chrono::{DateTime, Utc};

pub const KIND_GIFT_SENT: &str = "gift_sent";
pub const KIND_GIFT_RECEIVED: &str = "gift_received";
pub const KIND_GRANT: &str = "grant";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GiftRow {
    pub id: i64,
    pub name: String,
    pub cost: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct GiftTransferRow {
    pub id: i64,
    pub gift_id: i64,
    pub sender_id: i64,
    pub recipient_id: i64,
    pub stream_id: Option<i64>,
    pub cost: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PointTransactionRow {
    pub id: i64,
    pub user_id: i64,
    pub amount: i64,
    pub kind: String,
    pub reference_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

pub async fn list_gifts(pool: &DbPool) -> Result<Vec<GiftRow>, DbError> {
    let rows = sqlx::query_as::<_, GiftRow>("SELECT id, name, cost FROM gifts ORDER BY cost, id")
        .fetch_all(pool)
        .await?;
    Ok(rows)
}

pub async fn get_gift(pool: &DbPool, id: i64) -> Result<Option<GiftRow>, DbError> {
    let row = sqlx::query_as::<_, GiftRow>("SELECT id, name, cost FROM gifts WHERE id = ?1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn balance(pool: &DbPool, user_id: i64) -> Result<Option<i64>, DbError> {
    let mut conn = pool.acquire().await?;
    crate::users::get_points_on(&mut conn, user_id).await
}

/// Debit `amount` only if the balance covers it. Returns the new balance, or
/// `None` when funds are insufficient (or the user does not exist).
pub async fn debit_on(conn: &mut DbConn, user_id: i64, amount: i64) -> Result<Option<i64>, DbError> {
    let balance: Option<i64> = sqlx::query_scalar(
        "UPDATE users SET points = points - ?2
         WHERE id = ?1 AND points >= ?2
         RETURNING points",
    )
    .bind(user_id)
    .bind(amount)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(balance)
}

pub async fn credit_on(conn: &mut DbConn, user_id: i64, amount: i64) -> Result<i64, DbError> {
    crate::users::adjust_points_on(conn, user_id, amount).await
}

pub async fn insert_transfer_on(
    conn: &mut DbConn,
    transfer: &GiftTransferRow,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO gift_transfers (id, gift_id, sender_id, recipient_id, stream_id, cost, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )
    .bind(transfer.id)
    .bind(transfer.gift_id)
    .bind(transfer.sender_id)
    .bind(transfer.recipient_id)
    .bind(transfer.stream_id)
    .bind(transfer.cost)
    .bind(transfer.created_at)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn record_on(
    conn: &mut DbConn,
    user_id: i64,
    amount: i64,
    kind: &str,
    reference_id: Option<i64>,
) -> Result<(), DbError> {
    sqlx::query(
        "INSERT INTO point_transactions (user_id, amount, kind, reference_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )
    .bind(user_id)
    .bind(amount)
    .bind(kind)
    .bind(reference_id)
    .bind(Utc::now())
    .execute(&mut *conn)
    .await?;
    Ok(())
}

/// Credit points from outside the gift flow (purchases, promotions) and
/// record the grant in the ledger.
pub async fn grant(pool: &DbPool, user_id: i64, amount: i64) -> Result<i64, DbError> {
    let mut tx = pool.begin().await?;
    let balance = credit_on(&mut tx, user_id, amount).await?;
    record_on(&mut tx, user_id, amount, KIND_GRANT, None).await?;
    tx.commit().await?;
    Ok(balance)
}

impl From<PointTransactionRow> for lumen_models::stream::PointTransaction {
    fn from(row: PointTransactionRow) -> Self {
        Self {
            id: row.id,
            amount: row.amount,
            kind: row.kind,
            reference_id: row.reference_id,
            created_at: row.created_at,
        }
    }
}

pub async fn list_transactions(
    pool: &DbPool,
    user_id: i64,
    limit: i64,
) -> Result<Vec<PointTransactionRow>, DbError> {
    let rows = sqlx::query_as::<_, PointTransactionRow>(
        "SELECT id, user_id, amount, kind, reference_id, created_at
         FROM point_transactions
         WHERE user_id = ?1
         ORDER BY id DESC
         LIMIT ?2",
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn debit_refuses_to_overdraw() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "a").await;
        grant(&pool, 1, 5).await.unwrap();

        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(debit_on(&mut conn, 1, 10).await.unwrap(), None);
        assert_eq!(debit_on(&mut conn, 1, 5).await.unwrap(), Some(0));
        assert_eq!(debit_on(&mut conn, 99, 1).await.unwrap(), None);
        drop(conn);

        assert_eq!(balance(&pool, 1).await.unwrap(), Some(0));
    }

    #[tokio::test]
    async fn rolled_back_transfer_leaves_no_trace() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "a").await;
        test_support::user(&pool, 2, "b").await;
        grant(&pool, 1, 50).await.unwrap();

        let mut tx = pool.begin().await.unwrap();
        debit_on(&mut tx, 1, 50).await.unwrap();
        credit_on(&mut tx, 2, 50).await.unwrap();
        record_on(&mut tx, 1, -50, KIND_GIFT_SENT, Some(7)).await.unwrap();
        tx.rollback().await.unwrap();

        assert_eq!(balance(&pool, 1).await.unwrap(), Some(50));
        assert_eq!(balance(&pool, 2).await.unwrap(), Some(0));
        let history = list_transactions(&pool, 1, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].kind, KIND_GRANT);
    }
}
