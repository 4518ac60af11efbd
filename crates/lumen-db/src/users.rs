use crate::{DbConn, DbError, DbPool};
use chrono::{DateTime, Utc};
use lumen_models::user::UserSnapshot;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub points: i64,
    pub is_online: bool,
    pub last_activity: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserRow {
    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            id: self.id,
            username: self.username.clone(),
            display_name: self.display_name.clone(),
            avatar_url: self.avatar_url.clone(),
            points: self.points,
        }
    }
}

const USER_COLUMNS: &str = "id, username, password_hash, display_name, avatar_url, points, \
     is_online, last_activity, last_seen, created_at";

pub async fn create_user(
    pool: &DbPool,
    id: i64,
    username: &str,
    password_hash: &str,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "INSERT INTO users (id, username, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4)
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(username)
    .bind(password_hash)
    .bind(Utc::now())
    .fetch_one(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_id(pool: &DbPool, id: i64) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE id = ?1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

pub async fn get_user_by_username(
    pool: &DbPool,
    username: &str,
) -> Result<Option<UserRow>, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = ?1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Update profile fields; `None` leaves a column untouched.
pub async fn update_profile(
    pool: &DbPool,
    id: i64,
    display_name: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<UserRow, DbError> {
    let row = sqlx::query_as::<_, UserRow>(&format!(
        "UPDATE users
         SET display_name = COALESCE(?2, display_name),
             avatar_url = COALESCE(?3, avatar_url)
         WHERE id = ?1
         RETURNING {USER_COLUMNS}"
    ))
    .bind(id)
    .bind(display_name)
    .bind(avatar_url)
    .fetch_optional(pool)
    .await?;
    row.ok_or(DbError::NotFound)
}

pub async fn get_points_on(conn: &mut DbConn, id: i64) -> Result<Option<i64>, DbError> {
    let points: Option<i64> = sqlx::query_scalar("SELECT points FROM users WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(points)
}

/// Add `amount` points; a negative amount is rejected by the CHECK
/// constraint if it would take the balance below zero.
pub async fn adjust_points_on(conn: &mut DbConn, id: i64, amount: i64) -> Result<i64, DbError> {
    let balance: Option<i64> =
        sqlx::query_scalar("UPDATE users SET points = points + ?2 WHERE id = ?1 RETURNING points")
            .bind(id)
            .bind(amount)
            .fetch_optional(&mut *conn)
            .await?;
    balance.ok_or(DbError::NotFound)
}

// ---------------------------------------------------------------------------
// Presence columns
// ---------------------------------------------------------------------------

pub async fn touch_activity(pool: &DbPool, id: i64, now: DateTime<Utc>) -> Result<(), DbError> {
    sqlx::query(
        "UPDATE users SET is_online = 1, last_activity = ?2, last_seen = ?2 WHERE id = ?1",
    )
    .bind(id)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

pub async fn mark_offline(pool: &DbPool, id: i64, now: DateTime<Utc>) -> Result<(), DbError> {
    sqlx::query("UPDATE users SET is_online = 0, last_seen = ?2 WHERE id = ?1")
        .bind(id)
        .bind(now)
        .execute(pool)
        .await?;
    Ok(())
}

/// Flip every online user whose last activity predates `cutoff` to offline.
/// Returns the number of users demoted.
pub async fn mark_stale_offline(pool: &DbPool, cutoff: DateTime<Utc>) -> Result<u64, DbError> {
    let result = sqlx::query(
        "UPDATE users SET is_online = 0
         WHERE is_online = 1 AND (last_activity IS NULL OR last_activity < ?1)",
    )
    .bind(cutoff)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support;

    #[tokio::test]
    async fn profile_update_keeps_untouched_columns() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "alice").await;

        let updated = update_profile(&pool, 1, Some("Alice"), None).await.unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Alice"));
        assert_eq!(updated.avatar_url, None);

        let updated = update_profile(&pool, 1, None, Some("https://cdn/a.png"))
            .await
            .unwrap();
        assert_eq!(updated.display_name.as_deref(), Some("Alice"));
        assert_eq!(updated.avatar_url.as_deref(), Some("https://cdn/a.png"));

        assert!(matches!(
            update_profile(&pool, 99, Some("x"), None).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn username_lookup_is_case_insensitive() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "Alice").await;
        let found = get_user_by_username(&pool, "alice").await.unwrap();
        assert_eq!(found.map(|u| u.id), Some(1));
    }

    #[tokio::test]
    async fn points_cannot_go_negative() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "alice").await;
        let mut conn = pool.acquire().await.unwrap();
        assert_eq!(adjust_points_on(&mut conn, 1, 10).await.unwrap(), 10);

        let err = adjust_points_on(&mut conn, 1, -11).await.unwrap_err();
        assert!(matches!(err, DbError::Sqlx(sqlx::Error::Database(_))));
        assert_eq!(adjust_points_on(&mut conn, 1, -10).await.unwrap(), 0);
        assert!(matches!(
            adjust_points_on(&mut conn, 99, 1).await,
            Err(DbError::NotFound)
        ));
    }

    #[tokio::test]
    async fn stale_sweep_only_demotes_idle_users() {
        let pool = test_support::pool().await;
        test_support::user(&pool, 1, "idle").await;
        test_support::user(&pool, 2, "busy").await;

        let now = Utc::now();
        touch_activity(&pool, 1, now - chrono::Duration::minutes(10))
            .await
            .unwrap();
        touch_activity(&pool, 2, now).await.unwrap();

        let demoted = mark_stale_offline(&pool, now - chrono::Duration::minutes(5))
            .await
            .unwrap();
        assert_eq!(demoted, 1);

        let idle = get_user_by_id(&pool, 1).await.unwrap().unwrap();
        let busy = get_user_by_id(&pool, 2).await.unwrap().unwrap();
        assert!(!idle.is_online);
        assert!(busy.is_online);
    }
}
