use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use lumen_models::user::UserSnapshot;

use crate::error::CoreError;
use crate::AppState;

const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 128;

/// A freshly minted session.
#[derive(Debug, Clone)]
pub struct LoginResult {
    pub session_id: String,
    pub token: String,
    pub user: UserSnapshot,
}

pub fn hash_password(password: &str) -> Result<String, CoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| CoreError::Internal(e.to_string()))
}

pub fn verify_password(password: &str, hash: &str) -> Result<bool, CoreError> {
    let parsed = PasswordHash::new(hash).map_err(|e| CoreError::Internal(e.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

pub fn validate_username(username: &str) -> Result<(), CoreError> {
    let len = username.chars().count();
    if !(3..=32).contains(&len)
        || !username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
    {
        return Err(CoreError::BadRequest(
            "Username must be 3-32 characters of letters, digits, '_' or '.'".into(),
        ));
    }
    Ok(())
}

fn validate_password(password: &str) -> Result<(), CoreError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(CoreError::BadRequest(format!(
            "Password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

fn open_session(state: &AppState, user: UserSnapshot) -> LoginResult {
    let (session_id, token) = state.sessions.create_session(user.clone());
    state.presence.touch(user.id);
    LoginResult {
        session_id,
        token,
        user,
    }
}

pub async fn register(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<LoginResult, CoreError> {
    if !state.config.registration_enabled {
        return Err(CoreError::Forbidden);
    }
    let username = username.trim();
    validate_username(username)?;
    validate_password(password)?;

    if lumen_db::users::get_user_by_username(&state.db, username)
        .await?
        .is_some()
    {
        return Err(CoreError::Conflict("Username is already taken".into()));
    }

    let password_hash = hash_password(password)?;
    let row = lumen_db::users::create_user(&state.db, state.next_id(), username, &password_hash)
        .await
        .map_err(|e| {
            if e.is_unique_violation() {
                CoreError::Conflict("Username is already taken".into())
            } else {
                CoreError::Database(e)
            }
        })?;
    tracing::info!(user_id = row.id, "user registered");
    Ok(open_session(state, row.snapshot()))
}

pub async fn login(
    state: &AppState,
    username: &str,
    password: &str,
) -> Result<LoginResult, CoreError> {
    let user = lumen_db::users::get_user_by_username(&state.db, username.trim())
        .await?
        .ok_or(CoreError::InvalidCredentials)?;
    if !verify_password(password, &user.password_hash)? {
        return Err(CoreError::InvalidCredentials);
    }
    tracing::debug!(user_id = user.id, "login succeeded");
    Ok(open_session(state, user.snapshot()))
}

/// Destroy the session behind `token`. The user goes offline once no
/// session remains.
pub async fn logout(state: &AppState, token: &str) -> Result<(), CoreError> {
    let Some(user_id) = state.sessions.destroy_session_by_token(token) else {
        return Ok(());
    };
    if state.sessions.user_session_count(user_id) == 0 {
        state.presence.mark_user_offline(user_id).await?;
    }
    Ok(())
}

pub async fn logout_all(state: &AppState, user_id: i64) -> Result<usize, CoreError> {
    let destroyed = state.sessions.destroy_all_user_sessions(user_id);
    state.presence.mark_user_offline(user_id).await?;
    tracing::info!(user_id, destroyed, "all sessions revoked");
    Ok(destroyed)
}
