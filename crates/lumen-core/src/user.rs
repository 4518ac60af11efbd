use lumen_models::user::UserSnapshot;

use crate::error::CoreError;
use crate::AppState;

const MAX_DISPLAY_NAME_LEN: usize = 64;
const MAX_AVATAR_URL_LEN: usize = 512;

pub async fn get_profile(state: &AppState, user_id: i64) -> Result<UserSnapshot, CoreError> {
    lumen_db::users::get_user_by_id(&state.db, user_id)
        .await?
        .map(|u| u.snapshot())
        .ok_or(CoreError::NotFound)
}

/// Update profile fields and refresh the snapshot cached on every session
/// the user holds.
pub async fn update_profile(
    state: &AppState,
    user_id: i64,
    display_name: Option<&str>,
    avatar_url: Option<&str>,
) -> Result<UserSnapshot, CoreError> {
    let display_name = display_name.map(str::trim);
    if let Some(name) = display_name {
        if name.is_empty() || name.chars().count() > MAX_DISPLAY_NAME_LEN {
            return Err(CoreError::BadRequest(format!(
                "Display name must be between 1 and {MAX_DISPLAY_NAME_LEN} characters"
            )));
        }
    }
    if let Some(url) = avatar_url {
        if url.len() > MAX_AVATAR_URL_LEN
            || !(url.starts_with("https://") || url.starts_with("http://"))
        {
            return Err(CoreError::BadRequest("Avatar must be an http(s) URL".into()));
        }
    }

    let row =
        lumen_db::users::update_profile(&state.db, user_id, display_name, avatar_url).await?;
    let snapshot = row.snapshot();
    state.sessions.update_user(user_id, snapshot.clone());
    Ok(snapshot)
}
