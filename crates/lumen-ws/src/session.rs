use std::num::NonZeroU32;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use lumen_core::connections::ConnectionId;
use lumen_models::user::UserSnapshot;

/// Per-socket state owned by the socket task.
pub struct Session {
    pub connection_id: ConnectionId,
    /// Set when the socket connected with a session token.
    pub user: Option<UserSnapshot>,
    chat_limiter: DefaultDirectRateLimiter,
}

impl Session {
    pub fn new(connection_id: ConnectionId, user: Option<UserSnapshot>, chat_per_minute: u32) -> Self {
        let per_minute = NonZeroU32::new(chat_per_minute).unwrap_or(NonZeroU32::MIN);
        Self {
            connection_id,
            user,
            chat_limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        self.user.as_ref().map(|u| u.id)
    }

    /// Consume one chat slot. False when the socket is over its quota.
    pub fn allow_chat(&self) -> bool {
        self.chat_limiter.check().is_ok()
    }
}
