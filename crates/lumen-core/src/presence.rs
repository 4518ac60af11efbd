use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use lumen_db::DbPool;

use crate::error::CoreError;

/// Tracks user activity in the `users` table.
///
/// Request handlers call [`PresenceTracker::touch`], which never blocks the
/// request: the write runs on a spawned task and is throttled per user. A
/// periodic [`PresenceTracker::sweep`] flips idle users offline.
pub struct PresenceTracker {
    db: DbPool,
    timeout: Duration,
    touch_interval: Duration,
    last_touch: DashMap<i64, Instant>,
}

impl PresenceTracker {
    pub fn new(db: DbPool, timeout: Duration, touch_interval: Duration) -> Self {
        Self {
            db,
            timeout,
            touch_interval,
            last_touch: DashMap::new(),
        }
    }

    /// Claim the write slot for this user. False while throttled.
    fn claim(&self, user_id: i64, now: Instant) -> bool {
        match self.last_touch.entry(user_id) {
            Entry::Occupied(mut last) => {
                if now.saturating_duration_since(*last.get()) < self.touch_interval {
                    return false;
                }
                last.insert(now);
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(now);
                true
            }
        }
    }

    /// Record activity without waiting for the write. Returns whether a
    /// write was scheduled.
    pub fn touch(&self, user_id: i64) -> bool {
        if !self.claim(user_id, Instant::now()) {
            return false;
        }
        let db = self.db.clone();
        tokio::spawn(async move {
            if let Err(e) = lumen_db::users::touch_activity(&db, user_id, Utc::now()).await {
                tracing::warn!(user_id, "presence update failed: {e}");
            }
        });
        true
    }

    /// Awaited variant of [`touch`](Self::touch) that ignores the throttle.
    #[cfg(test)]
    pub(crate) async fn touch_now(&self, user_id: i64) -> Result<(), CoreError> {
        self.last_touch.insert(user_id, Instant::now());
        lumen_db::users::touch_activity(&self.db, user_id, Utc::now()).await?;
        Ok(())
    }

    pub async fn mark_user_offline(&self, user_id: i64) -> Result<(), CoreError> {
        self.last_touch.remove(&user_id);
        lumen_db::users::mark_offline(&self.db, user_id, Utc::now()).await?;
        tracing::debug!(user_id, "user marked offline");
        Ok(())
    }

    /// Flip every user idle for longer than the timeout to offline.
    pub async fn sweep(&self) -> Result<u64, CoreError> {
        let timeout = chrono::Duration::from_std(self.timeout)
            .map_err(|e| CoreError::Internal(e.to_string()))?;
        let demoted = lumen_db::users::mark_stale_offline(&self.db, Utc::now() - timeout).await?;

        // Forget throttle entries old enough that the user may have been
        // demoted, so their next request is written straight away.
        let timeout = self.timeout;
        self.last_touch
            .retain(|_, touched| touched.elapsed() < timeout);

        if demoted > 0 {
            tracing::info!(demoted, "presence sweep marked users offline");
        }
        Ok(demoted)
    }
}
