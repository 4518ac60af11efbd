//! In-memory sessions keyed by opaque ids, with bearer tokens pointing at them.
//!
//! Sessions expire after `ttl` of inactivity. Expiry is checked lazily on
//! lookup and eagerly by [`SessionStore::sweep_expired`], which the server
//! runs on a timer.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use lumen_models::user::UserSnapshot;

#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub user_id: i64,
    pub user: UserSnapshot,
    pub tokens: Vec<String>,
    pub created_at: Instant,
    pub last_access: Instant,
}

#[derive(Default)]
struct Inner {
    sessions: HashMap<String, Session>,
    tokens: HashMap<String, String>,
    by_user: HashMap<i64, HashSet<String>>,
}

impl Inner {
    fn remove_session(&mut self, session_id: &str) -> Option<Session> {
        let session = self.sessions.remove(session_id)?;
        for token in &session.tokens {
            self.tokens.remove(token);
        }
        if let Some(ids) = self.by_user.get_mut(&session.user_id) {
            ids.remove(session_id);
            if ids.is_empty() {
                self.by_user.remove(&session.user_id);
            }
        }
        Some(session)
    }
}

pub struct SessionStore {
    ttl: Duration,
    inner: Mutex<Inner>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(Inner::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Returns `(session_id, token)`.
    pub fn create_session(&self, user: UserSnapshot) -> (String, String) {
        self.create_session_at(user, Instant::now())
    }

    pub fn create_session_at(&self, user: UserSnapshot, now: Instant) -> (String, String) {
        let session_id = lumen_util::tokens::generate_secret();
        let token = lumen_util::tokens::generate_secret();
        let user_id = user.id;

        let mut inner = self.lock();
        inner.tokens.insert(token.clone(), session_id.clone());
        inner
            .by_user
            .entry(user_id)
            .or_default()
            .insert(session_id.clone());
        inner.sessions.insert(
            session_id.clone(),
            Session {
                session_id: session_id.clone(),
                user_id,
                user,
                tokens: vec![token.clone()],
                created_at: now,
                last_access: now,
            },
        );
        drop(inner);

        tracing::debug!(user_id, "session created");
        (session_id, token)
    }

    /// Resolve a bearer token to its user, refreshing the session's last
    /// access. Unknown or expired tokens yield `None`.
    pub fn get_session_by_token(&self, token: &str) -> Option<UserSnapshot> {
        self.get_session_by_token_at(token, Instant::now())
    }

    pub fn get_session_by_token_at(&self, token: &str, now: Instant) -> Option<UserSnapshot> {
        if !lumen_util::tokens::looks_like_secret(token) {
            return None;
        }
        let mut inner = self.lock();
        let session_id = inner.tokens.get(token)?.clone();

        let expired = match inner.sessions.get(&session_id) {
            Some(session) => now.saturating_duration_since(session.last_access) > self.ttl,
            None => {
                // Dangling token; clean it up.
                inner.tokens.remove(token);
                return None;
            }
        };
        if expired {
            if let Some(session) = inner.remove_session(&session_id) {
                tracing::debug!(user_id = session.user_id, "session expired on lookup");
            }
            return None;
        }

        let session = inner.sessions.get_mut(&session_id)?;
        session.last_access = now;
        Some(session.user.clone())
    }

    /// Full session record for a token, without touching last access.
    pub fn peek(&self, token: &str) -> Option<Session> {
        let inner = self.lock();
        let session_id = inner.tokens.get(token)?;
        inner.sessions.get(session_id).cloned()
    }

    /// Replace the cached snapshot on every session owned by the user.
    pub fn update_user(&self, user_id: i64, user: UserSnapshot) -> usize {
        let mut inner = self.lock();
        let ids: Vec<String> = match inner.by_user.get(&user_id) {
            Some(ids) => ids.iter().cloned().collect(),
            None => return 0,
        };
        let mut updated = 0;
        for id in ids {
            if let Some(session) = inner.sessions.get_mut(&id) {
                session.user = user.clone();
                updated += 1;
            }
        }
        updated
    }

    pub fn destroy_session(&self, session_id: &str) -> bool {
        self.lock().remove_session(session_id).is_some()
    }

    /// Logout: destroy whichever session the token belongs to.
    pub fn destroy_session_by_token(&self, token: &str) -> Option<i64> {
        let mut inner = self.lock();
        let session_id = inner.tokens.get(token)?.clone();
        inner.remove_session(&session_id).map(|s| s.user_id)
    }

    pub fn destroy_all_user_sessions(&self, user_id: i64) -> usize {
        let mut inner = self.lock();
        let ids: Vec<String> = inner
            .by_user
            .get(&user_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.iter()
            .filter(|id| inner.remove_session(id).is_some())
            .count()
    }

    pub fn sweep_expired(&self) -> usize {
        self.sweep_expired_at(Instant::now())
    }

    pub fn sweep_expired_at(&self, now: Instant) -> usize {
        let mut inner = self.lock();
        let expired: Vec<String> = inner
            .sessions
            .values()
            .filter(|s| now.saturating_duration_since(s.last_access) > self.ttl)
            .map(|s| s.session_id.clone())
            .collect();
        for id in &expired {
            inner.remove_session(id);
        }
        expired.len()
    }

    pub fn session_count(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn user_session_count(&self, user_id: i64) -> usize {
        self.lock().by_user.get(&user_id).map_or(0, HashSet::len)
    }
}
