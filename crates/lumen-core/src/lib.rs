pub mod auth;
pub mod connections;
pub mod direct_messages;
pub mod error;
pub mod ledger;
pub mod presence;
pub mod session_store;
pub mod streams;
pub mod user;

use lumen_db::DbPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

use connections::ConnectionRegistry;
use presence::PresenceTracker;
use session_store::SessionStore;

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Worker bits stamped into every snowflake this process mints.
    pub worker_id: u16,
    pub session_ttl: Duration,
    pub session_cleanup_interval: Duration,
    pub presence_timeout: Duration,
    pub presence_sweep_interval: Duration,
    /// Minimum spacing between two activity writes for the same user.
    pub presence_touch_interval: Duration,
    /// How long a rejected sender must wait before asking again.
    pub request_cooldown: chrono::Duration,
    pub max_message_len: usize,
    pub chat_messages_per_minute: u32,
    pub registration_enabled: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker_id: 1,
            session_ttl: Duration::from_secs(30 * 24 * 60 * 60),
            session_cleanup_interval: Duration::from_secs(30 * 60),
            presence_timeout: Duration::from_secs(5 * 60),
            presence_sweep_interval: Duration::from_secs(60),
            presence_touch_interval: Duration::from_secs(30),
            request_cooldown: chrono::Duration::days(7),
            max_message_len: 2000,
            chat_messages_per_minute: 30,
            registration_enabled: true,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub sessions: Arc<SessionStore>,
    /// Open sockets and their stream memberships.
    pub connections: Arc<ConnectionRegistry>,
    pub presence: Arc<PresenceTracker>,
    pub shutdown: Arc<Notify>,
}

impl AppState {
    pub fn new(db: DbPool, config: AppConfig) -> Self {
        let sessions = Arc::new(SessionStore::new(config.session_ttl));
        let presence = Arc::new(PresenceTracker::new(
            db.clone(),
            config.presence_timeout,
            config.presence_touch_interval,
        ));
        Self {
            db,
            sessions,
            connections: Arc::new(ConnectionRegistry::new()),
            presence,
            shutdown: Arc::new(Notify::new()),
            config,
        }
    }

    pub fn next_id(&self) -> i64 {
        lumen_util::snowflake::generate(self.config.worker_id)
    }
}
