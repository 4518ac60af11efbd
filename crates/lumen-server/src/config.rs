use anyhow::Result;
use lumen_core::AppConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub messaging: MessagingConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Stamped into every snowflake; distinct per process sharing a database.
    #[serde(default = "default_worker_id")]
    pub worker_id: u16,
    #[serde(default = "default_true")]
    pub registration_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            worker_id: default_worker_id(),
            registration_enabled: true,
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct SessionsConfig {
    #[serde(default = "default_session_ttl_days")]
    pub ttl_days: u64,
    #[serde(default = "default_cleanup_interval_minutes")]
    pub cleanup_interval_minutes: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_days: default_session_ttl_days(),
            cleanup_interval_minutes: default_cleanup_interval_minutes(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct PresenceConfig {
    #[serde(default = "default_presence_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_presence_sweep")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_presence_touch")]
    pub touch_interval_seconds: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_presence_timeout(),
            sweep_interval_seconds: default_presence_sweep(),
            touch_interval_seconds: default_presence_touch(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct MessagingConfig {
    #[serde(default = "default_request_cooldown_hours")]
    pub request_cooldown_hours: i64,
    #[serde(default = "default_max_message_len")]
    pub max_message_len: usize,
}

impl Default for MessagingConfig {
    fn default() -> Self {
        Self {
            request_cooldown_hours: default_request_cooldown_hours(),
            max_message_len: default_max_message_len(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_chat_messages_per_minute")]
    pub chat_messages_per_minute: u32,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            chat_messages_per_minute: default_chat_messages_per_minute(),
        }
    }
}

const MAX_SESSION_TTL_DAYS: u64 = 3650;
const MAX_INTERVAL_MINUTES: u64 = 7 * 24 * 60;
const MAX_PRESENCE_SECONDS: u64 = 7 * 24 * 60 * 60;
const MAX_REQUEST_COOLDOWN_HOURS: i64 = 10 * 365 * 24;

fn default_bind_address() -> String {
    "0.0.0.0:8080".into()
}
fn default_worker_id() -> u16 {
    1
}
fn default_true() -> bool {
    true
}
fn default_database_url() -> String {
    "sqlite://./data/lumen.db?mode=rwc".into()
}
fn default_max_connections() -> u32 {
    5
}
fn default_session_ttl_days() -> u64 {
    30
}
fn default_cleanup_interval_minutes() -> u64 {
    30
}
fn default_presence_timeout() -> u64 {
    300
}
fn default_presence_sweep() -> u64 {
    60
}
fn default_presence_touch() -> u64 {
    30
}
fn default_request_cooldown_hours() -> i64 {
    168 // 7 days
}
fn default_max_message_len() -> usize {
    2000
}
fn default_chat_messages_per_minute() -> u32 {
    30
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = if std::path::Path::new(path).exists() {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::info!(
                "Config file not found at '{}', generating defaults...",
                path
            );
            let config = Config::default();
            if let Some(parent) = std::path::Path::new(path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, toml::to_string_pretty(&config)?)?;
            tracing::info!("Generated default config at '{}'", path);
            config
        };

        if let Ok(value) = std::env::var("LUMEN_BIND_ADDRESS") {
            config.server.bind_address = value;
        }
        if let Ok(value) = std::env::var("LUMEN_DATABASE_URL") {
            config.database.url = value;
        }

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&self.sessions.ttl_days) {
            anyhow::bail!("sessions.ttl_days must be between 1 and {MAX_SESSION_TTL_DAYS}");
        }
        if self.sessions.cleanup_interval_minutes > MAX_INTERVAL_MINUTES {
            anyhow::bail!(
                "sessions.cleanup_interval_minutes must be at most {MAX_INTERVAL_MINUTES}"
            );
        }
        for (name, value) in [
            ("presence.timeout_seconds", self.presence.timeout_seconds),
            ("presence.sweep_interval_seconds", self.presence.sweep_interval_seconds),
            ("presence.touch_interval_seconds", self.presence.touch_interval_seconds),
        ] {
            if value > MAX_PRESENCE_SECONDS {
                anyhow::bail!("{name} must be at most {MAX_PRESENCE_SECONDS}");
            }
        }
        if !(0..=MAX_REQUEST_COOLDOWN_HOURS).contains(&self.messaging.request_cooldown_hours) {
            anyhow::bail!(
                "messaging.request_cooldown_hours must be between 0 and {MAX_REQUEST_COOLDOWN_HOURS}"
            );
        }
        if self.gateway.chat_messages_per_minute == 0 {
            anyhow::bail!("gateway.chat_messages_per_minute must be at least 1");
        }
        if self.database.max_connections == 0 {
            anyhow::bail!("database.max_connections must be at least 1");
        }
        Ok(())
    }

    pub fn app_config(&self) -> Result<AppConfig> {
        let ttl_secs = self
            .sessions
            .ttl_days
            .checked_mul(24 * 60 * 60)
            .ok_or_else(|| anyhow::anyhow!("sessions.ttl_days is out of range"))?;
        let cleanup_secs = self
            .sessions
            .cleanup_interval_minutes
            .max(1)
            .checked_mul(60)
            .ok_or_else(|| anyhow::anyhow!("sessions.cleanup_interval_minutes is out of range"))?;
        let request_cooldown = chrono::Duration::try_hours(self.messaging.request_cooldown_hours)
            .ok_or_else(|| anyhow::anyhow!("messaging.request_cooldown_hours is out of range"))?;

        Ok(AppConfig {
            worker_id: self.server.worker_id,
            session_ttl: Duration::from_secs(ttl_secs),
            session_cleanup_interval: Duration::from_secs(cleanup_secs),
            presence_timeout: Duration::from_secs(self.presence.timeout_seconds),
            presence_sweep_interval: Duration::from_secs(self.presence.sweep_interval_seconds.max(1)),
            presence_touch_interval: Duration::from_secs(self.presence.touch_interval_seconds),
            request_cooldown,
            max_message_len: self.messaging.max_message_len,
            chat_messages_per_minute: self.gateway.chat_messages_per_minute,
            registration_enabled: self.server.registration_enabled,
        })
    }
}
