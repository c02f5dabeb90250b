use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::moderation::{ModerationSettings, UserId};

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub store: StoreConfig,
    pub auth: AuthConfig,
    pub moderation: ModerationConfig,
}

const DEV_TOKEN_SECRET: &str = "estate-moderation-dev-secret";

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let kind = match env::var("STORE_KIND") {
            Ok(raw) => StoreKind::from_label(&raw).ok_or(ConfigError::InvalidStoreKind(raw))?,
            Err(_) => StoreKind::Sqlite,
        };
        let sqlite_path = PathBuf::from(
            env::var("STORE_SQLITE_PATH").unwrap_or_else(|_| "estate-moderation.db".to_string()),
        );
        let busy_timeout_ms = parse_number("STORE_BUSY_TIMEOUT_MS", 5_000)?;
        let read_attempts = parse_number("STORE_READ_RETRIES", 3)?;

        let token_secret = match env::var("AUTH_TOKEN_SECRET") {
            Ok(secret) if !secret.trim().is_empty() => secret,
            _ if environment == AppEnvironment::Production => {
                return Err(ConfigError::MissingTokenSecret)
            }
            _ => DEV_TOKEN_SECRET.to_string(),
        };
        let token_ttl_minutes = parse_number("AUTH_TOKEN_TTL_MINUTES", 60)?;

        let support_admin_id = env::var("SUPPORT_ADMIN_ID")
            .ok()
            .filter(|raw| !raw.trim().is_empty())
            .map(|raw| UserId::new(raw.trim()));
        let follow_up_retry_secs = parse_number("FOLLOW_UP_RETRY_SECS", 30)?;
        let follow_up_max_attempts = parse_number("FOLLOW_UP_MAX_ATTEMPTS", 5)?;

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            store: StoreConfig {
                kind,
                sqlite_path,
                busy_timeout_ms,
                read_attempts,
            },
            auth: AuthConfig {
                token_secret,
                token_ttl_minutes,
            },
            moderation: ModerationConfig {
                support_admin_id,
                follow_up_retry_secs,
                follow_up_max_attempts,
            },
        })
    }

    pub fn moderation_settings(&self) -> ModerationSettings {
        ModerationSettings {
            support_admin_id: self.moderation.support_admin_id.clone(),
            read_attempts: self.store.read_attempts,
            follow_up_max_attempts: self.moderation.follow_up_max_attempts,
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidNumber { key, value: raw }),
        Err(_) => Ok(default),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Sqlite,
}

impl StoreKind {
    pub fn from_label(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" | "in-memory" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

/// Backend selection and store-call deadlines.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub sqlite_path: PathBuf,
    pub busy_timeout_ms: u64,
    /// Attempts granted to idempotent reads.
    pub read_attempts: u32,
}

impl StoreConfig {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[derive(Clone)]
pub struct AuthConfig {
    pub token_secret: String,
    pub token_ttl_minutes: i64,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("token_secret", &"<redacted>")
            .field("token_ttl_minutes", &self.token_ttl_minutes)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct ModerationConfig {
    pub support_admin_id: Option<UserId>,
    pub follow_up_retry_secs: u64,
    pub follow_up_max_attempts: u32,
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidStoreKind(String),
    InvalidNumber { key: &'static str, value: String },
    MissingTokenSecret,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidStoreKind(value) => {
                write!(f, "STORE_KIND must be 'memory' or 'sqlite', got '{value}'")
            }
            ConfigError::InvalidNumber { key, value } => {
                write!(f, "{key} must be a non-negative number, got '{value}'")
            }
            ConfigError::MissingTokenSecret => {
                write!(f, "AUTH_TOKEN_SECRET is required in production")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
