//! Application settings and configuration structures.

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Redis configuration
    pub redis: RedisSettings,

    /// JWT validation settings
    pub jwt: JwtSettings,

    /// WebSocket gateway configuration
    pub websocket: WebSocketSettings,

    /// SIP / telephony configuration
    pub sip: SipSettings,

    /// Call signaling configuration
    pub call: CallSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,
}

/// JWT validation configuration.
///
/// Token issuance lives in the platform API; this service only validates.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Shared secret the platform API signs tokens with
    pub secret: String,
}

/// WebSocket gateway configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Heartbeat interval in milliseconds (default: 45000)
    pub heartbeat_interval_ms: u64,

    /// Connection timeout for identify in seconds (default: 30)
    pub identify_timeout_secs: u64,
}

/// SIP / telephony configuration handed to clients alongside credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct SipSettings {
    /// PBX WebSocket URI the SIP user agent registers over
    pub pbx_websocket_uri: String,

    /// SIP domain the address-of-record lives under
    pub domain: String,

    /// Public STUN server used for ICE negotiation
    pub stun_server: String,

    /// Maximum simultaneous registrations per address-of-record
    pub max_contacts: i32,
}

/// Call signaling configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CallSettings {
    /// Bound on how long a call may sit in negotiation before it is failed
    pub negotiation_timeout_secs: u64,
}

/// Minimum required length for the JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if the JWT secret is too short.
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        Config::builder()
            .set_default("environment", environment.clone())?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 3000)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("websocket.heartbeat_interval_ms", 45000_i64)?
            .set_default("websocket.identify_timeout_secs", 30_i64)?
            .set_default("sip.pbx_websocket_uri", "wss://localhost:8089/ws")?
            .set_default("sip.domain", "localhost")?
            .set_default("sip.stun_server", "stun:stun.l.google.com:19302")?
            .set_default("sip.max_contacts", 5_i64)?
            .set_default("call.negotiation_timeout_secs", 60_i64)?
            // Load from config files
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // Load from environment variables
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            // Map simple environment variables
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .build()?
            .try_deserialize()
            .and_then(|settings: Self| {
                if settings.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
                    return Err(ConfigError::Message(format!(
                        "JWT secret must be at least {} characters. Current length: {}",
                        MIN_JWT_SECRET_LENGTH,
                        settings.jwt.secret.len()
                    )));
                }
                Ok(settings)
            })
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
