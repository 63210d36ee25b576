use clap::{Args, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Clone, Debug, Default, Parser)]
#[command(version, about, long_about = None)]
pub struct Config {
    #[command(flatten)]
    pub server: ServerConfig,

    #[command(flatten)]
    pub storage: StorageConfig,

    #[command(flatten)]
    pub auth: AuthConfig,

    #[command(flatten)]
    pub chat: ChatConfig,

    #[command(flatten)]
    pub websocket: WsConfig,

    #[command(flatten)]
    pub telemetry: TelemetryConfig,
}

#[derive(Clone, Debug, Args)]
pub struct ServerConfig {
    /// Host to listen on
    #[arg(long, env = "HUDDLE_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "HUDDLE_PORT", default_value_t = 5000)]
    pub port: u16,

    /// Port for the management server (health probes)
    #[arg(long, env = "HUDDLE_MGMT_PORT", default_value_t = 9090)]
    pub mgmt_port: u16,

    /// Directory holding the frontend bundle
    #[arg(long, env = "HUDDLE_STATIC_DIR", default_value = "public")]
    pub static_dir: PathBuf,

    /// Serve index.html for unmatched GET paths (single-page-app support)
    #[arg(long, env = "HUDDLE_SPA_FALLBACK", default_value_t = true, action = clap::ArgAction::Set)]
    pub spa_fallback: bool,

    /// How long to wait for sessions to drain on shutdown
    #[arg(long, env = "HUDDLE_SHUTDOWN_TIMEOUT_SECS", default_value_t = 5)]
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Clone, Debug, Args)]
pub struct StorageConfig {
    /// Which persistence backend to use
    #[arg(long = "storage", env = "HUDDLE_STORAGE", value_enum, default_value_t = StorageBackend::Postgres)]
    pub backend: StorageBackend,

    /// Database connection URL
    #[arg(long, env = "HUDDLE_DATABASE_URL", default_value = "postgres://localhost:5432/chatdb")]
    pub database_url: String,

    /// Maximum number of pooled connections
    #[arg(long, env = "HUDDLE_DB_MAX_CONNECTIONS", default_value_t = 20)]
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection
    #[arg(long, env = "HUDDLE_DB_ACQUIRE_TIMEOUT_SECS", default_value_t = 5)]
    pub acquire_timeout_secs: u64,

    /// Connection attempts before giving up at start-up
    #[arg(long, env = "HUDDLE_DB_CONNECT_ATTEMPTS", default_value_t = 5)]
    pub connect_attempts: usize,

    /// Timeout for the readiness probe's store ping in milliseconds
    #[arg(long, env = "HUDDLE_HEALTH_TIMEOUT_MS", default_value_t = 2000)]
    pub health_timeout_ms: u64,
}

#[derive(Clone, Debug, Args)]
pub struct AuthConfig {
    /// Secret for signing chat tokens; a random one is generated when unset
    #[arg(long, env = "HUDDLE_JWT_SECRET")]
    pub jwt_secret: Option<String>,

    /// Chat token time-to-live in seconds
    #[arg(long, env = "HUDDLE_TOKEN_TTL_SECS", default_value_t = 86_400)]
    pub token_ttl_secs: u64,

    /// Maximum username length in characters
    #[arg(long, env = "HUDDLE_MAX_USERNAME_LEN", default_value_t = 64)]
    pub max_username_len: usize,
}

#[derive(Clone, Debug, Args)]
pub struct ChatConfig {
    /// Number of recent messages replayed to a new connection
    #[arg(long, env = "HUDDLE_HISTORY_LIMIT", default_value_t = 50, value_parser = clap::value_parser!(u32).range(1..))]
    pub history_limit: u32,

    /// Maximum message length in characters
    #[arg(long, env = "HUDDLE_MAX_MESSAGE_LEN", default_value_t = 2000)]
    pub max_message_len: usize,

    /// Reject chat connections that do not present a login token
    #[arg(long, env = "HUDDLE_CHAT_REQUIRE_TOKEN", default_value_t = false, action = clap::ArgAction::Set)]
    pub require_token: bool,
}

#[derive(Clone, Debug, Args)]
pub struct WsConfig {
    /// Size of the per-connection outbound buffer
    #[arg(long, env = "HUDDLE_WS_OUTBOUND_BUFFER_SIZE", default_value_t = 64)]
    pub outbound_buffer_size: usize,

    /// Interval between server pings in seconds
    #[arg(long, env = "HUDDLE_WS_PING_INTERVAL_SECS", default_value_t = 25)]
    pub ping_interval_secs: u64,

    /// Grace period after a ping before an idle connection is closed
    #[arg(long, env = "HUDDLE_WS_PING_TIMEOUT_SECS", default_value_t = 20)]
    pub ping_timeout_secs: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Clone, Debug, Args)]
pub struct TelemetryConfig {
    /// Log output format
    #[arg(long, env = "HUDDLE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// OTLP collector endpoint; traces and metrics are exported when set
    #[arg(long, env = "HUDDLE_OTLP_ENDPOINT")]
    pub otlp_endpoint: Option<String>,
}

impl Config {
    #[must_use]
    pub fn load() -> Self {
        Self::parse()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5000,
            mgmt_port: 9090,
            static_dir: PathBuf::from("public"),
            spa_fallback: true,
            shutdown_timeout_secs: 5,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Postgres,
            database_url: "postgres://localhost:5432/chatdb".to_string(),
            max_connections: 20,
            acquire_timeout_secs: 5,
            connect_attempts: 5,
            health_timeout_ms: 2000,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { jwt_secret: None, token_ttl_secs: 86_400, max_username_len: 64 }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self { history_limit: 50, max_message_len: 2000, require_token: false }
    }
}

impl Default for WsConfig {
    fn default() -> Self {
        Self { outbound_buffer_size: 64, ping_interval_secs: 25, ping_timeout_secs: 20 }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { log_format: LogFormat::Text, otlp_endpoint: None }
    }
}
