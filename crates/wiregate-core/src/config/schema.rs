//! Configuration schema definitions.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main wiregate configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Gateway transport settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Encryption and key settings.
    #[serde(default)]
    pub security: SecurityConfig,

    /// HTTP session and WebSocket session binding.
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Gateway configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Bind mode.
    #[serde(default)]
    pub bind: BindMode,

    /// Port number.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable CORS.
    #[serde(default = "default_true")]
    pub cors: bool,

    /// Path of the HTTP endpoint (GET = API descriptor, POST = call).
    #[serde(default = "default_api_path")]
    pub api_path: String,

    /// Path of the WebSocket endpoint.
    #[serde(default = "default_ws_path")]
    pub ws_path: String,

    /// Maximum concurrent WebSocket connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Maximum accepted HTTP request body, in bytes.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: BindMode::default(),
            port: default_port(),
            cors: true,
            api_path: default_api_path(),
            ws_path: default_ws_path(),
            max_connections: default_max_connections(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_port() -> u16 {
    18790
}

fn default_true() -> bool {
    true
}

fn default_api_path() -> String {
    "/api".to_string()
}

fn default_ws_path() -> String {
    "/socket".to_string()
}

fn default_max_connections() -> usize {
    1000
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Bind mode for the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BindMode {
    /// Bind to loopback only (127.0.0.1).
    #[default]
    Loopback,

    /// Bind to all interfaces.
    Lan,

    /// Auto-detect.
    Auto,
}

/// Security configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Reject plain calls to methods that are marked as encrypted.
    #[serde(default)]
    pub encryption_required: bool,

    /// RSA modulus size for the encryption keypair. Fixed at process start.
    #[serde(default = "default_rsa_key_bits")]
    pub rsa_key_bits: usize,

    /// Optional PEM files with an externally managed encryption keypair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub public_key_file: Option<PathBuf>,

    /// Private half of the externally managed keypair (PKCS#8 PEM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_key_file: Option<PathBuf>,

    /// Send the failure's own message to clients instead of the generic one.
    #[serde(default)]
    pub expose_errors: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encryption_required: false,
            rsa_key_bits: default_rsa_key_bits(),
            public_key_file: None,
            private_key_file: None,
            expose_errors: false,
        }
    }
}

fn default_rsa_key_bits() -> usize {
    2048
}

/// Minimum RSA modulus accepted by validation.
pub const MIN_RSA_KEY_BITS: usize = 1024;

/// Session configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Cookie carrying the HTTP session id.
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Cookie carrying the numeric session token a socket can present.
    #[serde(default = "default_token_cookie")]
    pub token_cookie: String,

    /// Query parameter fallback for the session token.
    #[serde(default = "default_token_query")]
    pub token_query: String,

    /// Query parameter carrying the client's signing challenge.
    #[serde(default = "default_challenge_query")]
    pub challenge_query: String,

    /// HTTP session idle timeout in seconds.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// How often expired sessions are swept, in seconds.
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            token_cookie: default_token_cookie(),
            token_query: default_token_query(),
            challenge_query: default_challenge_query(),
            idle_timeout_secs: default_idle_timeout(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_cookie_name() -> String {
    "WGSESSION".to_string()
}

fn default_token_cookie() -> String {
    "X-Authorization".to_string()
}

fn default_token_query() -> String {
    "t".to_string()
}

fn default_challenge_query() -> String {
    "q".to_string()
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_sweep_interval() -> u64 {
    60
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default)]
    pub level: LogLevel,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

/// Log level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive string understood by `tracing_subscriber::EnvFilter`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}
