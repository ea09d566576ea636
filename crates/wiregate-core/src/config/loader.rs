//! Configuration loading and persistence.

use super::{Config, MIN_RSA_KEY_BITS};
use crate::env;
use crate::error::ConfigError;
use crate::paths;
use std::fs;
use std::path::Path;

impl Config {
    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = paths::config_file()?;
        Self::load(&path)
    }

    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from a string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        json5::from_str(content).map_err(|e| ConfigError::Json5(e.to_string()))
    }

    /// Save configuration to the default path.
    pub fn save_default(&self) -> Result<(), ConfigError> {
        let path = paths::config_file()?;
        self.save(&path)
    }

    /// Save configuration to a file path.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = self.to_json5()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        // Write atomically
        let temp_path = path.with_extension("tmp");
        fs::write(&temp_path, &content)?;
        fs::rename(&temp_path, path)?;

        Ok(())
    }

    /// Serialize to JSON5 string.
    pub fn to_json5(&self) -> Result<String, ConfigError> {
        // json5 has no serializer; plain JSON is valid JSON5
        serde_json::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration, collecting all errors before returning.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();

        if self.gateway.port == 0 {
            errors.push("Gateway port cannot be 0".to_string());
        }

        for (name, path) in [
            ("api_path", &self.gateway.api_path),
            ("ws_path", &self.gateway.ws_path),
        ] {
            if !path.starts_with('/') {
                errors.push(format!("Gateway {} must start with '/', got '{}'", name, path));
            }
        }
        if self.gateway.api_path == self.gateway.ws_path {
            errors.push("Gateway api_path and ws_path must differ".to_string());
        }

        if self.gateway.max_connections == 0 {
            errors.push("Gateway max_connections must be greater than 0".to_string());
        }

        if self.security.rsa_key_bits < MIN_RSA_KEY_BITS {
            errors.push(format!(
                "RSA key size {} is below the minimum of {}",
                self.security.rsa_key_bits, MIN_RSA_KEY_BITS
            ));
        }
        if self.security.rsa_key_bits % 8 != 0 {
            errors.push(format!(
                "RSA key size {} must be a multiple of 8",
                self.security.rsa_key_bits
            ));
        }

        // Externally managed keys come in pairs
        match (&self.security.public_key_file, &self.security.private_key_file) {
            (Some(_), None) => errors.push("public_key_file is set but private_key_file is not".to_string()),
            (None, Some(_)) => errors.push("private_key_file is set but public_key_file is not".to_string()),
            _ => {}
        }

        for (name, value) in [
            ("cookie_name", &self.session.cookie_name),
            ("token_cookie", &self.session.token_cookie),
            ("token_query", &self.session.token_query),
            ("challenge_query", &self.session.challenge_query),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("Session {} must not be empty", name));
            }
        }

        if self.session.idle_timeout_secs == 0 {
            errors.push("Session idle_timeout_secs must be greater than 0".to_string());
        }
        if self.session.sweep_interval_secs == 0 {
            errors.push("Session sweep_interval_secs must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    /// Load configuration from the default path, falling back to defaults if no file exists.
    ///
    /// Environment overrides are applied in both cases.
    pub fn load_or_default() -> Self {
        let config = match Self::load_default() {
            Ok(config) => config,
            Err(ConfigError::NotFound(_)) => Self::default(),
            Err(e) => {
                tracing::warn!("Ignoring unreadable config file: {}", e);
                Self::default()
            }
        };
        config.with_env_overrides()
    }

    /// Apply `WIREGATE_*` environment overrides.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(port) = env::get_u16(env::vars::WIREGATE_PORT) {
            self.gateway.port = port;
        }
        if let Some(required) = env::get_bool(env::vars::WIREGATE_ENCRYPTION_REQUIRED) {
            self.security.encryption_required = required;
        }
        if let Some(timeout) = env::get_u64(env::vars::WIREGATE_SESSION_TIMEOUT) {
            self.session.idle_timeout_secs = timeout;
        }
        self
    }
}

/// Configuration builder for creating configs programmatically.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new config builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the gateway port.
    pub fn port(mut self, port: u16) -> Self {
        self.config.gateway.port = port;
        self
    }

    /// Set the bind mode.
    pub fn bind(mut self, mode: super::BindMode) -> Self {
        self.config.gateway.bind = mode;
        self
    }

    /// Require encrypted calls.
    pub fn encryption_required(mut self, required: bool) -> Self {
        self.config.security.encryption_required = required;
        self
    }

    /// Set the RSA key size.
    pub fn rsa_key_bits(mut self, bits: usize) -> Self {
        self.config.security.rsa_key_bits = bits;
        self
    }

    /// Set the session idle timeout.
    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.session.idle_timeout_secs = secs;
        self
    }

    /// Set the log level.
    pub fn log_level(mut self, level: super::LogLevel) -> Self {
        self.config.logging.level = level;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate the configuration.
    pub fn build_validated(self) -> Result<Config, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
