//! Settings for bulkmail
//!
//! The settings file keeps the flat `smtp_*` keys written by earlier
//! tooling so existing `config.json` files keep working. Environment
//! variables prefixed with `BULKMAIL_` override file values, e.g.
//! `BULKMAIL_SMTP_PASSWORD` or `BULKMAIL_LOGGING__LEVEL`.

use crate::types::RelayCredentials;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Default settings file name
pub const DEFAULT_SETTINGS_FILE: &str = "config.json";

/// Prefix for environment overrides
const ENV_PREFIX: &str = "BULKMAIL";

/// Main settings structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Relay host name
    pub smtp_host: String,

    /// Relay port; older files store it as text
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,

    /// Login user, also the default sender
    pub smtp_user: String,

    /// Login secret
    #[serde(default)]
    pub smtp_password: String,

    /// Negotiate STARTTLS before authenticating
    #[serde(default)]
    pub smtp_starttls: bool,

    /// Sender address when it differs from the login user
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_address: Option<String>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_smtp_port() -> u16 {
    587
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: "json" or "text"
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

impl Settings {
    /// Create settings from captured relay values
    pub fn new(
        smtp_host: impl Into<String>,
        smtp_port: u16,
        smtp_user: impl Into<String>,
        smtp_password: impl Into<String>,
    ) -> Self {
        Self {
            smtp_host: smtp_host.into(),
            smtp_port,
            smtp_user: smtp_user.into(),
            smtp_password: smtp_password.into(),
            smtp_starttls: false,
            from_address: None,
            logging: LoggingConfig::default(),
        }
    }

    /// Load settings from a file layered with environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Settings file {} not found; run `bulkmail configure` first",
                path.display()
            )));
        }

        let settings: Settings = config::Config::builder()
            .add_source(config::File::from(path).format(config::FileFormat::Json))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()
            .and_then(|c| c.try_deserialize::<Settings>())
            .map_err(|e| Error::Config(format!("Failed to load settings: {}", e)))?;

        settings.validate()?;
        debug!(path = %path.display(), host = %settings.smtp_host, "Loaded settings");

        Ok(settings)
    }

    /// Persist settings as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize settings: {}", e)))?;
        std::fs::write(path, content)
            .map_err(|e| Error::Config(format!("Failed to write settings file: {}", e)))?;

        info!(path = %path.display(), "Saved relay settings");
        Ok(())
    }

    /// Check that the relay can be addressed and logged into
    pub fn validate(&self) -> Result<()> {
        if self.smtp_host.trim().is_empty() {
            return Err(Error::Config("smtp_host is empty".to_string()));
        }
        if self.smtp_port == 0 {
            return Err(Error::Config("smtp_port must be between 1 and 65535".to_string()));
        }
        if self.smtp_user.trim().is_empty() {
            return Err(Error::Config("smtp_user is empty".to_string()));
        }
        Ok(())
    }

    /// Resolve the credentials used by the dispatch engine
    pub fn credentials(&self) -> RelayCredentials {
        RelayCredentials {
            host: self.smtp_host.trim().to_string(),
            port: self.smtp_port,
            username: self.smtp_user.clone(),
            secret: self.smtp_password.clone(),
            use_explicit_tls: self.smtp_starttls,
            from_address: self.from_address.clone(),
        }
    }
}
