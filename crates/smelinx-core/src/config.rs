//! Smelinx configuration system.
//!
//! Every field has a serde default, so an empty `config.toml` is valid.
//! Deployed instances are usually configured through environment variables;
//! see [`SmelinxConfig::apply_env_overrides`].

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Result, SmelinxError};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SmelinxConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
    #[serde(default)]
    pub mailer: MailerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

impl SmelinxConfig {
    /// Load config from the default path (~/.smelinx/config.toml).
    pub fn load() -> Result<Self> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load config from a specific path.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SmelinxError::Config(format!("Failed to read config: {e}")))?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SmelinxError::Config(format!("Failed to parse config: {e}")))?;
        Ok(config)
    }

    /// Write config to `path`, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| SmelinxError::Config(format!("Failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default config path.
    pub fn default_path() -> PathBuf {
        Self::home_dir().join("config.toml")
    }

    /// Get the Smelinx home directory.
    pub fn home_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".smelinx")
    }

    /// Overlay environment variables on top of file values.
    ///
    /// `lookup` is usually `|k| std::env::var(k).ok()`. Blank values are
    /// ignored; integer values must parse to a positive number or they are
    /// ignored as well.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let positive = |key: &str| {
            text(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|n| *n > 0)
        };

        if let Some(path) = text("SQLITE_PATH") {
            self.database.path = path;
        }

        if let Some(n) = positive("NOTIFY_MAX_ATTEMPTS") {
            self.notify.max_attempts = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(n) = positive("NOTIFY_BACKOFF_BASE_SECS") {
            self.notify.backoff_base_secs = n;
        }
        if let Some(n) = positive("NOTIFY_BACKOFF_MAX_SECS") {
            self.notify.backoff_max_secs = n;
        }
        if let Some(n) = positive("NOTIFY_POLL_INTERVAL_SECS") {
            self.notify.poll_interval_secs = n;
        }
        if let Some(n) = positive("NOTIFY_SEND_TIMEOUT_SECS") {
            self.notify.send_timeout_secs = n;
        }
        if let Some(n) = positive("NOTIFY_BATCH_LIMIT") {
            self.notify.batch_limit = u32::try_from(n).unwrap_or(u32::MAX);
        }
        if let Some(to) = text("SENDGRID_TEST_TO") {
            self.notify.fallback_recipient = Some(to);
        }

        if let Some(key) = text("SENDGRID_API_KEY") {
            let sendgrid = self.mailer.sendgrid.get_or_insert_with(SendGridConfig::default);
            sendgrid.api_key = key;
        }
        if let Some(from) = text("SENDGRID_FROM") {
            self.mailer.from = from;
        }
        if let Some(name) = text("SENDGRID_FROM_NAME") {
            self.mailer.from_name = Some(name);
        }
    }

    /// Reject settings the dispatcher cannot run with.
    pub fn validate(&self) -> Result<()> {
        let n = &self.notify;
        if n.max_attempts == 0 {
            return Err(SmelinxError::Config("notify.max_attempts must be at least 1".into()));
        }
        if n.batch_limit == 0 {
            return Err(SmelinxError::Config("notify.batch_limit must be at least 1".into()));
        }
        if n.poll_interval_secs == 0 || n.cycle_timeout_secs == 0 {
            return Err(SmelinxError::Config(
                "notify.poll_interval_secs and notify.cycle_timeout_secs must be positive".into(),
            ));
        }
        if n.send_timeout_secs == 0 || n.send_timeout_secs >= n.cycle_timeout_secs {
            return Err(SmelinxError::Config(format!(
                "notify.send_timeout_secs ({}) must be positive and below notify.cycle_timeout_secs ({})",
                n.send_timeout_secs, n.cycle_timeout_secs
            )));
        }
        if n.backoff_base_secs == 0 {
            return Err(SmelinxError::Config("notify.backoff_base_secs must be positive".into()));
        }
        if n.backoff_max_secs < n.backoff_base_secs {
            return Err(SmelinxError::Config(format!(
                "notify.backoff_max_secs ({}) is below notify.backoff_base_secs ({})",
                n.backoff_max_secs, n.backoff_base_secs
            )));
        }
        Ok(())
    }
}

/// SQLite location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String { "./data/smelinx.db".into() }

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path() }
    }
}

/// Dispatcher timing, batching and retry budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
    #[serde(default = "default_cycle_timeout")]
    pub cycle_timeout_secs: u64,
    /// Upper bound for a single transport call; must stay below the cycle budget.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_secs: u64,
    #[serde(default = "default_backoff_max")]
    pub backoff_max_secs: u64,
    /// Used when an API has no contact address.
    #[serde(default)]
    pub fallback_recipient: Option<String>,
    #[serde(default = "default_product_name")]
    pub product_name: String,
}

fn default_poll_interval() -> u64 { 30 }
fn default_batch_limit() -> u32 { 50 }
fn default_cycle_timeout() -> u64 { 25 }
fn default_send_timeout() -> u64 { 15 }
fn default_max_attempts() -> u32 { 6 }
fn default_backoff_base() -> u64 { 60 }
fn default_backoff_max() -> u64 { 3600 }
fn default_product_name() -> String { "Smelinx".into() }

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            batch_limit: default_batch_limit(),
            cycle_timeout_secs: default_cycle_timeout(),
            send_timeout_secs: default_send_timeout(),
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base(),
            backoff_max_secs: default_backoff_max(),
            fallback_recipient: None,
            product_name: default_product_name(),
        }
    }
}

impl NotifyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cycle_timeout(&self) -> Duration {
        Duration::from_secs(self.cycle_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_secs(self.backoff_base_secs)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }
}

/// Which transport delivers notices.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailerProvider {
    /// SendGrid if credentials exist, else SMTP if configured, else console.
    #[default]
    Auto,
    Console,
    Sendgrid,
    Smtp,
}

/// Mail transport configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailerConfig {
    #[serde(default)]
    pub provider: MailerProvider,
    /// Sender address.
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub from_name: Option<String>,
    #[serde(default)]
    pub sendgrid: Option<SendGridConfig>,
    #[serde(default)]
    pub smtp: Option<SmtpConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendGridConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_sendgrid_base")]
    pub api_base: String,
}

fn default_sendgrid_base() -> String { "https://api.sendgrid.com".into() }

impl Default for SendGridConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_sendgrid_base(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_smtp_port() -> u16 { 587 }

/// Logging output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String { "info".into() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = SmelinxConfig::default();
        assert_eq!(config.notify.poll_interval_secs, 30);
        assert_eq!(config.notify.batch_limit, 50);
        assert_eq!(config.notify.max_attempts, 6);
        assert_eq!(config.notify.backoff_base(), Duration::from_secs(60));
        assert_eq!(config.notify.backoff_max(), Duration::from_secs(3600));
        assert!(config.notify.fallback_recipient.is_none());
        assert_eq!(config.mailer.provider, MailerProvider::Auto);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            [database]
            path = "/var/lib/smelinx/app.db"

            [notify]
            max_attempts = 3
            backoff_base_secs = 10
            fallback_recipient = "ops@example.com"

            [mailer]
            provider = "smtp"
            from = "notices@example.com"

            [mailer.smtp]
            host = "smtp.example.com"
        "#;

        let config: SmelinxConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.database.path, "/var/lib/smelinx/app.db");
        assert_eq!(config.notify.max_attempts, 3);
        assert_eq!(config.notify.backoff_base_secs, 10);
        assert_eq!(config.notify.backoff_max_secs, 3600);
        assert_eq!(config.notify.fallback_recipient.as_deref(), Some("ops@example.com"));
        assert_eq!(config.mailer.provider, MailerProvider::Smtp);
        let smtp = config.mailer.smtp.unwrap();
        assert_eq!(smtp.host, "smtp.example.com");
        assert_eq!(smtp.port, 587);
    }

    #[test]
    fn test_config_missing_fields_use_defaults() {
        let config: SmelinxConfig = toml::from_str("").unwrap();
        assert_eq!(config.database.path, "./data/smelinx.db");
        assert_eq!(config.notify.cycle_timeout_secs, 25);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = SmelinxConfig::default();
        config.apply_env_overrides(env(&[
            ("SQLITE_PATH", "/tmp/x.db"),
            ("NOTIFY_MAX_ATTEMPTS", "3"),
            ("NOTIFY_BACKOFF_BASE_SECS", "5"),
            ("SENDGRID_TEST_TO", "qa@example.com"),
            ("SENDGRID_API_KEY", "SG.key"),
            ("SENDGRID_FROM", "noreply@example.com"),
        ]));
        assert_eq!(config.database.path, "/tmp/x.db");
        assert_eq!(config.notify.max_attempts, 3);
        assert_eq!(config.notify.backoff_base_secs, 5);
        assert_eq!(config.notify.fallback_recipient.as_deref(), Some("qa@example.com"));
        assert_eq!(config.mailer.sendgrid.unwrap().api_key, "SG.key");
        assert_eq!(config.mailer.from, "noreply@example.com");
    }

    #[test]
    fn test_env_overrides_ignore_bad_numbers_and_blanks() {
        let mut config = SmelinxConfig::default();
        config.apply_env_overrides(env(&[
            ("NOTIFY_MAX_ATTEMPTS", "0"),
            ("NOTIFY_BACKOFF_BASE_SECS", "-4"),
            ("NOTIFY_BACKOFF_MAX_SECS", "soon"),
            ("SENDGRID_TEST_TO", "   "),
        ]));
        assert_eq!(config.notify.max_attempts, 6);
        assert_eq!(config.notify.backoff_base_secs, 60);
        assert_eq!(config.notify.backoff_max_secs, 3600);
        assert!(config.notify.fallback_recipient.is_none());
    }

    #[test]
    fn test_validate_rejects_inverted_backoff() {
        let mut config = SmelinxConfig::default();
        config.notify.backoff_max_secs = 10;
        assert!(matches!(config.validate(), Err(SmelinxError::Config(_))));

        config.notify.backoff_max_secs = 3600;
        config.notify.max_attempts = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_send_timeout_must_fit_inside_cycle() {
        let mut config = SmelinxConfig::default();
        assert_eq!(config.notify.send_timeout(), Duration::from_secs(15));

        config.notify.send_timeout_secs = 25;
        assert!(matches!(config.validate(), Err(SmelinxError::Config(_))));

        config.notify.send_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.apply_env_overrides(env(&[("NOTIFY_SEND_TIMEOUT_SECS", "8")]));
        assert_eq!(config.notify.send_timeout_secs, 8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = std::env::temp_dir().join("smelinx-config-test");
        let path = dir.join("config.toml");
        let mut config = SmelinxConfig::default();
        config.notify.batch_limit = 7;
        config.save_to(&path).unwrap();

        let loaded = SmelinxConfig::load_from(&path).unwrap();
        assert_eq!(loaded.notify.batch_limit, 7);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_home_dir() {
        let home = SmelinxConfig::home_dir();
        assert!(home.to_string_lossy().contains("smelinx"));
    }
}
