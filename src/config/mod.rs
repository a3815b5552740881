use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;
use serde::Deserialize;

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

fn default_base_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_mail_from() -> String {
    "facturen@example.nl".to_string()
}

fn default_kvk_base_url() -> String {
    "https://api.kvk.nl/api".to_string()
}

fn default_vies_base_url() -> String {
    "https://ec.europa.eu/taxation_customs/vies/rest-api".to_string()
}

fn default_cache_ttl() -> u64 {
    86_400
}

fn default_registry_timeout() -> u64 {
    10
}

fn default_session_ttl() -> i64 {
    12
}

fn default_invoice_dir() -> String {
    "invoices".to_string()
}

/// Output format for the tracing subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Configuration for the application
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Public URL used in confirmation and signing links
    #[serde(default = "default_base_url")]
    pub app_base_url: String,
    #[serde(default = "default_mail_from")]
    pub mail_from: String,
    /// Mail is only logged when no SMTP host is configured
    pub smtp_host: Option<String>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub kvk_api_key: Option<String>,
    #[serde(default = "default_kvk_base_url")]
    pub kvk_base_url: String,
    #[serde(default = "default_vies_base_url")]
    pub vies_base_url: String,
    #[serde(default = "default_cache_ttl")]
    pub registry_cache_ttl_secs: u64,
    #[serde(default = "default_registry_timeout")]
    pub registry_timeout_secs: u64,
    #[serde(default = "default_session_ttl")]
    pub session_ttl_hours: i64,
    #[serde(default = "default_invoice_dir")]
    pub invoice_output_dir: String,
    #[serde(default)]
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// Variables from a `.env` file are loaded first if one exists.
    pub fn load() -> Result<Self> {
        dotenv().ok();

        let config = envy::from_env::<Config>().context("reading configuration from environment")?;

        Ok(config)
    }

    /// Build a configuration with defaults for everything but the database URL.
    pub fn with_database_url(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            bind_addr: default_bind_addr(),
            app_base_url: default_base_url(),
            mail_from: default_mail_from(),
            smtp_host: None,
            smtp_username: None,
            smtp_password: None,
            kvk_api_key: None,
            kvk_base_url: default_kvk_base_url(),
            vies_base_url: default_vies_base_url(),
            registry_cache_ttl_secs: default_cache_ttl(),
            registry_timeout_secs: default_registry_timeout(),
            session_ttl_hours: default_session_ttl(),
            invoice_output_dir: default_invoice_dir(),
            log_format: LogFormat::Pretty,
        }
    }

    /// Get a direct reference to the database URL
    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn registry_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.registry_cache_ttl_secs)
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }

    pub fn session_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.session_ttl_hours)
    }
}

/// Initialize environment variables and load configuration
pub fn init() -> Result<Config> {
    Config::load()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_optional_keys() {
        let vars = vec![("DATABASE_URL".to_string(), "postgres://localhost/zzp".to_string())];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:3000");
        assert_eq!(config.registry_cache_ttl(), Duration::from_secs(86_400));
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert!(config.smtp_host.is_none());
    }

    #[test]
    fn explicit_values_override_defaults() {
        let vars = vec![
            ("DATABASE_URL".to_string(), "postgres://localhost/zzp".to_string()),
            ("LOG_FORMAT".to_string(), "json".to_string()),
            ("SESSION_TTL_HOURS".to_string(), "2".to_string()),
            ("KVK_API_KEY".to_string(), "secret".to_string()),
        ];
        let config: Config = envy::from_iter(vars).unwrap();
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.session_ttl(), chrono::Duration::hours(2));
        assert_eq!(config.kvk_api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn missing_database_url_is_an_error() {
        let vars: Vec<(String, String)> = Vec::new();
        assert!(envy::from_iter::<_, Config>(vars).is_err());
    }
}
