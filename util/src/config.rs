//! Process configuration shared by the `api`, `worker` and `migration` binaries.
//!
//! `AppConfig` is loaded once at startup from `.env` and the process environment.
//! A handful of options are required and must carry a non-empty value; any of them
//! missing is a fatal startup error, so no request or delivery is ever served with a
//! half-configured process.

use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

/// Error raised while loading configuration. Always fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} is required and must not be empty")]
    Missing(&'static str),
    #[error("{name} has an invalid value `{value}`")]
    Invalid { name: &'static str, value: String },
}

/// Represents the complete application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub env: String,
    pub project_name: String,
    pub log_level: String,
    pub log_file: String,
    pub log_to_stdout: bool,
    pub host: String,
    pub port: u16,
    pub worker_port: u16,

    // Ledger
    pub database_path: String,
    /// CSV of accounts to provision at `api` startup. Unset skips provisioning.
    pub accounts_csv: Option<String>,

    // Dispatch broker
    pub dispatch_topic: String,
    pub dispatch_lease_secs: u64,
    pub dispatch_poll_ms: u64,
    pub dispatch_max_deliveries: u32,
    pub worker_concurrency: usize,

    // Archive store
    pub archive_bucket: String,
    pub storage_root: String,
    pub scratch_dir: String,
    pub fetch_timeout_secs: u64,
    pub store_timeout_secs: u64,

    // Notifier
    pub sender_email: String,
    pub region: String,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub smtp_username: String,
    pub smtp_password: String,
}

static CONFIG_INSTANCE: OnceLock<AppConfig> = OnceLock::new();

impl AppConfig {
    /// Loads `.env` (if present), validates the environment and stores the result
    /// for the lifetime of the process.
    ///
    /// Calling it again returns the configuration stored by the first successful call.
    pub fn init() -> Result<&'static AppConfig, ConfigError> {
        if let Some(cfg) = CONFIG_INSTANCE.get() {
            return Ok(cfg);
        }
        let cfg = Self::from_env()?;
        Ok(CONFIG_INSTANCE.get_or_init(|| cfg))
    }

    /// Loads the configuration from `.env` and environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    ///
    /// Used by `from_env`, and by tests that must not touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let region = required(&lookup, "REGION")?;
        let smtp_host = optional(&lookup, "SMTP_HOST")
            .unwrap_or_else(|| format!("email-smtp.{region}.amazonaws.com"));

        let config = Self {
            env: optional(&lookup, "APP_ENV").unwrap_or_else(|| "development".into()),
            project_name: optional(&lookup, "PROJECT_NAME")
                .unwrap_or_else(|| "submission-pipeline".into()),
            log_level: optional(&lookup, "LOG_LEVEL")
                .unwrap_or_else(|| "info,sqlx=warn".into()),
            log_file: optional(&lookup, "LOG_FILE").unwrap_or_else(|| "pipeline.log".into()),
            log_to_stdout: parsed(&lookup, "LOG_TO_STDOUT", true)?,
            host: optional(&lookup, "HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: parsed(&lookup, "PORT", 8080)?,
            worker_port: parsed(&lookup, "WORKER_PORT", 8081)?,

            database_path: required(&lookup, "DATABASE_PATH")?,
            accounts_csv: optional(&lookup, "ACCOUNTS_CSV"),

            dispatch_topic: required(&lookup, "DISPATCH_TOPIC")?,
            dispatch_lease_secs: positive(&lookup, "DISPATCH_LEASE_SECS", 300)?,
            dispatch_poll_ms: parsed(&lookup, "DISPATCH_POLL_MS", 1000)?,
            dispatch_max_deliveries: positive(&lookup, "DISPATCH_MAX_DELIVERIES", 5)?,
            worker_concurrency: positive(&lookup, "WORKER_CONCURRENCY", 4)?,

            archive_bucket: required(&lookup, "ARCHIVE_BUCKET")?,
            storage_root: optional(&lookup, "STORAGE_ROOT").unwrap_or_else(|| "data/archive".into()),
            scratch_dir: optional(&lookup, "SCRATCH_DIR")
                .unwrap_or_else(|| env::temp_dir().to_string_lossy().into_owned()),
            fetch_timeout_secs: positive(&lookup, "FETCH_TIMEOUT_SECS", 30)?,
            store_timeout_secs: positive(&lookup, "STORE_TIMEOUT_SECS", 60)?,

            sender_email: required(&lookup, "SENDER_EMAIL")?,
            region,
            smtp_host,
            smtp_port: parsed(&lookup, "SMTP_PORT", 587)?,
            smtp_username: optional(&lookup, "SMTP_USERNAME").unwrap_or_default(),
            smtp_password: optional(&lookup, "SMTP_PASSWORD").unwrap_or_default(),
        };

        // A lease must outlive one full fetch and store, or a running delivery
        // is handed out again.
        let work_secs = config
            .fetch_timeout_secs
            .saturating_add(config.store_timeout_secs);
        if config.dispatch_lease_secs <= work_secs {
            return Err(ConfigError::Invalid {
                name: "DISPATCH_LEASE_SECS",
                value: format!(
                    "{} (must exceed FETCH_TIMEOUT_SECS + STORE_TIMEOUT_SECS = {work_secs})",
                    config.dispatch_lease_secs
                ),
            });
        }

        Ok(config)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.store_timeout_secs)
    }

    pub fn dispatch_lease(&self) -> Duration {
        Duration::from_secs(self.dispatch_lease_secs)
    }

    pub fn dispatch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.dispatch_poll_ms)
    }

    pub fn scratch_root(&self) -> PathBuf {
        PathBuf::from(&self.scratch_dir)
    }

    pub fn is_production(&self) -> bool {
        self.env.eq_ignore_ascii_case("production")
    }
}

/// Trimmed, non-empty value of `name`, or `None`.
fn optional<F>(lookup: &F, name: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F>(lookup: &F, name: &'static str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    optional(lookup, name).ok_or(ConfigError::Missing(name))
}

fn parsed<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match optional(lookup, name) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

fn positive<F, T>(lookup: &F, name: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr + PartialEq + Default,
{
    let value = parsed(lookup, name, default)?;
    if value == T::default() {
        return Err(ConfigError::Invalid {
            name,
            value: "0".into(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base() -> HashMap<&'static str, &'static str> {
        HashMap::from([
            ("DATABASE_PATH", "data/test.db"),
            ("DISPATCH_TOPIC", "submissions"),
            ("ARCHIVE_BUCKET", "csye6225-submissions"),
            ("SENDER_EMAIL", "noreply@example.com"),
            ("REGION", "us-east-1"),
        ])
    }

    fn load(vars: &HashMap<&'static str, &'static str>) -> Result<AppConfig, ConfigError> {
        AppConfig::from_lookup(|k| vars.get(k).map(|v| v.to_string()))
    }

    #[test]
    fn loads_required_values_and_defaults() {
        let cfg = load(&base()).unwrap();
        assert_eq!(cfg.dispatch_topic, "submissions");
        assert_eq!(cfg.archive_bucket, "csye6225-submissions");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.worker_concurrency, 4);
        assert_eq!(cfg.fetch_timeout(), Duration::from_secs(30));
        assert_eq!(cfg.smtp_host, "email-smtp.us-east-1.amazonaws.com");
        assert_eq!(cfg.accounts_csv, None);
    }

    #[test]
    fn accounts_csv_is_optional() {
        let mut vars = base();
        vars.insert("ACCOUNTS_CSV", "opt/users.csv");
        assert_eq!(load(&vars).unwrap().accounts_csv.as_deref(), Some("opt/users.csv"));
    }

    #[test]
    fn each_required_option_is_fatal_when_missing() {
        for name in [
            "DATABASE_PATH",
            "DISPATCH_TOPIC",
            "ARCHIVE_BUCKET",
            "SENDER_EMAIL",
            "REGION",
        ] {
            let mut vars = base();
            vars.remove(name);
            assert_eq!(load(&vars).unwrap_err(), ConfigError::Missing(name));
        }
    }

    #[test]
    fn blank_required_value_counts_as_missing() {
        let mut vars = base();
        vars.insert("ARCHIVE_BUCKET", "   ");
        assert_eq!(
            load(&vars).unwrap_err(),
            ConfigError::Missing("ARCHIVE_BUCKET")
        );
    }

    #[test]
    fn malformed_number_is_rejected() {
        let mut vars = base();
        vars.insert("FETCH_TIMEOUT_SECS", "soon");
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid { name: "FETCH_TIMEOUT_SECS", .. }
        ));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let mut vars = base();
        vars.insert("WORKER_CONCURRENCY", "0");
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid { name: "WORKER_CONCURRENCY", .. }
        ));
    }

    #[test]
    fn zero_lease_and_zero_max_deliveries_are_rejected() {
        for name in ["DISPATCH_LEASE_SECS", "DISPATCH_MAX_DELIVERIES"] {
            let mut vars = base();
            vars.insert(name, "0");
            assert!(matches!(
                load(&vars).unwrap_err(),
                ConfigError::Invalid { name: n, .. } if n == name
            ));
        }
    }

    #[test]
    fn lease_must_outlast_fetch_and_store() {
        let mut vars = base();
        vars.insert("FETCH_TIMEOUT_SECS", "30");
        vars.insert("STORE_TIMEOUT_SECS", "60");

        vars.insert("DISPATCH_LEASE_SECS", "90");
        assert!(matches!(
            load(&vars).unwrap_err(),
            ConfigError::Invalid { name: "DISPATCH_LEASE_SECS", .. }
        ));

        vars.insert("DISPATCH_LEASE_SECS", "91");
        assert_eq!(load(&vars).unwrap().dispatch_lease(), Duration::from_secs(91));
    }

    #[test]
    fn explicit_smtp_host_wins_over_region_default() {
        let mut vars = base();
        vars.insert("SMTP_HOST", "localhost");
        vars.insert("SMTP_PORT", "2525");
        let cfg = load(&vars).unwrap();
        assert_eq!(cfg.smtp_host, "localhost");
        assert_eq!(cfg.smtp_port, 2525);
    }
}
