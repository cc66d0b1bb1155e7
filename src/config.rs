use crate::graph::DEFAULT_ROW_LIMIT;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const DEFAULT_BIND: &str = "127.0.0.1:3000";
const DEFAULT_DATABASE_DIR: &str = "database";
const DEFAULT_UPLOAD_DIR: &str = "uploads";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_SESSION_HOURS: u64 = 24;
const MAX_SESSION_HOURS: u64 = 100 * 365 * 24;
const DEFAULT_SMTP_PORT: u16 = 465;

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a number, got \"{value}\"")]
    InvalidNumber { name: &'static str, value: String },

    #[error("{name} must be at most {max}, got {value}")]
    OutOfRange { name: &'static str, value: u64, max: u64 },
}

/// SMTP relay used to mail password reset tokens.
#[derive(Clone, Debug, PartialEq)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,

    /// Sender mailbox, e.g. `Sheetchart <noreply@example.com>`
    pub from: String,
}

/// Runtime settings of the server.
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// Address the HTTP server listens on
    pub bind_addr: String,

    /// Directory holding the JSON record files
    pub database_dir: PathBuf,

    /// Directory uploaded workbooks are written to
    pub upload_dir: PathBuf,

    /// Largest accepted workbook upload, in bytes
    pub max_upload_bytes: usize,

    /// Data rows read per chart extraction
    pub row_limit: usize,

    /// Lifetime of a login session
    pub session_ttl: Duration,

    /// Usernames that get the admin role when they register
    pub admin_usernames: Vec<String>,

    /// Mail relay; reset tokens are only logged when absent
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    /// Reads the configuration from the process environment.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("loaded environment from {}", path.display());
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from a variable lookup function.
    ///
    /// # Arguments
    /// * `lookup` - Returns the value of a variable, `None` when unset
    ///
    /// # Errors
    /// * `ConfigError::InvalidNumber` if a numeric variable does not parse
    /// * `ConfigError::OutOfRange` if the session lifetime exceeds 100 years
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let smtp = match get("SMTP_HOST") {
            Some(host) => Some(SmtpConfig {
                port: parse_or(&get, "SMTP_PORT", DEFAULT_SMTP_PORT)?,
                username: get("SMTP_USERNAME").unwrap_or_default(),
                password: get("SMTP_PASSWORD").unwrap_or_default(),
                from: get("SMTP_FROM").unwrap_or_else(|| format!("Sheetchart <noreply@{}>", host)),
                host,
            }),
            None => None,
        };

        let session_hours = parse_or(&get, "SHEETCHART_SESSION_HOURS", DEFAULT_SESSION_HOURS)?;
        if session_hours > MAX_SESSION_HOURS {
            return Err(ConfigError::OutOfRange {
                name: "SHEETCHART_SESSION_HOURS",
                value: session_hours,
                max: MAX_SESSION_HOURS,
            });
        }

        Ok(Config {
            bind_addr: get("SHEETCHART_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
            database_dir: get("SHEETCHART_DATABASE_DIR")
                .unwrap_or_else(|| DEFAULT_DATABASE_DIR.to_string())
                .into(),
            upload_dir: get("SHEETCHART_UPLOAD_DIR")
                .unwrap_or_else(|| DEFAULT_UPLOAD_DIR.to_string())
                .into(),
            max_upload_bytes: parse_or(&get, "SHEETCHART_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES)?,
            row_limit: parse_or(&get, "SHEETCHART_ROW_LIMIT", DEFAULT_ROW_LIMIT)?,
            session_ttl: Duration::from_secs(session_hours * 60 * 60),
            admin_usernames: get("SHEETCHART_ADMINS")
                .map(|list| {
                    list.split(',')
                        .map(str::trim)
                        .filter(|name| !name.is_empty())
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            smtp,
        })
    }

    /// Default settings with both data directories placed under `root`.
    pub fn with_root(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Config {
            database_dir: root.join(DEFAULT_DATABASE_DIR),
            upload_dir: root.join(DEFAULT_UPLOAD_DIR),
            ..Config::default()
        }
    }

    pub fn is_admin_username(&self, username: &str) -> bool {
        self.admin_usernames.iter().any(|name| name == username)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: DEFAULT_BIND.to_string(),
            database_dir: DEFAULT_DATABASE_DIR.into(),
            upload_dir: DEFAULT_UPLOAD_DIR.into(),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            row_limit: DEFAULT_ROW_LIMIT,
            session_ttl: Duration::from_secs(DEFAULT_SESSION_HOURS * 60 * 60),
            admin_usernames: Vec::new(),
            smtp: None,
        }
    }
}

fn parse_or<T, G>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::InvalidNumber {
            name,
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.row_limit, 1000);
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert!(config.smtp.is_none());
    }

    #[test]
    fn reads_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("SHEETCHART_BIND", "0.0.0.0:8080"),
            ("SHEETCHART_ROW_LIMIT", "250"),
            ("SHEETCHART_SESSION_HOURS", "2"),
            ("SHEETCHART_ADMINS", "root, ops ,"),
            ("SMTP_HOST", "smtp.example.com"),
            ("SMTP_USERNAME", "mailer"),
        ]))
        .unwrap();

        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert_eq!(config.row_limit, 250);
        assert_eq!(config.session_ttl, Duration::from_secs(7200));
        assert_eq!(config.admin_usernames, vec!["root", "ops"]);
        assert!(config.is_admin_username("ops"));

        let smtp = config.smtp.unwrap();
        assert_eq!(smtp.port, 465);
        assert_eq!(smtp.from, "Sheetchart <noreply@smtp.example.com>");
    }

    #[test]
    fn rejects_bad_numbers() {
        let err = Config::from_lookup(lookup(&[("SHEETCHART_ROW_LIMIT", "lots")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::InvalidNumber {
                name: "SHEETCHART_ROW_LIMIT",
                value: "lots".to_string()
            }
        );
    }

    #[test]
    fn rejects_session_lifetimes_that_would_overflow() {
        let err = Config::from_lookup(lookup(&[(
            "SHEETCHART_SESSION_HOURS",
            "18446744073709551615",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::OutOfRange { name: "SHEETCHART_SESSION_HOURS", value: u64::MAX, .. }
        ));

        let longest = Config::from_lookup(lookup(&[("SHEETCHART_SESSION_HOURS", "876000")])).unwrap();
        assert_eq!(longest.session_ttl, Duration::from_secs(876000 * 3600));
    }
}
