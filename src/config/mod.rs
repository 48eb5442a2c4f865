//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Sensitive values wrapped in secrecy::SecretString to prevent log leaks.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use secrecy::SecretString;

use crate::controller::ControllerConfig;
use crate::error::{Error, Result};

/// Which notification backend is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    Alertmanager,
    Email,
    Console,
}

impl FromStr for HandlerKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "alertmanager" => Ok(Self::Alertmanager),
            "email" | "smtp" => Ok(Self::Email),
            "console" | "stdout" => Ok(Self::Console),
            other => Err(Error::Config(format!(
                "unknown handler {other:?} (expected alertmanager, email or console)"
            ))),
        }
    }
}

impl fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Alertmanager => "alertmanager",
            Self::Email => "email",
            Self::Console => "console",
        })
    }
}

#[derive(Debug, Clone)]
pub struct AlertmanagerConfig {
    pub address: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
}

#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    /// Also used as the sender address.
    pub username: String,
    pub password: Option<SecretString>,
    pub receivers: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum HandlerConfig {
    Alertmanager(AlertmanagerConfig),
    Email(EmailConfig),
    Console,
}

impl HandlerConfig {
    pub fn kind(&self) -> HandlerKind {
        match self {
            Self::Alertmanager(_) => HandlerKind::Alertmanager,
            Self::Email(_) => HandlerKind::Email,
            Self::Console => HandlerKind::Console,
        }
    }
}

#[derive(Debug)]
pub struct Config {
    /// Namespace to watch. Empty means all namespaces.
    pub namespace: String,
    pub kubeconfig: Option<PathBuf>,
    pub master: Option<String>,
    pub handler: HandlerConfig,
    pub workers: usize,
    pub tail_lines: u32,
    pub trigger_reasons: Vec<String>,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which maps a variable name to
    /// its value. Empty values count as unset.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let kind = match var("PODWATCH_HANDLER") {
            Some(value) => value.parse::<HandlerKind>()?,
            None => HandlerKind::Alertmanager,
        };
        let handler = match kind {
            HandlerKind::Alertmanager => HandlerConfig::Alertmanager(AlertmanagerConfig {
                address: required(&var, "ALERTMANAGER_ADDRESS")?,
                username: var("ALERTMANAGER_USERNAME"),
                password: var("ALERTMANAGER_PASSWORD").map(SecretString::from),
            }),
            HandlerKind::Email => HandlerConfig::Email(EmailConfig {
                host: required(&var, "SMTP_HOST")?,
                port: parsed(&var, "SMTP_PORT")?.unwrap_or(465),
                username: required(&var, "SMTP_USERNAME")?,
                password: var("SMTP_PASSWORD").map(SecretString::from),
                receivers: split_list(&required(&var, "SMTP_RECEIVERS")?),
            }),
            HandlerKind::Console => HandlerConfig::Console,
        };

        let defaults = ControllerConfig::default();
        Ok(Self {
            namespace: var("WATCH_NAMESPACE").unwrap_or_default(),
            kubeconfig: var("KUBECONFIG").map(PathBuf::from),
            master: var("KUBE_MASTER"),
            handler,
            workers: parsed(&var, "PODWATCH_WORKERS")?.unwrap_or(defaults.workers),
            tail_lines: parsed(&var, "PODWATCH_TAIL_LINES")?.unwrap_or(defaults.tail_lines),
            trigger_reasons: var("PODWATCH_TRIGGER_REASONS")
                .map(|v| split_list(&v))
                .unwrap_or(defaults.trigger_reasons),
            otel_endpoint: var("OTEL_ENDPOINT"),
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Reconciler settings derived from this config.
    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            tail_lines: self.tail_lines,
            trigger_reasons: self.trigger_reasons.clone(),
            ..ControllerConfig::default()
        }
    }
}

fn required(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<String> {
    var(name)
        .ok_or_else(|| Error::Config(format!("required environment variable {name} is not set")))
}

fn parsed<T>(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    var(name)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|e| Error::Config(format!("invalid {name}={v:?}: {e}")))
        })
        .transpose()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
