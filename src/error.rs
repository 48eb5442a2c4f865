//! Error types for podwatch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid object key: {0}")]
    InvalidKey(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("kubernetes API returned {status}: {message}")]
    Kube { status: u16, message: String },

    #[error("watch failed: {0}")]
    Watch(String),

    #[error("timed out waiting for caches to sync")]
    CacheSync,

    #[error("failed to gather diagnostics for {key}: {reason}")]
    Diagnostics { key: String, reason: String },

    #[error("handler failed: {0}")]
    Handler(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("template error: {0}")]
    Template(#[from] tera::Error),

    #[error("email error: {0}")]
    Email(String),

    #[error("smtp error: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
