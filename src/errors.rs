// src/errors.rs
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Environment variable error: {0}")]
    EnvVar(#[from] std::env::VarError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Market data feed error: {0}")]
    Feed(String),

    #[error("State store error: {0}")]
    Store(String),
}
