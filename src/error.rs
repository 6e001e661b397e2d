use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out after {timeout:?} waiting for {expectation} from `{command}`\n{dump}")]
    Timeout {
        command: String,
        expectation: String,
        timeout: Duration,
        dump: String,
    },
    #[error("`{command}` exited with {actual}, expected {expected}\n{dump}")]
    UnexpectedExit {
        command: String,
        expected: i32,
        actual: i32,
        dump: String,
    },
    #[error("`{command}` unexpectedly said {pattern:?}\n{dump}")]
    UnexpectedOutput {
        command: String,
        pattern: String,
        dump: String,
    },
    #[error("`{command}`: {reason}\n{dump}")]
    Mismatch {
        command: String,
        reason: String,
        dump: String,
    },
    #[error("invalid pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("invalid pattern template {template:?}: {reason}")]
    InvalidTemplate { template: String, reason: String },
    #[error("invalid label selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
    #[error("fixture setup failed: {0}")]
    Setup(String),
    #[error("stdin of `{0}` is closed")]
    StdinClosed(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = HarnessError> = std::result::Result<T, E>;
