// GestureGate - Error Types
//
// Per-line and per-window errors are contained by the tasks that raise them
// and only ever logged. Configuration and classifier start-up errors are the
// fatal ones and bubble up to `main`.

use std::io;

use thiserror::Error;

/// A transport line that is not a valid `ax,ay,az` sample.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("expected 3 comma-separated fields, got {found}: {line:?}")]
    FieldCount { line: String, found: usize },

    #[error("field {field:?} is not a finite number: {line:?}")]
    NotANumber { line: String, field: String },
}

impl ParseError {
    /// The raw line that was rejected.
    pub fn line(&self) -> &str {
        match self {
            Self::FieldCount { line, .. } | Self::NotANumber { line, .. } => line,
        }
    }
}

#[derive(Error, Debug)]
pub enum ClassifierError {
    /// The classifier was used before `initialize` succeeded.
    #[error("classifier used before initialisation")]
    NotInitialized,

    /// Non-zero result code from the classifier.
    #[error("classification failed (code {code}): {detail}")]
    ClassificationFailed { code: i32, detail: String },

    #[error("classifier did not answer in time")]
    Timeout,

    #[error("failed to start model runner: {0}")]
    Spawn(String),

    #[error("model runner protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ClassifierError {
    /// Result code to report for this failure. Classifier-side exceptions
    /// that carry no code of their own report -1.
    pub fn code(&self) -> i32 {
        match self {
            Self::ClassificationFailed { code, .. } => *code,
            _ => -1,
        }
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    /// The link is not open (never opened, closed, or errored).
    #[error("transport unavailable")]
    Unavailable,

    #[error("unsupported baud rate {0}")]
    UnsupportedBaud(u32),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file: {0}")]
    Io(#[from] io::Error),

    #[error("malformed config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
