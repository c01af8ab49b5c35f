//! Error types for GRIB2 acquisition.

use chrono::{DateTime, Utc};
use thiserror::Error;

/// Result type alias using FetchError.
pub type Result<T> = std::result::Result<T, FetchError>;

/// Primary error type for acquisition operations.
#[derive(Debug, Error)]
pub enum FetchError {
    // === Request / template errors ===
    #[error("Model template '{model}' requires the '{field}' field")]
    MissingField { model: String, field: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown model: {0}")]
    UnknownModel(String),

    #[error("Unknown product '{product}' for model '{model}'")]
    UnknownProduct { model: String, product: String },

    // === Resolution errors ===
    #[error("No source has model={model} init={init_time} F{lead:02}")]
    Unresolvable {
        model: String,
        init_time: DateTime<Utc>,
        lead: u32,
    },

    #[error("No index file available for model={model} init={init_time} F{lead:02}")]
    NoIndex {
        model: String,
        init_time: DateTime<Utc>,
        lead: u32,
    },

    // === Inventory errors ===
    #[error("Malformed {dialect} index at line {line}: {message}")]
    BadDialect {
        dialect: &'static str,
        line: usize,
        message: String,
    },

    #[error("Invalid search regex: {0}")]
    BadSelector(#[from] regex::Error),

    // === Transfer errors ===
    #[error("Server rejected byte range for {url}: HTTP {status}")]
    RangeUnsupported { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FetchError {
    /// Whether this error can be downgraded to a warning under
    /// `ErrorPolicy::Warn`.
    pub fn is_downgradable(&self) -> bool {
        matches!(
            self,
            FetchError::Unresolvable { .. } | FetchError::NoIndex { .. }
        )
    }
}
