//! Error taxonomy for the ingestion pipeline.

use std::fmt;

use thiserror::Error;

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or malformed search configuration. Fatal before any I/O.
    #[error("Configuration error: {0}")]
    Config(String),

    /// One provider query failed. Absorbed by the source adapter.
    #[error("Transport error for {query}: {message}")]
    Transport { query: String, message: String },

    /// The store could not be opened at all.
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// One record could not be stored.
    #[error("Record error for {key}: {message}")]
    Record { key: String, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A text pattern failed to compile.
    #[error("Pattern error: {0}")]
    Pattern(#[from] regex::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Text-generation provider failure.
    #[error("Generation error: {0}")]
    Generation(String),
}

impl PipelineError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn transport(query: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Transport {
            query: query.into(),
            message: message.to_string(),
        }
    }

    pub fn connection(message: impl fmt::Display) -> Self {
        Self::Connection(message.to_string())
    }

    pub fn record(key: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Record {
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation(message.into())
    }

    /// Whether this error ends a whole run rather than one unit of work.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Connection(_))
    }
}
