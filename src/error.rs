// src/error.rs

//! Unified error handling for the crawler application.

use std::fmt;

use thiserror::Error;

/// Result type alias for crawler operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// SQLite sink failed
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// A fetched page did not contain an expected field
    #[error("Parse error for {url}: {message}")]
    Parse { url: String, message: String },

    /// A page could not be fetched
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },

    /// Record sink rejected a batch
    #[error("Sink error: {0}")]
    Sink(String),

    /// A background task panicked or was cancelled
    #[error("Task error: {0}")]
    Task(String),
}

impl AppError {
    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a parse error for a page.
    pub fn parse(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Parse {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a fetch error for a page.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Create a sink error.
    pub fn sink(message: impl fmt::Display) -> Self {
        Self::Sink(message.to_string())
    }

    /// Whether this error must halt the crawl.
    ///
    /// Only local I/O (chunk append, output directory) is fatal; fetch,
    /// parse and sink failures drop the affected page or item.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Task(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let io = AppError::from(std::io::Error::other("disk full"));
        assert!(io.is_fatal());
        assert!(!AppError::fetch("https://example.com", "503").is_fatal());
        assert!(!AppError::parse("https://example.com", "missing court").is_fatal());
        assert!(!AppError::sink("locked").is_fatal());
    }

    #[test]
    fn test_display_includes_context() {
        let err = AppError::parse("https://example.com/r?ID=1", "missing #lblNumber");
        assert_eq!(
            err.to_string(),
            "Parse error for https://example.com/r?ID=1: missing #lblNumber"
        );
    }
}
