// src/error.rs

//! Unified error handling for pushwatch.

use std::fmt;

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// Network failure, timeout or non-2xx status after all attempts
    #[error("Transport error for {source_name} after {attempts} attempt(s): {message}")]
    Transport {
        source_name: String,
        attempts: u32,
        message: String,
    },

    /// Payload did not match the expected shape
    #[error("Unexpected payload from {source_name}: {message}")]
    Shape {
        source_name: String,
        message: String,
    },

    /// A single item could not be parsed
    #[error("Item #{index} skipped: {message}")]
    PartialParse { index: usize, message: String },

    /// Push endpoint rejected the message or was unreachable
    #[error("Notify error: {0}")]
    Notify(String),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or a request could not be prepared
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

    /// Regex compilation failed
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// CSS selector parsing failed
    #[error("Invalid selector '{selector}': {message}")]
    Selector { selector: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl AppError {
    /// Create a transport error.
    pub fn transport(source_name: impl Into<String>, attempts: u32, message: impl fmt::Display) -> Self {
        Self::Transport {
            source_name: source_name.into(),
            attempts,
            message: message.to_string(),
        }
    }

    /// Create a payload shape error.
    pub fn shape(source_name: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Shape {
            source_name: source_name.into(),
            message: message.to_string(),
        }
    }

    /// Create a per-item parse error.
    pub fn partial(index: usize, message: impl fmt::Display) -> Self {
        Self::PartialParse {
            index,
            message: message.to_string(),
        }
    }

    /// Create a selector parsing error.
    pub fn selector(selector: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Selector {
            selector: selector.into(),
            message: message.to_string(),
        }
    }

    /// Create a notify error.
    pub fn notify(message: impl fmt::Display) -> Self {
        Self::Notify(message.to_string())
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_message_names_source_and_attempts() {
        let err = AppError::transport("yhdm", 3, "connection refused");
        let text = err.to_string();
        assert!(text.contains("yhdm"));
        assert!(text.contains("3 attempt"));
    }

    #[test]
    fn partial_parse_carries_index() {
        let err = AppError::partial(4, "missing title");
        assert!(matches!(err, AppError::PartialParse { index: 4, .. }));
    }
}
