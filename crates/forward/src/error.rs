//! Error types for `model-relay-forward`.

use std::fmt;
use thiserror::Error;

/// Why a backend reply could not be unwrapped into text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MalformedReason {
    /// Body was not JSON at all.
    NotJson,
    /// `choices` absent, not an array, or empty.
    MissingChoices,
    /// First choice has no usable `message.content`.
    MissingContent,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotJson => "body is not valid JSON",
            Self::MissingChoices => "missing choices",
            Self::MissingContent => "missing message content",
        };
        f.write_str(s)
    }
}

/// Outcome of a failed gateway call.
///
/// Every variant renders as a sentence suitable for handing back to the calling tool layer;
/// see [`ForwardError::to_tool_text`].
#[derive(Debug, Error)]
pub enum ForwardError {
    /// URL or API key not configured. Detected before any I/O.
    #[error("{label} API configuration missing on server ({} not set).", .missing.join(", "))]
    ConfigurationMissing { label: String, missing: Vec<String> },

    /// DNS, connect, TLS or timeout failure. Never retried.
    #[error("{label} API request failed: {message}")]
    Transport { label: String, message: String },

    /// Backend answered with a non-2xx status.
    #[error("{label} API request failed with status {status}: {detail}")]
    BackendStatus {
        label: String,
        status: u16,
        detail: String,
    },

    /// Backend answered 2xx but the body is not a chat completion.
    #[error("Received unexpected response format from {label} API ({reason}).")]
    MalformedResponse {
        label: String,
        reason: MalformedReason,
    },
}

impl ForwardError {
    /// Render the error the way tool callers receive it: a plain string starting with `Error:`.
    #[must_use]
    pub fn to_tool_text(&self) -> String {
        format!("Error: {self}")
    }
}

/// Errors raised while loading or validating a backend catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read catalog '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse catalog: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid catalog: {0}")]
    Invalid(String),
}

/// Errors raised while reading a CSV file into JSON rows.
#[derive(Debug, Error)]
pub enum TabularError {
    #[error("File not found at path: {0}")]
    NotFound(String),

    #[error("Path is not a file: {0}")]
    NotAFile(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Error reading file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Error parsing CSV: {0}")]
    Parse(#[from] csv::Error),
}

impl TabularError {
    #[must_use]
    pub fn to_tool_text(&self) -> String {
        format!("Error processing CSV: {self}")
    }
}

pub type Result<T> = std::result::Result<T, ForwardError>;
