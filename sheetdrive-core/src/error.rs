//! Error types for sheetdrive-core

use thiserror::Error;

/// Which class of failure occurred, independent of the details.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Auth,
    Permission,
    Validation,
    Network,
    Plan,
    Remote,
    Config,
    Io,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::Permission => "permission",
            ErrorKind::Validation => "validation",
            ErrorKind::Network => "network",
            ErrorKind::Plan => "plan",
            ErrorKind::Remote => "remote",
            ErrorKind::Config => "config",
            ErrorKind::Io => "io",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type for the sheetdrive-core library
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or invalid credentials. Never retried.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The service refused access to a spreadsheet, tab or range
    #[error("permission denied: {message}")]
    Permission {
        message: String,
        hint: Option<String>,
    },

    /// Malformed input (bad range, oversized content, duplicate name, ...)
    #[error("validation error: {message}")]
    Validation {
        message: String,
        suggestion: Option<String>,
    },

    /// A transient failure outlived every retry attempt
    #[error("network error after {attempts} attempt(s): {message}")]
    Network { attempts: u32, message: String },

    /// Referenced plan step does not exist, or there is no plan
    #[error("plan error: {0}")]
    Plan(String),

    /// Delete refused for a protected file
    #[error("file '{0}' is protected and cannot be deleted")]
    ProtectedFile(String),

    /// Any other fatal answer from the spreadsheet service
    #[error("remote error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Error::Validation {
            message: message.into(),
            suggestion: Some(suggestion.into()),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Auth(_) => ErrorKind::Auth,
            Error::Permission { .. } => ErrorKind::Permission,
            Error::Validation { .. } | Error::ProtectedFile(_) => ErrorKind::Validation,
            Error::Network { .. } => ErrorKind::Network,
            Error::Plan(_) => ErrorKind::Plan,
            Error::Remote { .. } => ErrorKind::Remote,
            Error::Config(_) => ErrorKind::Config,
            Error::Io(_) | Error::Json(_) => ErrorKind::Io,
        }
    }

    /// One-line remediation, when there is something the caller can do.
    pub fn hint(&self) -> Option<String> {
        match self {
            Error::Auth(_) => Some(
                "supply a service-account JSON via --credentials or the configured environment variable"
                    .to_string(),
            ),
            Error::Permission { hint, .. } => hint.clone(),
            Error::Validation { suggestion, .. } => suggestion.clone(),
            Error::Network { .. } => {
                Some("the service is unavailable or rate limited; try again later".to_string())
            }
            Error::Plan(_) => Some(
                "check step ids with `sheetdrive plan show`, or create a plan with `sheetdrive plan create`"
                    .to_string(),
            ),
            Error::ProtectedFile(_) => {
                Some("protected files can be overwritten but not deleted".to_string())
            }
            _ => None,
        }
    }
}

/// Result type alias for sheetdrive-core
pub type Result<T> = std::result::Result<T, Error>;
