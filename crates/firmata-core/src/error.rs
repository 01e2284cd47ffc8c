//! Error types for the firmata launcher.
//!
//! Every fallible operation in the core returns [`FirmataError`]. The front end
//! maps [`FirmataError::category`] to an exit status and prints the message.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the launcher core.
#[derive(Debug, Error)]
pub enum FirmataError {
    // Network errors
    #[error("Network error: {message}")]
    Network {
        message: String,
        /// Optional cause description
        cause: Option<String>,
    },

    #[error("Request timeout after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Rate limited by {service}, retry after {retry_after_secs:?} seconds")]
    RateLimited {
        service: String,
        retry_after_secs: Option<u64>,
    },

    #[error("Download failed for {url}: {message}")]
    DownloadFailed { url: String, message: String },

    #[error("Checksum mismatch for {file}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("GitHub API error: {message}")]
    GitHubApi {
        message: String,
        status_code: Option<u16>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Version management errors
    #[error("Version not installed: {version}")]
    VersionNotFound { version: String },

    #[error("Version already installed: {version}")]
    VersionAlreadyInstalled { version: String },

    #[error("Invalid version: {version}")]
    InvalidVersion { version: String },

    #[error("No release available: {message}")]
    NoReleaseAvailable { message: String },

    // Process errors
    #[error("owlcms-firmata is already running (pid {pid})")]
    AlreadyRunning { pid: u32 },

    #[error("Launch failed for {version}: {message}")]
    LaunchFailed { version: String, message: String },

    #[error("owlcms-firmata is not running")]
    ProcessNotRunning,

    #[error("Java runtime unavailable: {message}")]
    RuntimeUnavailable { message: String },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    // Validation errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for launcher operations.
pub type Result<T> = std::result::Result<T, FirmataError>;

/// Broad grouping of failures, used by front ends to pick an exit status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Filesystem,
    Network,
    Process,
    Validation,
    Internal,
}

impl From<std::io::Error> for FirmataError {
    fn from(err: std::io::Error) -> Self {
        FirmataError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for FirmataError {
    fn from(err: serde_json::Error) -> Self {
        FirmataError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<reqwest::Error> for FirmataError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FirmataError::Timeout(std::time::Duration::from_secs(0))
        } else {
            FirmataError::Network {
                message: err.to_string(),
                cause: Some(err.to_string()),
            }
        }
    }
}

impl From<walkdir::Error> for FirmataError {
    fn from(err: walkdir::Error) -> Self {
        let path = err.path().map(|p| p.to_path_buf());
        let message = err.to_string();
        FirmataError::Io {
            message,
            path,
            source: err.into_io_error(),
        }
    }
}

impl FirmataError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        FirmataError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Classify the error for reporting.
    pub fn category(&self) -> ErrorCategory {
        match self {
            FirmataError::Io { .. }
            | FirmataError::FileNotFound(_)
            | FirmataError::NotADirectory(_) => ErrorCategory::Filesystem,

            FirmataError::Network { .. }
            | FirmataError::Timeout(_)
            | FirmataError::RateLimited { .. }
            | FirmataError::DownloadFailed { .. }
            | FirmataError::ChecksumMismatch { .. }
            | FirmataError::GitHubApi { .. }
            | FirmataError::NoReleaseAvailable { .. } => ErrorCategory::Network,

            FirmataError::AlreadyRunning { .. }
            | FirmataError::LaunchFailed { .. }
            | FirmataError::ProcessNotRunning
            | FirmataError::RuntimeUnavailable { .. } => ErrorCategory::Process,

            FirmataError::VersionNotFound { .. }
            | FirmataError::VersionAlreadyInstalled { .. }
            | FirmataError::InvalidVersion { .. }
            | FirmataError::Config { .. }
            | FirmataError::Validation { .. } => ErrorCategory::Validation,

            FirmataError::Json { .. } | FirmataError::Other(_) => ErrorCategory::Internal,
        }
    }

    /// Check if this error should trigger a retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FirmataError::Network { .. }
                | FirmataError::Timeout(_)
                | FirmataError::RateLimited { .. }
        )
    }
}
