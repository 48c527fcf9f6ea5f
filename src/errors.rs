//! Error types for CMS Fetcher
//!
//! This module defines the error taxonomy for every component of the ingest
//! pipeline. Transient upstream conditions are absorbed by the retry loop and
//! only surface as [`HttpError::RetriesExhausted`]; structural problems
//! (missing token, unexpected content type, empty catalog) are fatal; data
//! quality problems inside raw files never become errors at all.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// Errors raised by the resilient HTTP layer
#[derive(Error, Debug)]
pub enum HttpError {
    /// Network fault that persisted through the network retry budget
    #[error("HTTP request failed")]
    Network(#[from] reqwest::Error),

    /// Upstream kept throttling past the attempt cap or deadline
    #[error("Upstream still throttling after {attempts} attempts (last status {status})")]
    RetriesExhausted { status: StatusCode, attempts: u32 },

    /// The run was cancelled while a request was pending or sleeping
    #[error("Request cancelled")]
    Cancelled,

    /// A URL could not be composed from the configured base URL
    #[error("Invalid URL: {url} - {error}")]
    InvalidUrl { url: String, error: String },

    /// Client-side rate limit misconfigured
    #[error("Rate limit must be greater than zero")]
    InvalidRateLimit,
}

/// Errors raised while decoding an XML or JSON response envelope
#[derive(Error, Debug)]
pub enum EnvelopeError {
    /// Content type was neither XML-like nor JSON-like
    #[error("Unsupported content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    /// XML body could not be read
    #[error("Invalid XML envelope: {reason}")]
    Xml { reason: String },

    /// JSON body could not be parsed
    #[error("Invalid JSON envelope: {0}")]
    Json(#[from] serde_json::Error),

    /// Body could not be read from the response
    #[error("Failed to read response body")]
    Body(#[from] reqwest::Error),
}

/// Authentication-related errors
#[derive(Error, Debug)]
pub enum AuthError {
    /// Missing environment variables for credentials
    #[error(
        "Missing CMS credentials. Set CMS_API_KEY, or CMS_USERNAME and CMS_PASSWORD, or run 'auth setup'"
    )]
    MissingCredentials,

    /// HTTP layer failure during login
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Login endpoint answered with a non-success status
    #[error("CMS login failed with HTTP {status}")]
    LoginFailed { status: StatusCode },

    /// The login envelope carried no `accessToken.token`
    #[error("CMS login failed: token not found in the response")]
    MissingToken,

    /// The login envelope was neither XML nor JSON
    #[error("CMS login failed due to unexpected response format: {content_type}")]
    UnsupportedContentType { content_type: String },

    /// The login envelope could not be decoded
    #[error("CMS login response could not be decoded: {reason}")]
    MalformedResponse { reason: String },

    /// Invalid username format
    #[error("Invalid username format: {reason}")]
    InvalidUsername { reason: String },

    /// Credential cannot be carried in an Authorization header
    #[error("Invalid CMS credential: {reason}")]
    InvalidCredential { reason: String },

    /// File I/O error during credential storage
    #[error("Failed to save credentials to file")]
    CredentialStorage(#[from] std::io::Error),
}

/// Device and raw-file catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// HTTP layer failure during listing
    #[error(transparent)]
    Http(#[from] HttpError),

    /// `systemItems.systemItem` missing or empty
    #[error("No devices found in the catalog response")]
    NoDevices,

    /// Listing endpoint answered with a non-success status
    #[error("Catalog request to {url} failed with HTTP {status}")]
    Status { url: String, status: StatusCode },

    /// The envelope was neither XML nor JSON
    #[error("Unexpected catalog content type: {content_type}")]
    UnsupportedContentType { content_type: String },

    /// The envelope was decodable but did not match the expected shape
    #[error("Malformed catalog response: {reason}")]
    Malformed { reason: String },
}

impl From<EnvelopeError> for AuthError {
    fn from(error: EnvelopeError) -> Self {
        match error {
            EnvelopeError::UnsupportedContentType { content_type } => {
                AuthError::UnsupportedContentType { content_type }
            }
            EnvelopeError::Body(e) => AuthError::Http(HttpError::Network(e)),
            other => AuthError::MalformedResponse {
                reason: other.to_string(),
            },
        }
    }
}

impl From<EnvelopeError> for CatalogError {
    fn from(error: EnvelopeError) -> Self {
        match error {
            EnvelopeError::UnsupportedContentType { content_type } => {
                CatalogError::UnsupportedContentType { content_type }
            }
            EnvelopeError::Body(e) => CatalogError::Http(HttpError::Network(e)),
            other => CatalogError::Malformed {
                reason: other.to_string(),
            },
        }
    }
}

/// Raw-file download errors
#[derive(Error, Debug)]
pub enum DownloadError {
    /// HTTP layer failure
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Body stream failed mid-transfer
    #[error("Download stream interrupted")]
    Stream(#[from] reqwest::Error),

    /// Terminal non-success status after the retry loop settled
    #[error("Failed to download {url}: HTTP {status}")]
    Status { url: String, status: StatusCode },

    /// I/O error while archiving the raw file
    #[error("File I/O error")]
    Io(#[from] std::io::Error),

    /// Atomic file operation failed
    #[error("Atomic file operation failed: could not rename {temp_path} to {final_path}")]
    AtomicOperationFailed {
        temp_path: PathBuf,
        final_path: PathBuf,
    },
}

impl DownloadError {
    /// Whether this failure came from cancelling the run
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DownloadError::Http(HttpError::Cancelled))
    }
}

/// Columnar output errors
#[derive(Error, Debug)]
pub enum OutputError {
    /// DuckDB failed while staging or exporting records
    #[error("Columnar export failed")]
    DuckDb(#[from] duckdb::Error),

    /// I/O error preparing output locations
    #[error("Output I/O error")]
    Io(#[from] std::io::Error),

    /// Blocking writer task panicked or was cancelled
    #[error("Output writer task failed: {reason}")]
    Task { reason: String },
}

/// Object storage errors
#[derive(Error, Debug)]
pub enum UploadError {
    /// Local artifact does not exist
    #[error("Local file not found: {path}")]
    MissingFile { path: PathBuf },

    /// Transport or service fault
    #[error("Object storage request failed: {message}")]
    Transport { message: String },

    /// Local I/O failed while reading or writing the artifact
    #[error("Object storage file I/O error")]
    Io(#[from] std::io::Error),

    /// No bucket configured
    #[error("No bucket configured. Set [storage] bucket in the configuration file")]
    MissingBucket,
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    /// Configuration file could not be read or written
    #[error("Configuration file I/O error: {path}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP error outside a more specific operation
    #[error(transparent)]
    Http(#[from] HttpError),

    /// Authentication error
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Catalog error
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Output error
    #[error(transparent)]
    Output(#[from] OutputError),

    /// Upload error
    #[error(transparent)]
    Upload(#[from] UploadError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable (transient)
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Http(HttpError::RetriesExhausted { .. })
            | AppError::Http(HttpError::Network(_))
            | AppError::Download(DownloadError::Http(HttpError::RetriesExhausted { .. }))
            | AppError::Download(DownloadError::Http(HttpError::Network(_)))
            | AppError::Download(DownloadError::Stream(_))
            | AppError::Catalog(CatalogError::Http(HttpError::Network(_)))
            | AppError::Auth(AuthError::Http(HttpError::Network(_)))
            | AppError::Upload(UploadError::Transport { .. }) => true,

            AppError::Auth(AuthError::MissingToken)
            | AppError::Auth(AuthError::UnsupportedContentType { .. })
            | AppError::Catalog(CatalogError::NoDevices)
            | AppError::Config(_) => false,

            _ => false,
        }
    }

    /// Whether the error stems from a user- or signal-initiated cancellation
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            AppError::Http(HttpError::Cancelled)
                | AppError::Auth(AuthError::Http(HttpError::Cancelled))
                | AppError::Catalog(CatalogError::Http(HttpError::Cancelled))
                | AppError::Download(DownloadError::Http(HttpError::Cancelled))
        )
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Http(_) => "http",
            AppError::Auth(_) => "authentication",
            AppError::Catalog(_) => "catalog",
            AppError::Download(_) => "download",
            AppError::Output(_) => "output",
            AppError::Upload(_) => "upload",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// HTTP result type alias
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// Authentication result type alias
pub type AuthResult<T> = std::result::Result<T, AuthError>;

/// Catalog result type alias
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Output result type alias
pub type OutputResult<T> = std::result::Result<T, OutputError>;

/// Upload result type alias
pub type UploadResult<T> = std::result::Result<T, UploadError>;
