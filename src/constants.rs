//! Application constants for CMS Fetcher
//!
//! This module centralizes all constants used throughout the application,
//! organized by functional domain for maintainability and clarity.

use std::time::Duration;

/// Environment variable names for authentication
pub mod env {
    /// Pre-encoded Basic credential (base64 of `user:password`)
    pub const API_KEY: &str = "CMS_API_KEY";

    /// Environment variable name for the CMS username
    pub const USERNAME: &str = "CMS_USERNAME";

    /// Environment variable name for the CMS password
    pub const PASSWORD: &str = "CMS_PASSWORD";
}

/// Authentication and credential-related constants
pub mod auth {
    /// Minimum allowed username length
    pub const MIN_USERNAME_LENGTH: usize = 3;

    /// Maximum allowed username length
    pub const MAX_USERNAME_LENGTH: usize = 80;

    /// File permissions for .env file (Unix only) - owner read/write only
    #[cfg(unix)]
    pub const ENV_FILE_PERMISSIONS: u32 = 0o600;

    /// Nested path of the bearer token inside the login envelope
    pub const TOKEN_PATH: [&str; 2] = ["accessToken", "token"];
}

/// Upstream API endpoints, relative to the configured base URL
pub mod api {
    /// Default CMS data service base URL
    pub const DEFAULT_BASE_URL: &str = "https://cms-portal.nordex-online.com/weblog-datasrv";

    /// Login endpoint path segments
    pub const LOGIN_PATH: [&str; 2] = ["auth", "login"];

    /// Device catalog path segment
    pub const SYSTEMS_SEGMENT: &str = "systems";

    /// Raw-file listing path segment (below a device)
    pub const RAWFILES_SEGMENT: &str = "rawfiles";

    /// Device list envelope path
    pub const DEVICE_LIST_PATH: [&str; 2] = ["systemItems", "systemItem"];

    /// Raw-file list envelope path
    pub const RAW_FILE_LIST_PATH: [&str; 2] = ["rawFileItems", "rawFileItem"];

    /// Accept header used for raw-file downloads
    pub const BINARY_ACCEPT: &str = "application/binary";
}

/// HTTP client configuration constants
pub mod http {
    use super::Duration;

    /// Default user agent for all HTTP requests
    pub const USER_AGENT: &str = "CMS-Fetcher/0.1.0 (Condition Monitoring Ingest)";

    /// Default HTTP request timeout
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

    /// Connection establishment timeout
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Connection pool idle timeout
    pub const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(90);

    /// Maximum idle connections per host in pool
    pub const POOL_MAX_PER_HOST: usize = 4;
}

/// Rate limiting and retry configuration
pub mod limits {
    /// Default client-side request ceiling (requests per second)
    pub const DEFAULT_RATE_LIMIT_RPS: u32 = 5;

    /// Wait used when a 429 carries no usable Retry-After header (seconds)
    pub const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

    /// Fixed wait after 503/504 (seconds)
    pub const UNAVAILABLE_DELAY_SECS: u64 = 60;

    /// Default attempt cap for throttled requests
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

    /// Default overall retry deadline per request (seconds)
    pub const DEFAULT_DEADLINE_SECS: u64 = 60 * 60;

    /// Retries for network faults (connection reset, DNS, timeouts)
    pub const NETWORK_RETRIES: u32 = 3;

    /// Base delay for exponential backoff on network faults (milliseconds)
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;

    /// Longest single network backoff (seconds)
    pub const MAX_NETWORK_BACKOFF_SECS: u64 = 300;

    /// Upper bound accepted for `network_retries`
    pub const MAX_NETWORK_RETRIES: u32 = 16;

    /// Longest honoured Retry-After (seconds); larger values are clamped
    pub const MAX_RETRY_AFTER_SECS: u64 = 24 * 60 * 60;
}

/// File operation constants
pub mod files {
    /// Temporary file suffix for atomic operations
    pub const TEMP_FILE_SUFFIX: &str = ".tmp";

    /// Buffer reserved when the response declares no length (8KB)
    pub const DOWNLOAD_CHUNK_SIZE: usize = 8 * 1024;

    /// Most we reserve up front from a declared Content-Length (16MB)
    pub const MAX_PREALLOC_BYTES: u64 = 16 * 1024 * 1024;

    /// Default raw file format requested from the service
    pub const DEFAULT_FILE_FORMAT: &str = "txt";

    /// Component folder used when a descriptor carries no component
    pub const UNKNOWN_COMPONENT: &str = "UnknownComponent";

    /// Suffix of per-turbine processed files
    pub const PER_TURBINE_SUFFIX: &str = "_raw_vibration_data.parquet";

    /// Default combined artifact path
    pub const DEFAULT_OUTPUT_PATH: &str = "data/all_data.parquet";

    /// Default per-turbine output directory
    pub const DEFAULT_PROCESSED_DIR: &str = "data/processed";
}

/// Catalog conventions
pub mod catalog {
    /// Dash-delimited segments stripped from a device name to get its cleaned name
    pub const NAME_PREFIX_SEGMENTS: usize = 3;
}

/// Sectioned raw-file format markers and metadata keys
pub mod sections {
    /// Header substring identifying a metadata section (case-insensitive)
    pub const METADATA_MARKER: &str = "aduchannel";

    /// Header substring identifying a data section (case-insensitive)
    pub const DATA_MARKER: &str = "adudata";

    /// Metadata key for the epoch start of the capture
    pub const START_TIME: &str = "starttime";

    /// Metadata key for the declared number of samples
    pub const SAMPLE_COUNT: &str = "iSampleCnt";

    /// Metadata key for the sample rate in Hz
    pub const SAMPLE_RATE: &str = "iSampleRate";

    /// Metadata key for the measurement unit
    pub const MEASUREMENT_UNIT: &str = "MeasUnit";

    /// Unit of acceleration captures that carry uniformly sampled values
    pub const ACCELERATION_UNIT: &str = "g";

    /// Metadata key for the mounting component
    pub const COMPONENT: &str = "szComponent";

    /// Metadata key for the sensor label
    pub const LABEL: &str = "szLabel";

    /// Prefix of comment lines inside data blocks
    pub const COMMENT_PREFIX: char = '#';
}

/// Worker and concurrency configuration
pub mod workers {
    /// Default number of concurrent file downloads (1 = sequential)
    pub const DEFAULT_CONCURRENCY: usize = 1;

    /// Maximum recommended concurrent downloads
    pub const MAX_CONCURRENCY: usize = 16;
}

/// Object storage defaults
pub mod storage {
    /// Default object key of the combined artifact
    pub const DEFAULT_KEY: &str = "data/all_data.parquet";

    /// Default bucket region
    pub const DEFAULT_REGION: &str = "eu-central-1";
}

// Re-export commonly used constants for convenience
pub use api::DEFAULT_BASE_URL;
pub use env::{API_KEY as ENV_API_KEY, PASSWORD as ENV_PASSWORD, USERNAME as ENV_USERNAME};
pub use files::{DEFAULT_FILE_FORMAT, TEMP_FILE_SUFFIX};
pub use http::{DEFAULT_TIMEOUT as HTTP_TIMEOUT, USER_AGENT};
pub use limits::{DEFAULT_RATE_LIMIT_RPS, RETRY_BASE_DELAY_MS};
pub use workers::DEFAULT_CONCURRENCY;
