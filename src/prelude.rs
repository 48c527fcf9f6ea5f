//! Prelude module for CMS Fetcher Library
//!
//! Re-exports the items needed for a typical ingestion with a single
//! `use cms_fetcher::prelude::*;` statement.
//!
//! # Usage
//!
//! ```rust,no_run
//! use cms_fetcher::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let client = Arc::new(CmsClient::new(&ClientConfig::default())?);
//!     let coordinator = Coordinator::new(
//!         CoordinatorConfig::default(),
//!         client,
//!         Credential::from_env()?,
//!     );
//!
//!     let result = coordinator.run(&TimeWindow::last_day()).await?;
//!     println!("{} records", result.len());
//!     Ok(())
//! }
//! ```

// Core result types
pub use crate::errors::{AppError, Result};

pub use crate::app::{
    ClientConfig,
    CmsClient,
    // Core orchestration
    Coordinator,
    CoordinatorConfig,
    // Data types
    Device,
    DeviceContext,
    IngestStats,
    IngestionResult,
    // Persistence
    ParquetWriter,
    RawFileDescriptor,
    RetryPolicy,
    StorageConfig,
    TimeWindow,
    VibrationRecord,
};

// Authentication
pub use crate::auth::{check_credentials, get_auth_status, AuthStatus, Credential};

// Configuration
pub use crate::config::{AppConfig, RuntimeConfig};

// Commonly used constants
pub use crate::constants::{
    DEFAULT_CONCURRENCY, DEFAULT_RATE_LIMIT_RPS, ENV_API_KEY, ENV_PASSWORD, ENV_USERNAME,
    USER_AGENT,
};

pub use std::path::{Path, PathBuf};
pub use std::sync::Arc;

pub use tokio;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_imports() {
        let _coordinator_config = CoordinatorConfig::default();
        let _client_config = ClientConfig::default();
        let _app_config = AppConfig::default();

        let _has_creds = check_credentials();
        let _auth_status = get_auth_status();

        assert_eq!(DEFAULT_CONCURRENCY, 1);
        assert!(USER_AGENT.contains("CMS-Fetcher"));
    }

    #[test]
    fn test_prelude_pipeline_types() {
        let client = Arc::new(CmsClient::new(&ClientConfig::default()).unwrap());
        let coordinator = Coordinator::new(
            CoordinatorConfig::default(),
            client,
            Credential::from_api_key("dXNlcjpwYXNz"),
        );
        assert!(!coordinator.cancellation_token().is_cancelled());

        let records = parse_fixture();
        assert_eq!(IngestionResult::from_records(records).len(), 1);
    }

    fn parse_fixture() -> Vec<VibrationRecord> {
        let raw = b"[ADUChannel:0]\nMeasUnit=g\nstarttime=0\niSampleRate=1\n[ADUData:0]\n0.5\n";
        crate::app::parse(raw, &DeviceContext::new("T1", "MainBearing"))
    }
}
