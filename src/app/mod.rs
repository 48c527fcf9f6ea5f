//! Core application logic for CMS Fetcher
//!
//! This module contains the HTTP client for the condition-monitoring
//! service, the raw-file parser, the ingestion coordinator and the
//! persistence targets (Parquet files and object storage).
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cms_fetcher::app::{
//!     CmsClient, ClientConfig, Coordinator, CoordinatorConfig, ParquetWriter, TimeWindow,
//! };
//! use cms_fetcher::auth::Credential;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(CmsClient::new(&ClientConfig::default())?);
//! let coordinator = Coordinator::new(
//!     CoordinatorConfig::default(),
//!     client,
//!     Credential::from_env()?,
//! );
//!
//! let result = coordinator.run(&TimeWindow::last_day()).await?;
//! if !result.is_empty() {
//!     ParquetWriter::new()
//!         .with_output_path("data/all_data.parquet")
//!         .write(&result)
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod bucket;
pub mod client;
pub mod coordinator;
pub mod extract;
pub mod models;
pub mod naming;
pub mod output;
pub mod parser;

// Re-export main public API
pub use bucket::{BucketStore, StorageConfig};
pub use client::{ClientConfig, CmsClient, RetryPolicy, SessionToken};
pub use coordinator::{
    Coordinator, CoordinatorConfig, IngestStats, ProgressEvent, SignalHandler,
};
pub use extract::extract_tree;
pub use models::{Device, IngestionResult, RawFileDescriptor, TimeWindow, VibrationRecord};
pub use output::{ParquetWriter, WrittenArtifacts};
pub use parser::{parse, parse_with_report, DeviceContext, ParseReport};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_module_structure() {
        // Ensure public API is accessible
        let config = ClientConfig::default();
        assert!(config.rate_limit_rps > 0);
        assert_eq!(CoordinatorConfig::default().concurrency, 1);
    }
}
