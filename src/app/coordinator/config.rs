//! Configuration structures for the ingestion coordinator

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::constants::{catalog, files, workers};

/// Configuration for an ingestion run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Device ids to ingest; `None` means every device in the catalog
    pub allowed_device_ids: Option<Vec<String>>,
    /// Files fetched and parsed concurrently (1 = strictly sequential)
    pub concurrency: usize,
    /// Raw file format requested from the service
    pub file_format: String,
    /// Dash segments stripped from device names when grouping
    pub name_prefix_segments: usize,
    /// Where to archive fetched raw files, if anywhere
    pub raw_dir: Option<PathBuf>,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            allowed_device_ids: None,
            concurrency: workers::DEFAULT_CONCURRENCY,
            file_format: files::DEFAULT_FILE_FORMAT.to_string(),
            name_prefix_segments: catalog::NAME_PREFIX_SEGMENTS,
            raw_dir: None,
        }
    }
}

impl CoordinatorConfig {
    /// Restrict the run to the given device ids
    pub fn with_allowed_devices<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_device_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    /// Set the number of files processed concurrently
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    /// Archive raw files below `dir`
    pub fn with_raw_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.raw_dir = Some(dir.into());
        self
    }

    /// Whether `device_id` passes the allow-list
    pub fn allows(&self, device_id: &str) -> bool {
        self.allowed_device_ids
            .as_ref()
            .map_or(true, |ids| ids.iter().any(|id| id == device_id))
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.concurrency == 0 {
            return Err("Concurrency must be at least 1".to_string());
        }

        if self.concurrency > workers::MAX_CONCURRENCY {
            return Err(format!(
                "Concurrency cannot exceed {}",
                workers::MAX_CONCURRENCY
            ));
        }

        if self.file_format.trim().is_empty() || self.file_format.contains('/') {
            return Err(format!("Invalid file format '{}'", self.file_format));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoordinatorConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.concurrency, 1);
        assert!(config.allows("anything"));
    }

    #[test]
    fn test_allow_list() {
        let config = CoordinatorConfig::default().with_allowed_devices(["7592"]);
        assert!(config.allows("7592"));
        assert!(!config.allows("3985"));

        // An explicit empty list selects nothing
        let none = CoordinatorConfig::default().with_allowed_devices(Vec::<String>::new());
        assert!(!none.allows("7592"));
    }

    #[test]
    fn test_invalid_configs() {
        assert!(CoordinatorConfig::default()
            .with_concurrency(0)
            .validate()
            .is_err());
        assert!(CoordinatorConfig::default()
            .with_concurrency(workers::MAX_CONCURRENCY + 1)
            .validate()
            .is_err());

        let config = CoordinatorConfig {
            file_format: "../x".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
