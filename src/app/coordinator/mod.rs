//! Ingestion orchestration
//!
//! The coordinator drives one run end to end: authenticate once, list the
//! catalog, apply the device allow-list, then for every retained device list
//! its raw files in the window and fetch and parse each one. Records from all
//! files are merged into one sorted [`IngestionResult`].
//!
//! A file that cannot be fetched is logged, counted and skipped. Cancellation,
//! authentication failures and catalog failures abort the run.
//!
//! # Architecture
//!
//! - [`config`] - Run configuration and validation
//! - [`stats`] - Session counters
//! - [`progress`] - Progress events for interactive consumers
//! - [`signals`] - CTRL-C / SIGTERM to cancellation token
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use cms_fetcher::app::{CmsClient, ClientConfig, Coordinator, CoordinatorConfig, TimeWindow};
//! use cms_fetcher::auth::Credential;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(CmsClient::new(&ClientConfig::default())?);
//! let credential = Credential::from_env()?;
//! let config = CoordinatorConfig::default().with_allowed_devices(["7592"]);
//!
//! let coordinator = Coordinator::new(config, client, credential);
//! let result = coordinator.run(&TimeWindow::last_day()).await?;
//! println!("Retrieved {} records", result.len());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod progress;
pub mod signals;
pub mod stats;

#[cfg(test)]
mod tests;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::client::{CmsClient, SessionToken};
use crate::app::models::{Device, IngestionResult, RawFileDescriptor, TimeWindow, VibrationRecord};
use crate::app::naming;
use crate::app::parser::{self, DeviceContext};
use crate::auth::Credential;
use crate::constants::files;
use crate::errors::{AppError, CatalogError, HttpError, Result};

pub use config::CoordinatorConfig;
pub use progress::{ProgressEvent, ProgressSink};
pub use signals::SignalHandler;
pub use stats::IngestStats;

/// A device retained for ingestion, with its display group
struct SelectedDevice {
    device: Device,
    group: String,
}

/// Main coordinator for ingestion runs
pub struct Coordinator {
    config: CoordinatorConfig,
    client: Arc<CmsClient>,
    credential: Credential,
    cancel: CancellationToken,
    progress: ProgressSink,
    stats: Arc<RwLock<IngestStats>>,
}

impl Coordinator {
    /// Create a new coordinator with the given configuration and client
    pub fn new(config: CoordinatorConfig, client: Arc<CmsClient>, credential: Credential) -> Self {
        Self {
            config,
            client,
            credential,
            cancel: CancellationToken::new(),
            progress: ProgressSink::default(),
            stats: Arc::new(RwLock::new(IngestStats::default())),
        }
    }

    /// Observe `cancel` instead of a private token
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report progress on `tx`
    pub fn with_progress(mut self, tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        self.progress = ProgressSink::new(tx);
        self
    }

    /// Token that cancels this coordinator's runs
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Snapshot of the session counters
    pub async fn stats(&self) -> IngestStats {
        self.stats.read().await.clone()
    }

    /// Run one ingestion over `window`
    ///
    /// # Errors
    ///
    /// Returns `AppError` if:
    /// - The configuration is invalid
    /// - Authentication fails
    /// - A catalog listing fails (other than an empty catalog)
    /// - The run is cancelled
    pub async fn run(&self, window: &TimeWindow) -> Result<IngestionResult> {
        self.config.validate().map_err(AppError::generic)?;
        *self.stats.write().await = IngestStats::default();
        info!("Starting ingestion for {}", window);

        let token = self.client.authenticate(&self.credential, &self.cancel).await?;

        let devices = match self.client.list_devices(&token, &self.cancel).await {
            Ok(devices) => devices,
            Err(CatalogError::NoDevices) => {
                warn!("Catalog lists no devices, nothing to ingest");
                self.finish(0).await;
                return Ok(IngestionResult::default());
            }
            Err(e) => return Err(e.into()),
        };

        let selected = self.select_devices(devices).await;
        self.progress.emit(ProgressEvent::DevicesSelected {
            count: selected.len(),
        });

        let mut records = Vec::new();
        for selected in &selected {
            self.ensure_not_cancelled()?;
            records.extend(self.ingest_device(&token, selected, window).await?);
        }

        let result = IngestionResult::from_records(records);
        self.finish(result.len()).await;
        Ok(result)
    }

    /// Log the catalog grouped by cleaned name and apply the allow-list
    async fn select_devices(&self, devices: Vec<Device>) -> Vec<SelectedDevice> {
        let mut groups: BTreeMap<String, Vec<Device>> = BTreeMap::new();
        for device in devices {
            let group = device.cleaned_name(self.config.name_prefix_segments);
            groups.entry(group).or_default().push(device);
        }

        let listed: usize = groups.values().map(Vec::len).sum();
        for (group, members) in &groups {
            let ids: Vec<String> = members
                .iter()
                .map(|d| format!("{} ({})", d.id, d.identity))
                .collect();
            info!("Device group {}: {}", group, ids.join(", "));
        }

        let selected: Vec<SelectedDevice> = groups
            .into_iter()
            .flat_map(|(group, members)| {
                members.into_iter().map(move |device| SelectedDevice {
                    device,
                    group: group.clone(),
                })
            })
            .filter(|selected| self.config.allows(&selected.device.id))
            .collect();

        if let Some(allowed) = &self.config.allowed_device_ids {
            for id in allowed {
                if !selected.iter().any(|s| &s.device.id == id) {
                    warn!("Allowed device {} is not in the catalog", id);
                }
            }
        }

        info!("Selected {} of {} devices", selected.len(), listed);
        let mut stats = self.stats.write().await;
        stats.devices_listed = listed;
        stats.devices_selected = selected.len();
        selected
    }

    /// List, fetch and parse every file of one device
    async fn ingest_device(
        &self,
        token: &SessionToken,
        selected: &SelectedDevice,
        window: &TimeWindow,
    ) -> Result<Vec<VibrationRecord>> {
        let device = &selected.device;
        info!(
            "Processing device ID: {} - Device Name: {}",
            device.id, device.identity
        );

        let descriptors = self
            .client
            .list_files(token, device, window, &self.cancel)
            .await?;
        self.stats.write().await.files_listed += descriptors.len();
        self.progress.emit(ProgressEvent::FilesListed {
            device: device.identity.clone(),
            count: descriptors.len(),
        });

        if descriptors.is_empty() {
            info!("No raw files for device {} in {}", device.id, window);
            return Ok(Vec::new());
        }

        let concurrency = self.config.concurrency.max(1);
        let mut outcomes = stream::iter(descriptors.iter())
            .map(|descriptor| self.ingest_file(token, selected, descriptor))
            .buffer_unordered(concurrency);

        let mut records = Vec::new();
        while let Some(outcome) = outcomes.next().await {
            records.extend(outcome?);
        }
        Ok(records)
    }

    /// Fetch and parse one file; fetch failures other than cancellation yield no records
    async fn ingest_file(
        &self,
        token: &SessionToken,
        selected: &SelectedDevice,
        descriptor: &RawFileDescriptor,
    ) -> Result<Vec<VibrationRecord>> {
        let device = &selected.device;
        let format = &self.config.file_format;
        let Some(name) = naming::resolve_name(device, descriptor, format) else {
            warn!(
                "Skipping raw file of device {}: capture time {} is out of range",
                device.id, descriptor.unix_time
            );
            self.stats.write().await.files_failed += 1;
            self.progress.emit(ProgressEvent::FileFailed {
                name: format!("{}@{}", device.identity, descriptor.unix_time),
            });
            return Ok(Vec::new());
        };
        let component = descriptor
            .component()
            .unwrap_or_else(|| files::UNKNOWN_COMPONENT.to_string());

        let locator = self.client.locator(device, descriptor, format)?;
        let archive = self.archive_path(device, &component, &name);

        let bytes = match self
            .client
            .fetch(token, &locator, archive.as_deref(), &self.cancel)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) if e.is_cancelled() => return Err(e.into()),
            Err(e) => {
                warn!("Skipping {}: {}", name, e);
                self.stats.write().await.files_failed += 1;
                self.progress.emit(ProgressEvent::FileFailed { name });
                return Ok(Vec::new());
            }
        };

        let context = DeviceContext::new(device.identity.clone(), component)
            .with_group(selected.group.clone())
            .with_sensor(descriptor.channel.clone());
        let report = parser::parse_with_report(&bytes, &context);
        if report.records.is_empty() {
            warn!("No parseable data in {}", name);
        }

        self.stats.write().await.record_parse(&report);
        self.progress.emit(ProgressEvent::FileProcessed {
            name,
            records: report.records.len(),
        });
        Ok(report.records)
    }

    fn archive_path(&self, device: &Device, component: &str, name: &str) -> Option<PathBuf> {
        self.config
            .raw_dir
            .as_ref()
            .map(|dir| {
                dir.join(naming::path_segment(&device.identity))
                    .join(naming::path_segment(component))
                    .join(naming::path_segment(name))
            })
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(HttpError::Cancelled.into());
        }
        Ok(())
    }

    async fn finish(&self, records: usize) {
        let mut stats = self.stats.write().await;
        stats.records = records;
        stats.update_duration();
        info!("Ingestion finished: {}", stats.summary());
    }
}
