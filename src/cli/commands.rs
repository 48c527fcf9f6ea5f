//! Command handlers for CMS Fetcher CLI
//!
//! This module implements the command handlers that connect CLI arguments
//! and the loaded configuration with the core application functionality.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::{
    extract_tree, naming, BucketStore, CmsClient, Coordinator, Device, IngestionResult,
    ParquetWriter, SessionToken, SignalHandler,
};
use crate::auth::{setup_credentials, show_auth_status, verify_credentials, Credential};
use crate::cli::{
    AuthAction, AuthArgs, BucketAction, BucketArgs, ConfigAction, ConfigArgs, ExtractArgs,
    FilesArgs, IngestArgs, ProgressDisplay,
};
use crate::config::{AppConfig, OutputSettings, RuntimeConfig};
use crate::errors::{AppError, CatalogError, ConfigError, Result};

/// Loaded configuration shared by all handlers
#[derive(Debug, Clone)]
pub struct CommandContext {
    /// Configuration as read from the file (or defaults)
    pub config: AppConfig,
    /// File the configuration was read from
    pub source: Option<PathBuf>,
    /// Validated runtime view of `config`
    pub runtime: RuntimeConfig,
    /// Suppress progress display
    pub quiet: bool,
}

impl CommandContext {
    /// Validate `config` and build the runtime view
    pub fn new(config: AppConfig, source: Option<PathBuf>, quiet: bool) -> Result<Self> {
        let runtime = config.to_runtime_config()?;
        Ok(Self {
            config,
            source,
            runtime,
            quiet,
        })
    }

    fn client(&self) -> Result<CmsClient> {
        Ok(CmsClient::new(&self.runtime.client)?)
    }
}

/// Authenticate with credentials from the environment
async fn login(client: &CmsClient, cancel: &CancellationToken) -> Result<SessionToken> {
    let credential = Credential::from_env()?;
    Ok(client.authenticate(&credential, cancel).await?)
}

/// Write `result` to the configured Parquet destinations
async fn persist(result: &IngestionResult, output: &OutputSettings) -> Result<()> {
    let mut writer = ParquetWriter::new().with_output_path(&output.output_path);
    if let Some(dir) = &output.processed_dir {
        writer = writer.with_processed_dir(dir);
    }

    let artifacts = writer.write(result).await?;
    if let Some(path) = &artifacts.combined {
        println!("Saved {} records to {}", result.len(), path.display());
    }
    if !artifacts.per_turbine.is_empty() {
        println!(
            "Saved {} per-turbine files to {}",
            artifacts.per_turbine.len(),
            output
                .processed_dir
                .as_deref()
                .unwrap_or_else(|| Path::new("."))
                .display()
        );
    }
    Ok(())
}

/// Handle the ingest command
///
/// Runs the coordinator over the requested window, writes the Parquet
/// artifacts and optionally uploads the combined file.
pub async fn handle_ingest(args: IngestArgs, ctx: &CommandContext) -> Result<()> {
    let window = args.window.window()?;

    let mut coordinator_config = ctx.runtime.coordinator.clone();
    if !args.devices.is_empty() {
        coordinator_config = coordinator_config.with_allowed_devices(args.devices.clone());
    }
    if let Some(concurrency) = args.concurrency {
        coordinator_config = coordinator_config.with_concurrency(concurrency);
    }
    if let Some(raw_dir) = &args.raw_dir {
        coordinator_config = coordinator_config.with_raw_dir(raw_dir);
    }
    coordinator_config.validate().map_err(|reason| ConfigError::InvalidValue {
        field: "concurrency".to_string(),
        value: coordinator_config.concurrency.to_string(),
        reason,
    })?;

    let mut output = ctx.runtime.output.clone();
    if let Some(path) = &args.output {
        output.output_path = path.clone();
    }
    if let Some(dir) = &args.processed_dir {
        output.processed_dir = Some(dir.clone());
    }

    // Fail before any network traffic when the upload could never succeed
    let bucket = if args.upload {
        Some(BucketStore::new(&ctx.runtime.storage).await?)
    } else {
        None
    };

    let credential = Credential::from_env()?;
    let client = Arc::new(ctx.client()?);

    let cancel = CancellationToken::new();
    let signal_task = SignalHandler::new(cancel.clone()).setup();

    let (tx, rx) = mpsc::unbounded_channel();
    let display = ProgressDisplay::new(!ctx.quiet).spawn(rx);

    info!("Ingesting {} from {}", window, client.base_url());
    let coordinator = Coordinator::new(coordinator_config, client, credential)
        .with_cancellation(cancel.clone())
        .with_progress(tx);
    let outcome = coordinator.run(&window).await;
    let stats = coordinator.stats().await;
    drop(coordinator);

    let tally = display.await.unwrap_or_default();
    signal_task.abort();

    let result = match outcome {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => {
            warn!("Ingestion cancelled after {} files", tally.files_processed);
            return Err(e);
        }
        Err(e) => return Err(e),
    };

    if !ctx.quiet {
        println!("{}", stats.summary());
    }

    if result.is_empty() {
        println!("No data retrieved");
        return Ok(());
    }

    persist(&result, &output).await?;

    if let Some(bucket) = bucket {
        let key = args.key.as_deref().unwrap_or(&ctx.runtime.storage.key);
        let url = bucket.upload(&output.output_path, key).await?;
        println!("File successfully uploaded to {}", url);
    }

    Ok(())
}

/// Handle the devices command
pub async fn handle_devices(ctx: &CommandContext) -> Result<()> {
    let client = ctx.client()?;
    let cancel = CancellationToken::new();
    let token = login(&client, &cancel).await?;

    let devices = match client.list_devices(&token, &cancel).await {
        Ok(devices) => devices,
        Err(CatalogError::NoDevices) => {
            println!("The catalog lists no devices");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let segments = ctx.runtime.coordinator.name_prefix_segments;
    let mut groups: BTreeMap<String, Vec<&Device>> = BTreeMap::new();
    for device in &devices {
        groups.entry(device.cleaned_name(segments)).or_default().push(device);
    }

    println!("{} devices in {} groups", devices.len(), groups.len());
    for (group, members) in &groups {
        println!();
        println!("{}", group);
        for device in members {
            let allowed = if ctx.runtime.coordinator.allows(&device.id) {
                ""
            } else {
                "  (not in allow-list)"
            };
            println!("  {:>8}  {}{}", device.id, device.identity, allowed);
        }
    }
    Ok(())
}

/// Handle the files command
pub async fn handle_files(args: FilesArgs, ctx: &CommandContext) -> Result<()> {
    let window = args.window.window()?;
    let client = ctx.client()?;
    let cancel = CancellationToken::new();
    let token = login(&client, &cancel).await?;

    let devices = client.list_devices(&token, &cancel).await?;
    let device = devices
        .into_iter()
        .find(|d| d.id == args.device)
        .ok_or_else(|| AppError::generic(format!("Device {} is not in the catalog", args.device)))?;

    let descriptors = client.list_files(&token, &device, &window, &cancel).await?;
    println!(
        "{} ({}): {} raw files in {}",
        device.identity,
        device.id,
        descriptors.len(),
        window
    );

    let format = &ctx.runtime.coordinator.file_format;
    for descriptor in &descriptors {
        let when = descriptor
            .timestamp()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "invalid time".to_string());
        println!(
            "  {}  {}  {}",
            when,
            descriptor
                .component()
                .unwrap_or_else(|| crate::constants::files::UNKNOWN_COMPONENT.to_string()),
            naming::resolve_name(&device, descriptor, format)
                .unwrap_or_else(|| "<unnameable>".to_string())
        );
    }
    Ok(())
}

/// Handle the extract command
pub async fn handle_extract(args: ExtractArgs, ctx: &CommandContext) -> Result<()> {
    let format = &ctx.runtime.coordinator.file_format;
    let (result, stats) = extract_tree(&args.raw_dir, format).await?;

    if !ctx.quiet {
        println!("{}", stats.summary());
    }
    if result.is_empty() {
        println!("No vibration data found.");
        return Ok(());
    }

    let mut output = ctx.runtime.output.clone();
    if let Some(path) = args.output {
        output.output_path = path;
    }
    if let Some(dir) = args.processed_dir {
        output.processed_dir = Some(dir);
    }
    persist(&result, &output).await
}

/// Handle object storage commands
pub async fn handle_bucket(args: BucketArgs, ctx: &CommandContext) -> Result<()> {
    let store = BucketStore::new(&ctx.runtime.storage).await?;

    match args.action {
        BucketAction::Upload { path, key } => {
            let key = key.as_deref().unwrap_or(&ctx.runtime.storage.key);
            let url = store.upload(&path, key).await?;
            println!("File successfully uploaded to {}", url);
        }
        BucketAction::Download { key, path } => {
            let path = store.download(&key, &path).await?;
            println!("Downloaded {} to {}", store.object_url(&key), path.display());
        }
    }
    Ok(())
}

/// Handle authentication commands
pub async fn handle_auth(args: AuthArgs, ctx: &CommandContext) -> Result<()> {
    let client = &ctx.runtime.client;
    match args.action {
        AuthAction::Setup => setup_credentials(client).await?,
        AuthAction::Verify => {
            if !verify_credentials(client).await? {
                return Err(AppError::generic("Credentials were rejected by the service"));
            }
        }
        AuthAction::Status => show_auth_status(client).await?,
    }
    Ok(())
}

/// Handle configuration commands
///
/// `config init` does not need a valid configuration, so it takes none.
pub async fn handle_config(args: ConfigArgs, ctx: Option<&CommandContext>) -> Result<()> {
    match args.action {
        ConfigAction::Init { path, force } => {
            let path = path
                .or_else(AppConfig::default_config_path)
                .ok_or_else(|| AppError::generic("Could not determine user config directory"))?;
            AppConfig::write_default(&path, force).await?;
            println!("Created configuration file:");
            println!("   {}", path.display());
            println!("   You can customize settings by editing this file.");
        }
        ConfigAction::Show => {
            let ctx = ctx.ok_or_else(|| AppError::generic("No configuration loaded"))?;
            match &ctx.source {
                Some(path) => println!("# Loaded from {}", path.display()),
                None => {
                    println!("# No configuration file found; built-in defaults");
                    for path in AppConfig::search_paths() {
                        println!("#   searched {}", path.display());
                    }
                }
            }
            println!("{}", ctx.config.to_toml()?);
        }
    }
    Ok(())
}
