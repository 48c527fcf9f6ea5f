//! Offline extraction from an archived raw tree
//!
//! Walks `{raw_dir}/{turbine}/{component}/*.{format}` as written by the
//! raw-file archive and parses every capture without touching the network.
//! Turbine and component come from the directory layout; the sensor channel
//! is recovered from the resolved file name when it parses.

use std::path::{Path, PathBuf};

use crate::app::coordinator::IngestStats;
use crate::app::models::IngestionResult;
use crate::app::naming::parse_resolved_name;
use crate::app::parser::{self, DeviceContext};
use crate::errors::Result;

/// Sorted subdirectories of `dir`
async fn subdirectories(dir: &Path) -> std::io::Result<Vec<(String, PathBuf)>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push((entry.file_name().to_string_lossy().into_owned(), entry.path()));
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Sorted files of `dir` with the given extension
async fn captures(dir: &Path, format: &str) -> std::io::Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let matches = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case(format));
        if matches && entry.file_type().await?.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Parse every capture below `raw_dir`
///
/// # Errors
///
/// Returns an I/O error if `raw_dir` or one of its subdirectories cannot be
/// listed. Unreadable individual files are skipped and counted as failed.
pub async fn extract_tree(raw_dir: &Path, format: &str) -> Result<(IngestionResult, IngestStats)> {
    let mut stats = IngestStats::default();
    let mut records = Vec::new();

    let turbines = subdirectories(raw_dir).await?;
    stats.devices_listed = turbines.len();
    stats.devices_selected = turbines.len();

    for (turbine, turbine_dir) in turbines {
        for (component, component_dir) in subdirectories(&turbine_dir).await? {
            let files = captures(&component_dir, format).await?;
            stats.files_listed += files.len();

            for path in files {
                let bytes = match tokio::fs::read(&path).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        tracing::warn!("Skipping unreadable {}: {}", path.display(), e);
                        stats.files_failed += 1;
                        continue;
                    }
                };

                let mut context = DeviceContext::new(turbine.clone(), component.clone());
                let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
                match name.as_deref().and_then(parse_resolved_name) {
                    Some(parsed) => context = context.with_sensor(parsed.channel),
                    None => tracing::debug!(
                        "File name {} does not follow the naming scheme",
                        path.display()
                    ),
                }

                let report = parser::parse_with_report(&bytes, &context);
                stats.record_parse(&report);
                records.extend(report.records);
            }
        }
    }

    let result = IngestionResult::from_records(records);
    stats.records = result.len();
    stats.update_duration();
    tracing::info!("Extraction finished: {}", stats.summary());
    Ok((result, stats))
}
