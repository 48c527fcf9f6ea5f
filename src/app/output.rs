//! Columnar persistence of ingestion results
//!
//! Records are staged in an in-memory DuckDB table and exported with
//! `COPY ... (FORMAT PARQUET)`: once as the combined artifact and once per
//! turbine as `{turbine}_raw_vibration_data.parquet`.

use std::path::{Path, PathBuf};

use duckdb::{params, Connection};

use crate::app::models::{IngestionResult, VibrationRecord};
use crate::app::naming;
use crate::constants::files;
use crate::errors::{OutputError, OutputResult};

const CREATE_TABLE: &str = "CREATE TABLE records(
    timestamp TIMESTAMP,
    value DOUBLE,
    component VARCHAR,
    turbine VARCHAR,
    group_name VARCHAR,
    frequency DOUBLE,
    sensor VARCHAR
)";

const INSERT_RECORD: &str =
    "INSERT INTO records VALUES (CAST(? AS TIMESTAMP), ?, ?, ?, ?, ?, ?)";

const ORDERING: &str = "ORDER BY turbine, component, sensor, timestamp";

/// Paths written by one export
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WrittenArtifacts {
    /// Combined file, if one was requested
    pub combined: Option<PathBuf>,
    /// One file per turbine
    pub per_turbine: Vec<PathBuf>,
}

/// Writes ingestion results as Parquet
#[derive(Debug, Clone, Default)]
pub struct ParquetWriter {
    output_path: Option<PathBuf>,
    processed_dir: Option<PathBuf>,
}

impl ParquetWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write every record to `path`
    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    /// Write one file per turbine below `dir`
    pub fn with_processed_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.processed_dir = Some(dir.into());
        self
    }

    /// Per-turbine file for `turbine` below `dir`
    pub fn turbine_path(dir: &Path, turbine: &str) -> PathBuf {
        dir.join(format!(
            "{}{}",
            naming::path_segment(turbine),
            files::PER_TURBINE_SUFFIX
        ))
    }

    /// Export `result` to the configured destinations
    ///
    /// # Errors
    ///
    /// Returns `OutputError` if a directory cannot be created or DuckDB fails
    pub async fn write(&self, result: &IngestionResult) -> OutputResult<WrittenArtifacts> {
        if let Some(parent) = self.output_path.as_deref().and_then(Path::parent) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        if let Some(dir) = &self.processed_dir {
            tokio::fs::create_dir_all(dir).await?;
        }

        let records = result.records().to_vec();
        let turbines: Vec<String> = result.by_turbine().keys().map(|t| t.to_string()).collect();
        let output_path = self.output_path.clone();
        let processed_dir = self.processed_dir.clone();

        let artifacts = tokio::task::spawn_blocking(move || -> OutputResult<WrittenArtifacts> {
            let conn = stage(&records)?;
            let mut artifacts = WrittenArtifacts::default();

            if let Some(path) = output_path {
                copy_to(&conn, &format!("SELECT * FROM records {ORDERING}"), &path)?;
                artifacts.combined = Some(path);
            }

            if let Some(dir) = processed_dir {
                for turbine in &turbines {
                    let path = Self::turbine_path(&dir, turbine);
                    let query = format!(
                        "SELECT * FROM records WHERE turbine = '{}' {ORDERING}",
                        escape_single_quotes(turbine)
                    );
                    copy_to(&conn, &query, &path)?;
                    artifacts.per_turbine.push(path);
                }
            }
            Ok(artifacts)
        })
        .await
        .map_err(|e| OutputError::Task {
            reason: e.to_string(),
        })??;

        if let Some(path) = &artifacts.combined {
            tracing::info!("Saved {} records to {}", result.len(), path.display());
        }
        for path in &artifacts.per_turbine {
            tracing::info!("Saved processed turbine data to {}", path.display());
        }
        Ok(artifacts)
    }
}

/// Load records into a fresh in-memory table
fn stage(records: &[VibrationRecord]) -> OutputResult<Connection> {
    let conn = Connection::open_in_memory()?;
    let _ = conn.execute("PRAGMA enable_progress_bar=false", []);
    conn.execute(CREATE_TABLE, [])?;

    conn.execute_batch("BEGIN TRANSACTION")?;
    {
        let mut stmt = conn.prepare(INSERT_RECORD)?;
        for record in records {
            stmt.execute(params![
                record.timestamp.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
                record.value,
                record.component,
                record.turbine,
                record.group,
                record.frequency,
                record.sensor,
            ])?;
        }
    }
    conn.execute_batch("COMMIT")?;
    Ok(conn)
}

fn copy_to(conn: &Connection, query: &str, path: &Path) -> OutputResult<()> {
    conn.execute(
        &format!(
            "COPY ({}) TO '{}' (FORMAT PARQUET)",
            query,
            escape_single_quotes(&path.display().to_string())
        ),
        [],
    )?;
    Ok(())
}

fn escape_single_quotes(input: &str) -> String {
    input.replace('\'', "''")
}
