//! Ingestion session statistics

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::app::parser::ParseReport;

/// Counters for one ingestion run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestStats {
    /// Devices returned by the catalog
    pub devices_listed: usize,
    /// Devices that passed the allow-list
    pub devices_selected: usize,
    /// Raw files listed across selected devices
    pub files_listed: usize,
    /// Raw files fetched and parsed
    pub files_fetched: usize,
    /// Raw files that could not be fetched
    pub files_failed: usize,
    /// Data blocks turned into records
    pub blocks_decoded: usize,
    /// Data blocks dropped as uninterpretable
    pub blocks_dropped: usize,
    /// Data lines skipped as malformed
    pub lines_skipped: usize,
    /// Records in the final result
    pub records: usize,
    /// Start time of the session
    pub session_start: DateTime<Utc>,
    /// Session duration so far
    pub session_duration: Duration,
}

impl Default for IngestStats {
    fn default() -> Self {
        Self {
            devices_listed: 0,
            devices_selected: 0,
            files_listed: 0,
            files_fetched: 0,
            files_failed: 0,
            blocks_decoded: 0,
            blocks_dropped: 0,
            lines_skipped: 0,
            records: 0,
            session_start: Utc::now(),
            session_duration: Duration::ZERO,
        }
    }
}

impl IngestStats {
    /// Fold one file's parse report into the counters
    pub fn record_parse(&mut self, report: &ParseReport) {
        self.files_fetched += 1;
        self.blocks_decoded += report.blocks_decoded;
        self.blocks_dropped += report.blocks_dropped;
        self.lines_skipped += report.lines_skipped;
    }

    /// Files processed so far (fetched or failed)
    pub fn files_processed(&self) -> usize {
        self.files_fetched + self.files_failed
    }

    /// Update session duration from start time
    pub fn update_duration(&mut self) {
        self.session_duration = Utc::now()
            .signed_duration_since(self.session_start)
            .to_std()
            .unwrap_or(Duration::ZERO);
    }

    /// One-line summary for logs and the CLI
    pub fn summary(&self) -> String {
        let mut summary = format!(
            "{} records from {}/{} files across {} of {} devices in {}",
            self.records,
            self.files_fetched,
            self.files_listed,
            self.devices_selected,
            self.devices_listed,
            format_duration(self.session_duration)
        );
        if self.files_failed > 0 {
            summary.push_str(&format!(", {} files failed", self.files_failed));
        }
        if self.blocks_dropped > 0 {
            summary.push_str(&format!(", {} blocks dropped", self.blocks_dropped));
        }
        summary
    }
}

/// Format a duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();

    if total_secs < 60 {
        format!("{}s", total_secs)
    } else if total_secs < 3600 {
        format!("{}m{}s", total_secs / 60, total_secs % 60)
    } else {
        format!("{}h{}m", total_secs / 3600, (total_secs % 3600) / 60)
    }
}
