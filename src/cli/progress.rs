//! Progress display for ingestion runs
//!
//! Consumes the coordinator's [`ProgressEvent`]s and drives an indicatif bar.
//! The bar's length grows as device listings arrive, so it is accurate once
//! every selected device has been listed. Outside a terminal, or in quiet
//! mode, the bar is hidden but the tally is still kept.

use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::app::coordinator::ProgressEvent;

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files {msg}";

/// What the display saw over a run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressTally {
    pub devices: usize,
    pub files_listed: usize,
    pub files_processed: usize,
    pub files_failed: usize,
    pub records: usize,
}

impl ProgressTally {
    fn apply(&mut self, event: &ProgressEvent) {
        match event {
            ProgressEvent::DevicesSelected { count } => self.devices = *count,
            ProgressEvent::FilesListed { count, .. } => self.files_listed += count,
            ProgressEvent::FileProcessed { records, .. } => {
                self.files_processed += 1;
                self.records += records;
            }
            ProgressEvent::FileFailed { .. } => self.files_failed += 1,
        }
    }

    fn message(&self) -> String {
        if self.files_failed > 0 {
            format!("{} records, {} failed", self.records, self.files_failed)
        } else {
            format!("{} records", self.records)
        }
    }
}

/// Progress bar fed from a coordinator channel
pub struct ProgressDisplay {
    bar: ProgressBar,
}

impl ProgressDisplay {
    /// Create a display; `enabled = false` hides the bar
    pub fn new(enabled: bool) -> Self {
        let bar = if enabled && std::io::stderr().is_terminal() {
            let bar = ProgressBar::new(0);
            match ProgressStyle::default_bar().template(BAR_TEMPLATE) {
                Ok(style) => bar.set_style(style.progress_chars("##-")),
                Err(e) => debug!("Progress bar template error: {}", e),
            }
            bar.enable_steady_tick(Duration::from_millis(120));
            bar
        } else {
            ProgressBar::hidden()
        };
        Self { bar }
    }

    /// Consume events until the sender side is dropped
    pub fn spawn(self, mut rx: mpsc::UnboundedReceiver<ProgressEvent>) -> JoinHandle<ProgressTally> {
        tokio::spawn(async move {
            let mut tally = ProgressTally::default();
            while let Some(event) = rx.recv().await {
                tally.apply(&event);
                match &event {
                    ProgressEvent::FilesListed { device, count } => {
                        self.bar.inc_length(*count as u64);
                        debug!("{}: {} files", device, count);
                    }
                    ProgressEvent::FileProcessed { .. } | ProgressEvent::FileFailed { .. } => {
                        self.bar.inc(1);
                    }
                    ProgressEvent::DevicesSelected { .. } => {}
                }
                self.bar.set_message(tally.message());
            }
            self.bar.finish_and_clear();
            debug!("Progress event channel closed");
            tally
        })
    }
}
