//! Progress events emitted while a run advances
//!
//! Consumers (the CLI progress bar) receive these over an unbounded channel.
//! Sending never blocks the run and a dropped receiver is ignored.

use tokio::sync::mpsc;

/// A step of an ingestion run
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Devices retained after the allow-list
    DevicesSelected { count: usize },
    /// Raw files listed for one device
    FilesListed { device: String, count: usize },
    /// One file fetched and parsed
    FileProcessed { name: String, records: usize },
    /// One file could not be fetched
    FileFailed { name: String },
}

/// Optional sender that swallows send errors
#[derive(Debug, Clone, Default)]
pub struct ProgressSink {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
}

impl ProgressSink {
    pub fn new(tx: mpsc::UnboundedSender<ProgressEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// Emit an event if anyone is listening
    pub fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
