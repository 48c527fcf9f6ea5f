//! Sectioned raw-file parser
//!
//! Raw captures are plain text made of bracketed section headers
//! (`[ADUChannel:0]`, `[ADUData:0]`, ...) followed by their bodies. A
//! metadata section (`key=value` lines) describes the data section(s) that
//! follow it; each data section is decoded into [`VibrationRecord`]s.
//!
//! Parsing never fails. Malformed lines are skipped, blocks that cannot be
//! interpreted are dropped, and the caller gets whatever was recoverable.
//!
//! ```
//! use cms_fetcher::app::parser::{parse, DeviceContext};
//!
//! let raw = b"[ADUChannel:0]\nMeasUnit=g\nstarttime=100\niSampleRate=2\niSampleCnt=2\n\
//!             [ADUData:0]\n0.1\n0.2\n";
//! let records = parse(raw, &DeviceContext::new("T1", "MainBearing"));
//! assert_eq!(records.len(), 2);
//! ```

use std::collections::HashMap;

use crate::app::models::VibrationRecord;
use crate::constants::files;

pub mod blocks;
pub mod sections;

pub use blocks::DataBlockKind;
use sections::{parse_metadata, split_sections, SectionKind};

/// Caller-supplied tags applied where the file itself is silent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceContext {
    /// Turbine identity written on every record
    pub turbine: String,
    /// Group (cleaned device name), if known
    pub group: Option<String>,
    /// Component used when metadata has no `szComponent`
    pub component: String,
    /// Sensor used when metadata has no `szLabel`
    pub sensor: Option<String>,
}

impl DeviceContext {
    pub fn new(turbine: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            turbine: turbine.into(),
            group: None,
            component: component.into(),
            sensor: None,
        }
    }

    /// Context for a turbine with no known component
    pub fn for_turbine(turbine: impl Into<String>) -> Self {
        Self::new(turbine, files::UNKNOWN_COMPONENT)
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn with_sensor(mut self, sensor: impl Into<String>) -> Self {
        self.sensor = Some(sensor.into());
        self
    }
}

/// Records recovered from one file and what had to be thrown away
#[derive(Debug, Default)]
pub struct ParseReport {
    pub records: Vec<VibrationRecord>,
    pub blocks_decoded: usize,
    pub blocks_dropped: usize,
    pub lines_skipped: usize,
}

/// Parse raw bytes into records
pub fn parse(bytes: &[u8], context: &DeviceContext) -> Vec<VibrationRecord> {
    parse_with_report(bytes, context).records
}

/// Parse raw bytes, also reporting dropped blocks and skipped lines
pub fn parse_with_report(bytes: &[u8], context: &DeviceContext) -> ParseReport {
    let text = String::from_utf8_lossy(bytes);
    let mut report = ParseReport::default();

    let mut metadata: Option<(Option<u32>, HashMap<String, String>)> = None;

    for section in split_sections(&text) {
        match section.kind {
            SectionKind::Metadata => {
                // Each metadata section starts a fresh unit
                metadata = Some((section.index, parse_metadata(&section.lines)));
            }
            SectionKind::Data => {
                let Some((meta_index, current)) = metadata.as_ref() else {
                    tracing::debug!("Dropping data block [{}] with no metadata", section.name);
                    report.blocks_dropped += 1;
                    continue;
                };

                if let (Some(meta_index), Some(data_index)) = (meta_index, section.index) {
                    if *meta_index != data_index {
                        tracing::debug!(
                            "Dropping data block [{}:{}]: metadata belongs to unit {}",
                            section.name,
                            data_index,
                            meta_index
                        );
                        report.blocks_dropped += 1;
                        continue;
                    }
                }

                let Some(kind) = DataBlockKind::detect(current, &section.lines) else {
                    tracing::debug!(
                        "Dropping data block [{}]: not an acceleration capture",
                        section.name
                    );
                    report.blocks_dropped += 1;
                    continue;
                };

                match blocks::decode_block(kind, current, &section.lines, context) {
                    Some(block) if !block.records.is_empty() => {
                        report.blocks_decoded += 1;
                        report.lines_skipped += block.skipped_lines;
                        report.records.extend(block.records);
                    }
                    Some(block) => {
                        report.blocks_dropped += 1;
                        report.lines_skipped += block.skipped_lines;
                    }
                    None => report.blocks_dropped += 1,
                }
            }
            SectionKind::Other => {}
        }
    }

    if report.lines_skipped > 0 || report.blocks_dropped > 0 {
        tracing::debug!(
            "Parsed {} records for {} ({} blocks dropped, {} lines skipped)",
            report.records.len(),
            context.turbine,
            report.blocks_dropped,
            report.lines_skipped
        );
    }

    report
}
