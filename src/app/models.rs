//! Data models for CMS Fetcher
//!
//! This module defines the catalog entities returned by the CMS service, the
//! vibration record produced by the parser, and the combined ingestion result.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::app::client::envelope::{lenient_i64, lenient_string};
use crate::errors::ConfigError;

/// A monitored device (turbine) as listed by the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    /// Opaque identifier used in request paths
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    /// Human-readable identity (turbine name)
    #[serde(deserialize_with = "lenient_string")]
    pub identity: String,
    /// Raw catalog label
    #[serde(deserialize_with = "lenient_string")]
    pub name: String,
}

impl Device {
    /// Name with its first `prefix_segments` dash-delimited segments removed
    ///
    /// Names with too few segments are returned unchanged.
    pub fn cleaned_name(&self, prefix_segments: usize) -> String {
        let parts: Vec<&str> = self.name.split('-').collect();
        if parts.len() > prefix_segments {
            parts[prefix_segments..].join("-")
        } else {
            tracing::debug!(
                "Device name '{}' has fewer than {} dash segments, keeping it as-is",
                self.name,
                prefix_segments + 1
            );
            self.name.clone()
        }
    }
}

/// One retrievable raw measurement file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFileDescriptor {
    /// Capture time, epoch seconds
    #[serde(rename = "unixTime", deserialize_with = "lenient_i64")]
    pub unix_time: i64,
    #[serde(deserialize_with = "lenient_string")]
    pub channel: String,
    #[serde(deserialize_with = "lenient_string")]
    pub method: String,
    /// Upstream filter tag, -1 when unfiltered
    #[serde(deserialize_with = "lenient_i64", default = "no_filter")]
    pub filter: i64,
    #[serde(default)]
    pub metadata: Option<Value>,
}

fn no_filter() -> i64 {
    -1
}

impl RawFileDescriptor {
    /// Capture time as a UTC instant
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.unix_time, 0).single()
    }

    /// Mounting component from `metadata.component`, if present
    pub fn component(&self) -> Option<String> {
        let component = self.metadata.as_ref()?.get("component")?;
        match component {
            Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            Value::Number(number) => Some(number.to_string()),
            _ => None,
        }
    }

    /// Whether an upstream filter was applied
    pub fn is_filtered(&self) -> bool {
        self.filter >= 0
    }
}

/// The atomic output unit: one sample of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibrationRecord {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub component: String,
    pub turbine: String,
    /// Caller-supplied group (cleaned device name), when known
    pub group: Option<String>,
    /// Sample rate of the capture in Hz, for uniformly sampled blocks
    pub frequency: Option<f64>,
    /// Sensor code, tag or channel label
    pub sensor: String,
}

/// Combined output of an ingestion run
///
/// Records are kept sorted by (turbine, component, sensor, timestamp).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestionResult {
    records: Vec<VibrationRecord>,
}

impl IngestionResult {
    /// Build a result, sorting the records into their canonical order
    pub fn from_records(mut records: Vec<VibrationRecord>) -> Self {
        records.sort_by(|a, b| {
            a.turbine
                .cmp(&b.turbine)
                .then_with(|| a.component.cmp(&b.component))
                .then_with(|| a.sensor.cmp(&b.sensor))
                .then_with(|| a.timestamp.cmp(&b.timestamp))
        });
        Self { records }
    }

    pub fn records(&self) -> &[VibrationRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<VibrationRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records grouped by turbine, each group in canonical order
    pub fn by_turbine(&self) -> BTreeMap<&str, &[VibrationRecord]> {
        let mut groups = BTreeMap::new();
        let mut start = 0;
        while start < self.records.len() {
            let turbine = self.records[start].turbine.as_str();
            let len = self.records[start..]
                .iter()
                .take_while(|record| record.turbine == turbine)
                .count();
            groups.insert(turbine, &self.records[start..start + len]);
            start += len;
        }
        groups
    }
}

/// Inclusive retrieval window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Create a window, rejecting a start after the end
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, ConfigError> {
        if start > end {
            return Err(ConfigError::InvalidValue {
                field: "from".to_string(),
                value: start.to_rfc3339(),
                reason: format!("Window start must not be after its end ({})", end.to_rfc3339()),
            });
        }
        Ok(Self { start, end })
    }

    /// The 24 hours ending now
    pub fn last_day() -> Self {
        let end = Utc::now();
        Self {
            start: end - Duration::hours(24),
            end,
        }
    }

    pub fn start_epoch(&self) -> i64 {
        self.start.timestamp()
    }

    pub fn end_epoch(&self) -> i64 {
        self.end.timestamp()
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} .. {}", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn device(name: &str) -> Device {
        Device {
            id: "7592".to_string(),
            identity: "T1".to_string(),
            name: name.to_string(),
        }
    }

    fn record(turbine: &str, component: &str, sensor: &str, secs: i64) -> VibrationRecord {
        VibrationRecord {
            timestamp: Utc.timestamp_opt(secs, 0).unwrap(),
            value: 0.0,
            component: component.to_string(),
            turbine: turbine.to_string(),
            group: None,
            frequency: None,
            sensor: sensor.to_string(),
        }
    }

    #[test]
    fn test_cleaned_name() {
        assert_eq!(device("NX-CMS-WEB-DEN-TOL-N-89608").cleaned_name(3), "DEN-TOL-N-89608");
        // Too few segments: keep the whole label
        assert_eq!(device("A-B-C").cleaned_name(3), "A-B-C");
        assert_eq!(device("A-B-C-D").cleaned_name(3), "D");
    }

    #[test]
    fn test_device_from_xml_and_json_shapes() {
        let from_json: Device =
            serde_json::from_value(json!({"id": 3985, "identity": "T1", "name": "a-b-c-d"}))
                .unwrap();
        let from_xml: Device =
            serde_json::from_value(json!({"id": "3985", "identity": "T1", "name": "a-b-c-d"}))
                .unwrap();
        assert_eq!(from_json, from_xml);
    }

    #[test]
    fn test_descriptor_fields() {
        let descriptor: RawFileDescriptor = serde_json::from_value(json!({
            "unixTime": "1732861993",
            "channel": "7",
            "method": 3,
            "filter": "-1",
            "hash": "NA",
            "metadata": {"component": "MainBearing"}
        }))
        .unwrap();

        assert_eq!(descriptor.unix_time, 1_732_861_993);
        assert_eq!(descriptor.method, "3");
        assert!(!descriptor.is_filtered());
        assert_eq!(descriptor.component().as_deref(), Some("MainBearing"));
        assert_eq!(descriptor.timestamp().unwrap().timestamp(), 1_732_861_993);
    }

    #[test]
    fn test_descriptor_without_metadata() {
        let descriptor: RawFileDescriptor = serde_json::from_value(json!({
            "unixTime": 100, "channel": "1", "method": "2", "metadata": null
        }))
        .unwrap();
        assert_eq!(descriptor.filter, -1);
        assert!(descriptor.component().is_none());
    }

    #[test]
    fn test_ingestion_result_sorting_and_grouping() {
        let result = IngestionResult::from_records(vec![
            record("T2", "Gen", "AI1", 5),
            record("T1", "MainBearing", "AI1", 200),
            record("T1", "MainBearing", "AI1", 100),
            record("T1", "Gear", "AI2", 300),
        ]);

        let order: Vec<(&str, &str, i64)> = result
            .records()
            .iter()
            .map(|r| (r.turbine.as_str(), r.component.as_str(), r.timestamp.timestamp()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("T1", "Gear", 300),
                ("T1", "MainBearing", 100),
                ("T1", "MainBearing", 200),
                ("T2", "Gen", 5),
            ]
        );

        let groups = result.by_turbine();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups["T1"].len(), 3);
        assert_eq!(groups["T2"].len(), 1);
    }

    #[test]
    fn test_time_window_validation() {
        let early = Utc.timestamp_opt(50, 0).unwrap();
        let late = Utc.timestamp_opt(250, 0).unwrap();
        let window = TimeWindow::new(early, late).unwrap();
        assert_eq!((window.start_epoch(), window.end_epoch()), (50, 250));
        assert!(TimeWindow::new(late, early).is_err());
    }
}
