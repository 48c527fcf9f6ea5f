//! Data block decoding
//!
//! A data block is decoded according to its kind:
//! - `Sampled`: one float per line, uniformly spaced at `iSampleRate` Hz
//!   from `starttime`; only used for acceleration captures (`MeasUnit=g`)
//! - `OffsetPairs`: tab-separated `offset\tvalue` rows relative to `starttime`

use std::collections::HashMap;

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::app::models::VibrationRecord;
use crate::app::parser::DeviceContext;
use crate::constants::sections;

/// How the rows of a data block are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataBlockKind {
    Sampled,
    OffsetPairs,
}

impl DataBlockKind {
    /// Detect the layout from the rows' shape and the declared unit
    pub fn detect(metadata: &HashMap<String, String>, lines: &[&str]) -> Option<Self> {
        if data_lines(lines).any(|line| line.contains('\t')) {
            return Some(Self::OffsetPairs);
        }
        let unit = metadata.get(sections::MEASUREMENT_UNIT).map(|u| u.trim());
        (unit == Some(sections::ACCELERATION_UNIT)).then_some(Self::Sampled)
    }
}

/// Records of one block plus the number of rows that failed to parse
#[derive(Debug, Default)]
pub struct DecodedBlock {
    pub records: Vec<VibrationRecord>,
    pub skipped_lines: usize,
}

/// Non-empty, non-comment lines
fn data_lines<'a>(lines: &'a [&'a str]) -> impl Iterator<Item = &'a str> + 'a {
    lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty() && !line.starts_with(sections::COMMENT_PREFIX))
}

fn start_time(metadata: &HashMap<String, String>) -> DateTime<Utc> {
    let declared = metadata.get(sections::START_TIME).map(|value| value.trim());
    let (seconds, fraction) = declared
        .and_then(|value| {
            value.parse::<i64>().ok().map(|s| (s, 0.0)).or_else(|| {
                value
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| (f.floor() as i64, f - f.floor()))
            })
        })
        .unwrap_or_else(|| {
            tracing::debug!("No usable starttime in metadata, using the epoch");
            (0, 0.0)
        });

    let whole = Utc
        .timestamp_opt(seconds, 0)
        .single()
        .unwrap_or_else(|| {
            tracing::debug!("starttime {} is out of range, using the epoch", seconds);
            Utc.timestamp_nanos(0)
        });
    seconds_to_duration(fraction)
        .and_then(|fraction| whole.checked_add_signed(fraction))
        .unwrap_or(whole)
}

/// Offsets beyond this are treated as unrepresentable; well inside the
/// millisecond range of `chrono::Duration`
const MAX_OFFSET_SECS: f64 = 1e15;

fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() || seconds.abs() > MAX_OFFSET_SECS {
        return None;
    }
    let whole = seconds.trunc();
    let nanos = ((seconds - whole) * 1e9).round() as i64;
    Some(Duration::seconds(whole as i64) + Duration::nanoseconds(nanos))
}

/// `start + seconds`, or `None` when the instant is not representable
fn offset_time(start: DateTime<Utc>, seconds: f64) -> Option<DateTime<Utc>> {
    start.checked_add_signed(seconds_to_duration(seconds)?)
}

fn positive_rate(metadata: &HashMap<String, String>) -> Option<f64> {
    metadata
        .get(sections::SAMPLE_RATE)
        .and_then(|value| value.trim().parse::<f64>().ok())
        .filter(|rate| *rate > 0.0 && rate.is_finite())
}

struct Tags {
    component: String,
    sensor: String,
}

fn tags(metadata: &HashMap<String, String>, context: &DeviceContext) -> Tags {
    let non_empty = |key: &str| {
        metadata
            .get(key)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
    };
    Tags {
        component: non_empty(sections::COMPONENT).unwrap_or_else(|| context.component.clone()),
        sensor: non_empty(sections::LABEL)
            .or_else(|| context.sensor.clone())
            .unwrap_or_else(|| "Unknown".to_string()),
    }
}

/// Decode one data block; `None` when the block cannot be interpreted
pub fn decode_block(
    kind: DataBlockKind,
    metadata: &HashMap<String, String>,
    lines: &[&str],
    context: &DeviceContext,
) -> Option<DecodedBlock> {
    match kind {
        DataBlockKind::Sampled => decode_sampled(metadata, lines, context),
        DataBlockKind::OffsetPairs => decode_offset_pairs(metadata, lines, context),
    }
}

fn decode_sampled(
    metadata: &HashMap<String, String>,
    lines: &[&str],
    context: &DeviceContext,
) -> Option<DecodedBlock> {
    let Some(rate) = positive_rate(metadata) else {
        tracing::warn!(
            "Dropping sampled block for {}: missing or non-positive {}",
            context.turbine,
            sections::SAMPLE_RATE
        );
        return None;
    };

    let mut skipped_lines = 0;
    let values: Vec<f64> = data_lines(lines)
        .filter_map(|line| match line.parse::<f64>() {
            Ok(value) => Some(value),
            Err(_) => {
                skipped_lines += 1;
                tracing::debug!("Skipping non-numeric line: {}", line);
                None
            }
        })
        .collect();

    let declared = metadata
        .get(sections::SAMPLE_COUNT)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(values.len());
    if declared != values.len() {
        tracing::debug!(
            "Sample count mismatch for {}: declared {}, found {}",
            context.turbine,
            declared,
            values.len()
        );
    }

    let start = start_time(metadata);
    let tags = tags(metadata, context);
    let records: Option<Vec<VibrationRecord>> = values
        .into_iter()
        .take(declared)
        .enumerate()
        .map(|(i, value)| {
            Some(VibrationRecord {
                timestamp: offset_time(start, i as f64 / rate)?,
                value,
                component: tags.component.clone(),
                turbine: context.turbine.clone(),
                group: context.group.clone(),
                frequency: Some(rate),
                sensor: tags.sensor.clone(),
            })
        })
        .collect();

    let Some(records) = records else {
        tracing::warn!(
            "Dropping sampled block for {}: sample times overflow from {} at {} Hz",
            context.turbine,
            start,
            rate
        );
        return None;
    };

    Some(DecodedBlock {
        records,
        skipped_lines,
    })
}

fn decode_offset_pairs(
    metadata: &HashMap<String, String>,
    lines: &[&str],
    context: &DeviceContext,
) -> Option<DecodedBlock> {
    let mut skipped_lines = 0;
    let mut rows: Vec<(f64, f64)> = data_lines(lines)
        .filter_map(|line| {
            let mut parts = line.split('\t');
            let parsed = match (parts.next(), parts.next()) {
                (Some(offset), Some(value)) => offset
                    .trim()
                    .parse::<f64>()
                    .ok()
                    .zip(value.trim().parse::<f64>().ok()),
                _ => None,
            };
            if parsed.is_none() {
                skipped_lines += 1;
                tracing::debug!("Skipping malformed offset row: {}", line);
            }
            parsed
        })
        .filter(|(offset, _)| offset.is_finite())
        .collect();

    // Stable, so equal offsets keep file order
    rows.sort_by(|a, b| a.0.total_cmp(&b.0));

    let start = start_time(metadata);
    let tags = tags(metadata, context);
    let frequency = positive_rate(metadata);
    let records = rows
        .into_iter()
        .filter_map(|(offset, value)| {
            let Some(timestamp) = offset_time(start, offset) else {
                skipped_lines += 1;
                tracing::debug!("Skipping row with unrepresentable offset {}", offset);
                return None;
            };
            Some(VibrationRecord {
                timestamp,
                value,
                component: tags.component.clone(),
                turbine: context.turbine.clone(),
                group: context.group.clone(),
                frequency,
                sensor: tags.sensor.clone(),
            })
        })
        .collect();

    Some(DecodedBlock {
        records,
        skipped_lines,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn context() -> DeviceContext {
        DeviceContext::new("T1", "MainBearing")
    }

    #[test]
    fn test_detect_kind() {
        let g = metadata(&[("MeasUnit", "g")]);
        let mm = metadata(&[("MeasUnit", "mm/s")]);
        assert_eq!(
            DataBlockKind::detect(&g, &["0.1", "0.2"]),
            Some(DataBlockKind::Sampled)
        );
        assert_eq!(
            DataBlockKind::detect(&mm, &["0.0\t0.1"]),
            Some(DataBlockKind::OffsetPairs)
        );
        assert_eq!(DataBlockKind::detect(&mm, &["0.1"]), None);
        // Tabs only inside comments do not count
        assert_eq!(
            DataBlockKind::detect(&g, &["#a\tb", "0.1"]),
            Some(DataBlockKind::Sampled)
        );
    }

    #[test]
    fn test_sampled_rate_zero_drops_block() {
        let meta = metadata(&[("MeasUnit", "g"), ("iSampleRate", "0")]);
        assert!(decode_block(DataBlockKind::Sampled, &meta, &["1.0"], &context()).is_none());
        let meta = metadata(&[("MeasUnit", "g")]);
        assert!(decode_block(DataBlockKind::Sampled, &meta, &["1.0"], &context()).is_none());
    }

    #[test]
    fn test_sampled_extra_values_are_truncated_to_declared_count() {
        let meta = metadata(&[
            ("MeasUnit", "g"),
            ("starttime", "100"),
            ("iSampleRate", "2"),
            ("iSampleCnt", "2"),
        ]);
        let block =
            decode_block(DataBlockKind::Sampled, &meta, &["1", "2", "3"], &context()).unwrap();
        assert_eq!(block.records.len(), 2);
        assert_eq!(block.records[1].timestamp.timestamp_millis(), 100_500);
    }

    #[test]
    fn test_offset_pairs_sorted_and_tagged() {
        let meta = metadata(&[("starttime", "1000"), ("szLabel", "AI3")]);
        let lines = ["0.5\t2.0", "bad row", "0.0\t1.0", "#--finish--", "0.5\t3.0"];
        let block =
            decode_block(DataBlockKind::OffsetPairs, &meta, &lines, &context()).unwrap();

        assert_eq!(block.skipped_lines, 1);
        let values: Vec<f64> = block.records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
        assert_eq!(block.records[0].timestamp.timestamp(), 1000);
        assert_eq!(block.records[1].timestamp.timestamp_millis(), 1_000_500);
        assert!(block.records.iter().all(|r| r.sensor == "AI3"));
        assert!(block.records.iter().all(|r| r.frequency.is_none()));
    }

    #[test]
    fn test_offset_beyond_time_range_skips_row() {
        let meta = metadata(&[("starttime", "8210266876000")]);
        let lines = ["0\t1.0", "1e12\t2.0", "1e300\t3.0"];
        let block =
            decode_block(DataBlockKind::OffsetPairs, &meta, &lines, &context()).unwrap();

        assert_eq!(block.records.len(), 1);
        assert_eq!(block.records[0].value, 1.0);
        assert_eq!(block.skipped_lines, 2);
    }

    #[test]
    fn test_tiny_sample_rate_drops_block() {
        let meta = metadata(&[
            ("MeasUnit", "g"),
            ("starttime", "8210266876000"),
            ("iSampleRate", "1e-12"),
        ]);
        assert!(decode_block(DataBlockKind::Sampled, &meta, &["1.0", "2.0"], &context()).is_none());
    }

    #[test]
    fn test_fractional_start_near_range_end() {
        let meta = metadata(&[("MeasUnit", "g"), ("starttime", "8210266876000.5"), ("iSampleRate", "1")]);
        let block = decode_block(DataBlockKind::Sampled, &meta, &["1.0"], &context()).unwrap();
        assert_eq!(block.records[0].timestamp.timestamp(), 8_210_266_876_000);
    }

    #[test]
    fn test_sensor_falls_back_to_unknown() {
        let meta = metadata(&[("starttime", "0")]);
        let block =
            decode_block(DataBlockKind::OffsetPairs, &meta, &["0\t1"], &context()).unwrap();
        assert_eq!(block.records[0].sensor, "Unknown");
        assert_eq!(block.records[0].component, "MainBearing");
    }
}
