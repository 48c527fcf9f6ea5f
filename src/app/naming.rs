//! Deterministic naming of raw files
//!
//! A raw file is addressed by `{channel}.{method}_{YYYYMMDD-HHMMSS}[_filter{n}].{format}`
//! on the service, and stored locally under the same string prefixed with
//! the device identity. Timestamps are always rendered in UTC; a descriptor
//! whose capture time is out of range has no name at all.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use url::Url;

use crate::app::models::{Device, RawFileDescriptor};
use crate::constants::api;
use crate::errors::{HttpError, HttpResult};

const TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

/// The part of the name shared by the local file name and the remote path
pub fn file_part(descriptor: &RawFileDescriptor, format: &str) -> Option<String> {
    let timestamp = descriptor.timestamp()?.format(TIMESTAMP_FORMAT);

    let mut part = format!("{}.{}_{}", descriptor.channel, descriptor.method, timestamp);
    if descriptor.is_filtered() {
        part.push_str(&format!("_filter{}", descriptor.filter));
    }
    part.push('.');
    part.push_str(format);
    Some(part)
}

/// Local file name: `{identity}-{file_part}`
pub fn resolve_name(
    device: &Device,
    descriptor: &RawFileDescriptor,
    format: &str,
) -> Option<String> {
    Some(format!("{}-{}", device.identity, file_part(descriptor, format)?))
}

/// Make an upstream-supplied value safe to use as one path segment
///
/// Separators become `_`, and `.`/`..` (or nothing at all) cannot
/// climb out of the parent directory.
pub fn path_segment(raw: &str) -> String {
    let safe: String = raw
        .chars()
        .map(|c| if matches!(c, '/' | '\\') || c.is_control() { '_' } else { c })
        .collect();
    match safe.as_str() {
        "" | "." | ".." => safe.replace('.', "_") + "_",
        _ => safe,
    }
}

/// Download endpoint: `{base}/systems/{id}/rawfiles/{file_part}`
pub fn resolve_remote_locator(
    base_url: &Url,
    device: &Device,
    descriptor: &RawFileDescriptor,
    format: &str,
) -> HttpResult<Url> {
    let file_part = file_part(descriptor, format).ok_or_else(|| HttpError::InvalidUrl {
        url: base_url.to_string(),
        error: format!("capture time {} is out of range", descriptor.unix_time),
    })?;
    let mut url = base_url.clone();
    url.path_segments_mut()
        .map_err(|_| HttpError::InvalidUrl {
            url: base_url.to_string(),
            error: "base URL cannot carry path segments".to_string(),
        })?
        .pop_if_empty()
        .extend([
            api::SYSTEMS_SEGMENT,
            device.id.as_str(),
            api::RAWFILES_SEGMENT,
            file_part.as_str(),
        ]);
    Ok(url)
}

/// Fields recovered from a resolved local file name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedName {
    pub identity: String,
    pub channel: String,
    pub method: String,
    pub timestamp: DateTime<Utc>,
    pub filter: Option<i64>,
    pub format: String,
}

/// Inverse of [`resolve_name`], used when re-reading an archived raw tree
///
/// The identity may itself contain dashes; the channel is whatever follows
/// the last dash before the `{channel}.{method}` pair.
pub fn parse_resolved_name(name: &str) -> Option<ParsedName> {
    let (stem, format) = name.rsplit_once('.')?;
    let (head, tail) = stem.split_once('_')?;

    let (identity, channel_method) = head.rsplit_once('-')?;
    let (channel, method) = channel_method.split_once('.')?;

    let (stamp, filter) = match tail.split_once("_filter") {
        Some((stamp, filter)) => (stamp, Some(filter.parse::<i64>().ok()?)),
        None => (tail, None),
    };
    let timestamp = NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT).ok()?;

    if identity.is_empty() || channel.is_empty() || method.is_empty() {
        return None;
    }

    Some(ParsedName {
        identity: identity.to_string(),
        channel: channel.to_string(),
        method: method.to_string(),
        timestamp: Utc.from_utc_datetime(&timestamp),
        filter,
        format: format.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> Device {
        Device {
            id: "3985".to_string(),
            identity: "DEN-TOL-N-89608".to_string(),
            name: "NX-CMS-WEB-DEN-TOL-N-89608".to_string(),
        }
    }

    fn descriptor(filter: i64) -> RawFileDescriptor {
        RawFileDescriptor {
            unix_time: 1_732_861_993,
            channel: "7".to_string(),
            method: "3".to_string(),
            filter,
            metadata: None,
        }
    }

    #[test]
    fn test_resolve_name_without_filter() {
        let name = resolve_name(&device(), &descriptor(-1), "txt").unwrap();
        assert_eq!(name, "DEN-TOL-N-89608-7.3_20241129-063313.txt");
        assert!(!name.contains("_filter"));
    }

    #[test]
    fn test_resolve_name_with_filter() {
        for filter in [0, 2, 15] {
            let name = resolve_name(&device(), &descriptor(filter), "txt").unwrap();
            assert_eq!(name.matches("_filter").count(), 1);
            assert!(name.ends_with(&format!("_filter{filter}.txt")));
        }
    }

    #[test]
    fn test_names_are_unique_per_tuple() {
        let a = resolve_name(&device(), &descriptor(-1), "txt").unwrap();
        let b = resolve_name(&device(), &descriptor(0), "txt").unwrap();
        let mut later = descriptor(-1);
        later.unix_time += 1;
        let c = resolve_name(&device(), &later, "txt").unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_out_of_range_time_has_no_name() {
        let mut far = descriptor(-1);
        far.unix_time = i64::MAX;
        let mut other = descriptor(-1);
        other.unix_time = i64::MIN;

        assert!(resolve_name(&device(), &far, "txt").is_none());
        assert!(resolve_name(&device(), &other, "txt").is_none());

        let base = Url::parse("https://cms.example.com/weblog-datasrv").unwrap();
        assert!(matches!(
            resolve_remote_locator(&base, &device(), &far, "txt"),
            Err(HttpError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_path_segment_cannot_escape() {
        assert_eq!(path_segment("MainBearing"), "MainBearing");
        assert_eq!(path_segment("../../x"), ".._.._x");
        assert_eq!(path_segment("a\\b"), "a_b");
        assert_eq!(path_segment(".."), "___");
        assert_eq!(path_segment("."), "__");
        assert_eq!(path_segment(""), "_");
        assert!(!path_segment("..").contains(".."));
    }

    #[test]
    fn test_resolve_remote_locator() {
        let base = Url::parse("https://cms.example.com/weblog-datasrv").unwrap();
        let url = resolve_remote_locator(&base, &device(), &descriptor(2), "txt").unwrap();
        assert_eq!(
            url.as_str(),
            "https://cms.example.com/weblog-datasrv/systems/3985/rawfiles/7.3_20241129-063313_filter2.txt"
        );

        // Trailing slash on the base URL does not double up
        let base = Url::parse("https://cms.example.com/weblog-datasrv/").unwrap();
        let url = resolve_remote_locator(&base, &device(), &descriptor(-1), "txt").unwrap();
        assert!(url.path().starts_with("/weblog-datasrv/systems/3985/"));
    }

    #[test]
    fn test_parse_resolved_name_inverts_resolve_name() {
        let name = resolve_name(&device(), &descriptor(4), "txt").unwrap();
        let parsed = parse_resolved_name(&name).unwrap();
        assert_eq!(parsed.identity, "DEN-TOL-N-89608");
        assert_eq!(parsed.channel, "7");
        assert_eq!(parsed.method, "3");
        assert_eq!(parsed.filter, Some(4));
        assert_eq!(parsed.timestamp.timestamp(), 1_732_861_993);
        assert_eq!(parsed.format, "txt");

        assert!(parse_resolved_name("notes.txt").is_none());
        assert!(parse_resolved_name("T1-7.3_garbage.txt").is_none());
    }
}
