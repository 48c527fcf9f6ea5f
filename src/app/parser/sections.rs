//! Splitting raw text into bracket-delimited sections

use std::collections::HashMap;

use crate::constants::sections;

/// What a section header announces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// `key=value` capture metadata
    Metadata,
    /// Numeric rows
    Data,
    /// Anything else, ignored
    Other,
}

impl SectionKind {
    /// Classify a header name by case-insensitive substring match
    pub fn classify(name: &str) -> Self {
        let lowered = name.to_ascii_lowercase();
        if lowered.contains(sections::METADATA_MARKER) {
            Self::Metadata
        } else if lowered.contains(sections::DATA_MARKER) {
            Self::Data
        } else {
            Self::Other
        }
    }
}

/// One `[Name]` or `[Name:index]` header and the lines below it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section<'a> {
    pub name: &'a str,
    pub index: Option<u32>,
    pub kind: SectionKind,
    pub lines: Vec<&'a str>,
}

/// Parse a header line, returning its name and optional index
pub fn parse_header(line: &str) -> Option<(&str, Option<u32>)> {
    let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?.trim();
    if inner.is_empty() || inner.contains('[') || inner.contains(']') {
        return None;
    }
    match inner.rsplit_once(':') {
        Some((name, index)) => match index.trim().parse::<u32>() {
            Ok(index) => Some((name.trim(), Some(index))),
            Err(_) => Some((inner, None)),
        },
        None => Some((inner, None)),
    }
}

/// Split decoded text into sections; text before the first header is ignored
pub fn split_sections(text: &str) -> Vec<Section<'_>> {
    let mut sections: Vec<Section<'_>> = Vec::new();

    for line in text.lines() {
        if let Some((name, index)) = parse_header(line) {
            sections.push(Section {
                name,
                index,
                kind: SectionKind::classify(name),
                lines: Vec::new(),
            });
        } else if let Some(current) = sections.last_mut() {
            current.lines.push(line);
        }
    }

    sections
}

/// Read `key=value` lines into a map; other lines are ignored
pub fn parse_metadata(lines: &[&str]) -> HashMap<String, String> {
    lines
        .iter()
        .filter_map(|line| line.split_once('='))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .filter(|(key, _)| !key.is_empty())
        .collect()
}
