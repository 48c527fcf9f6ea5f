//! Response envelope normalisation
//!
//! The CMS service answers either XML or JSON depending on deployment. Both
//! are folded into a `serde_json::Value` tree here so the rest of the client
//! reads one shape. In XML the root element becomes the outer key, repeated
//! children become arrays, attributes become `@name` keys, text next to
//! attributes or children becomes `#text`, empty elements become `null`.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::errors::EnvelopeError;

/// Envelope encoding detected from the `Content-Type` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeFormat {
    Xml,
    Json,
}

impl EnvelopeFormat {
    /// Detect the encoding by case-insensitive substring match
    pub fn detect(content_type: &str) -> Result<Self, EnvelopeError> {
        let lowered = content_type.to_ascii_lowercase();
        if lowered.contains("xml") {
            Ok(Self::Xml)
        } else if lowered.contains("json") {
            Ok(Self::Json)
        } else {
            Err(EnvelopeError::UnsupportedContentType {
                content_type: content_type.to_string(),
            })
        }
    }
}

/// Read a response body and decode it according to its content type
pub async fn decode_response(response: reqwest::Response) -> Result<Value, EnvelopeError> {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let format = EnvelopeFormat::detect(&content_type)?;
    let body = response.text().await?;
    decode(format, &body)
}

/// Decode a body already read into memory
pub fn decode(format: EnvelopeFormat, body: &str) -> Result<Value, EnvelopeError> {
    match format {
        EnvelopeFormat::Json => Ok(serde_json::from_str(body)?),
        EnvelopeFormat::Xml => xml_to_value(body),
    }
}

/// Follow `path` through nested objects
///
/// Returns `None` when a segment is missing or the value at the end is null.
pub fn lookup<'a>(value: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let found = path
        .iter()
        .try_fold(value, |current, segment| current.get(segment))?;
    (!found.is_null()).then_some(found)
}

/// A collection the upstream may collapse to a bare object when it holds one item
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::Many(items) => items,
            OneOrMany::One(item) => vec![item],
        }
    }
}

/// Deserialize the list found at `path`, accepting a bare object as a one-item list
///
/// A missing path yields an empty list.
pub fn list_at<T>(value: &Value, path: &[&str]) -> Result<Vec<T>, EnvelopeError>
where
    T: for<'de> Deserialize<'de>,
{
    match lookup(value, path) {
        None => Ok(Vec::new()),
        Some(found) => {
            let items: OneOrMany<T> = serde_json::from_value(found.clone())?;
            Ok(items.into_vec())
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Int(i64),
    Float(f64),
    Text(String),
}

/// Accept a string or a number and keep it as a string
pub fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Int(v) => v.to_string(),
        Scalar::Float(v) => v.to_string(),
        Scalar::Text(v) => v,
    })
}

/// Accept an integer, an integral float, or a numeric string
pub fn lenient_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Scalar::deserialize(deserializer)? {
        Scalar::Int(v) => Ok(v),
        Scalar::Float(v) if v.fract() == 0.0 => Ok(v as i64),
        Scalar::Float(v) => Err(D::Error::custom(format!("expected an integer, got {v}"))),
        Scalar::Text(v) => v
            .trim()
            .parse::<i64>()
            .map_err(|_| D::Error::custom(format!("expected an integer, got '{v}'"))),
    }
}

struct Element {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Element {
    fn open(start: &BytesStart<'_>) -> Result<Self, EnvelopeError> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut fields = Map::new();
        for attribute in start.attributes() {
            let attribute = attribute.map_err(xml_error)?;
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            let value = attribute.unescape_value().map_err(xml_error)?;
            fields.insert(format!("@{key}"), Value::String(value.into_owned()));
        }
        Ok(Self {
            name,
            fields,
            text: String::new(),
        })
    }

    fn close(self) -> (String, Value) {
        let text = self.text.trim();
        let value = if self.fields.is_empty() {
            if text.is_empty() {
                Value::Null
            } else {
                Value::String(text.to_string())
            }
        } else {
            let mut fields = self.fields;
            if !text.is_empty() {
                fields.insert("#text".to_string(), Value::String(text.to_string()));
            }
            Value::Object(fields)
        };
        (self.name, value)
    }

    fn push_child(&mut self, name: String, value: Value) {
        match self.fields.get_mut(&name) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                self.fields.insert(name, value);
            }
        }
    }
}

fn xml_error(error: impl std::fmt::Display) -> EnvelopeError {
    EnvelopeError::Xml {
        reason: error.to_string(),
    }
}

/// Convert an XML document into a JSON-shaped tree
fn xml_to_value(body: &str) -> Result<Value, EnvelopeError> {
    let mut reader = Reader::from_str(body);
    reader.trim_text(true);

    // The document node collects the root element
    let mut stack = vec![Element {
        name: String::new(),
        fields: Map::new(),
        text: String::new(),
    }];

    loop {
        match reader.read_event().map_err(xml_error)? {
            Event::Start(start) => stack.push(Element::open(&start)?),
            Event::Empty(start) => {
                let (name, value) = Element::open(&start)?.close();
                if let Some(parent) = stack.last_mut() {
                    parent.push_child(name, value);
                }
            }
            Event::End(_) => {
                if stack.len() < 2 {
                    return Err(xml_error("unbalanced closing tag"));
                }
                if let Some(element) = stack.pop() {
                    let (name, value) = element.close();
                    if let Some(parent) = stack.last_mut() {
                        parent.push_child(name, value);
                    }
                }
            }
            Event::Text(text) => {
                let text: Cow<'_, str> = text.unescape().map_err(xml_error)?;
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&text);
                }
            }
            Event::CData(data) => {
                if let Some(current) = stack.last_mut() {
                    current.text.push_str(&String::from_utf8_lossy(&data.into_inner()));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() != 1 {
        return Err(xml_error("document ended inside an element"));
    }
    match stack.pop() {
        Some(document) if !document.fields.is_empty() => Ok(Value::Object(document.fields)),
        _ => Err(xml_error("document has no root element")),
    }
}
