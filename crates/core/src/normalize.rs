//! Shape-tolerant normalization of workflow output values.
//!
//! The engine has serialized list outputs in several ways over time: a
//! plain string with JSON embedded in prose, a JSON array string, an
//! object string with a `recommendations`/`books` field, and a native
//! array of `{ "value": X }` wrappers. [`normalize`] runs a fixed chain of
//! detectors, first match wins. Older detectors stay in the chain because
//! in-flight executions may still produce the older shapes.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Object fields that may hold the record list.
const LIST_FIELDS: &[&str] = &["recommendations", "books"];

/// Field name of the typed-wrapper shape.
const WRAPPER_FIELD: &str = "value";

static ARRAY_SPAN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[\s\S]*\]").expect("valid regex"));

static RECOMMENDATIONS_OBJECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{[\s\S]*"recommendations"[\s\S]*\}"#).expect("valid regex"));

/// Result of normalizing one output value.
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// A non-empty list of structured records.
    Records(Vec<Value>),
    /// Nothing structured was found; carries the raw text to display as-is.
    Unstructured(String),
}

impl Normalized {
    pub fn records(&self) -> Option<&[Value]> {
        match self {
            Normalized::Records(records) => Some(records),
            Normalized::Unstructured(_) => None,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, Normalized::Records(_))
    }
}

type Detector = fn(&Value) -> Option<Vec<Value>>;

/// Detectors in priority order.
const DETECTORS: &[(&str, Detector)] = &[
    ("native_array", detect_native_array),
    ("json_string", detect_json_string),
    ("embedded_json", detect_embedded_json),
];

/// Normalize an output value into records, or fall back to raw text.
///
/// Never fails: any shape no detector recognizes becomes
/// [`Normalized::Unstructured`].
pub fn normalize(value: &Value) -> Normalized {
    match detect(value) {
        Some((_, records)) => Normalized::Records(records),
        None => Normalized::Unstructured(raw_text(value)),
    }
}

/// Name of the detector that recognized `value`, if any.
pub fn detected_shape(value: &Value) -> Option<&'static str> {
    detect(value).map(|(name, _)| name)
}

/// Normalize and deserialize every record into `T`.
///
/// Returns `None` when the value is unstructured or any record does not
/// fit `T`.
pub fn normalize_as<T: DeserializeOwned>(value: &Value) -> Option<Vec<T>> {
    match normalize(value) {
        Normalized::Records(records) => records
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()
            .ok(),
        Normalized::Unstructured(_) => None,
    }
}

fn detect(value: &Value) -> Option<(&'static str, Vec<Value>)> {
    DETECTORS
        .iter()
        .find_map(|(name, detector)| detector(value).map(|records| (*name, records)))
}

fn raw_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Detectors
// ---------------------------------------------------------------------------

fn detect_native_array(value: &Value) -> Option<Vec<Value>> {
    let items = value.as_array()?;
    non_empty(unwrap_wrappers(items))
}

fn detect_json_string(value: &Value) -> Option<Vec<Value>> {
    let text = value.as_str()?;
    let parsed: Value = serde_json::from_str(text.trim()).ok()?;
    records_from_parsed(parsed)
}

/// Only consulted when the whole text is not itself a JSON document.
fn detect_embedded_json(value: &Value) -> Option<Vec<Value>> {
    let text = value.as_str()?;
    if serde_json::from_str::<Value>(text.trim()).is_ok() {
        return None;
    }
    [&*ARRAY_SPAN_RE, &*RECOMMENDATIONS_OBJECT_RE]
        .into_iter()
        .filter_map(|re| re.find(text))
        .filter_map(|span| serde_json::from_str::<Value>(span.as_str()).ok())
        .find_map(records_from_parsed)
}

/// Reduce an already-parsed JSON document to its record list.
fn records_from_parsed(parsed: Value) -> Option<Vec<Value>> {
    match parsed {
        Value::Array(items) => non_empty(unwrap_wrappers(&items)),
        Value::Object(mut map) => LIST_FIELDS.iter().find_map(|field| match map.remove(*field) {
            Some(Value::Array(items)) => non_empty(unwrap_wrappers(&items)),
            _ => None,
        }),
        _ => None,
    }
}

/// Replace `{ "value": X }` elements by `X`; other elements pass through.
fn unwrap_wrappers(items: &[Value]) -> Vec<Value> {
    items
        .iter()
        .map(|item| match item.get(WRAPPER_FIELD) {
            Some(inner) if item.is_object() => inner.clone(),
            _ => item.clone(),
        })
        .collect()
}

fn non_empty(records: Vec<Value>) -> Option<Vec<Value>> {
    (!records.is_empty()).then_some(records)
}

// ---------------------------------------------------------------------------
// Typed records
// ---------------------------------------------------------------------------

/// A gift idea produced by the gift finder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GiftRecommendation {
    #[serde(alias = "title")]
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default, alias = "url")]
    pub link: Option<String>,
    #[serde(default, alias = "why")]
    pub reason: Option<String>,
}

/// A book produced by the book recommender.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookRecommendation {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub why_perfect: String,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub amazon_link: Option<String>,
}
