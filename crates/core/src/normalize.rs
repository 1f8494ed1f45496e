//! Response decoding and best-effort result normalization.
//!
//! The extended endpoint sends every result with a `text` field that holds a
//! JSON-encoded record; older data sets put plain prose there instead. Each
//! item is handled on its own: a bad item becomes a raw-text record and never
//! fails the response. The simple endpoint sends result objects directly, as
//! a bare array or wrapped in `{ results }`.

use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FetchError, ItemDecodeError};
use crate::types::{ApiVariant, SearchResult};

/// Fields lifted out of a raw item into [`SearchResult`].
const KNOWN_FIELDS: &[&str] = &["name", "location", "text", "summary", "score"];

/// A decoded body before client-side timing is attached.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedBody {
    pub results: Vec<SearchResult>,
    /// Server-reported embedding time, nanoseconds.
    pub embedding_ns: f64,
    /// Server-reported search time, nanoseconds.
    pub search_ns: f64,
}

/// Decode a response body according to the wire variant.
pub fn decode_body(body: &[u8], variant: ApiVariant) -> Result<DecodedBody, FetchError> {
    let value: Value =
        serde_json::from_slice(body).map_err(|e| FetchError::BodyDecode(e.to_string()))?;

    match (variant, value) {
        (ApiVariant::Extended, Value::Object(obj)) => {
            let items = results_array(&obj)?;
            Ok(DecodedBody {
                results: items.iter().map(normalize_extended_item).collect(),
                embedding_ns: timing_field(&obj, "embedding_time"),
                search_ns: timing_field(&obj, "search_time"),
            })
        }
        (ApiVariant::Simple, Value::Array(items)) => Ok(DecodedBody {
            results: items.iter().map(lift_record).collect(),
            ..DecodedBody::default()
        }),
        (ApiVariant::Simple, Value::Object(obj)) => {
            let items = results_array(&obj)?;
            Ok(DecodedBody {
                results: items.iter().map(lift_record).collect(),
                embedding_ns: timing_field(&obj, "embedding_time"),
                search_ns: timing_field(&obj, "search_time"),
            })
        }
        (variant, other) => Err(FetchError::BodyDecode(format!(
            "expected {} body, got JSON {}",
            if variant == ApiVariant::Extended { "an object" } else { "an array or object" },
            json_kind(&other)
        ))),
    }
}

fn results_array(obj: &Map<String, Value>) -> Result<&Vec<Value>, FetchError> {
    match obj.get("results") {
        Some(Value::Array(items)) => Ok(items),
        Some(other) => Err(FetchError::BodyDecode(format!(
            "`results` is JSON {}, expected an array",
            json_kind(other)
        ))),
        None => Err(FetchError::BodyDecode("missing `results`".to_string())),
    }
}

fn timing_field(obj: &Map<String, Value>, key: &str) -> f64 {
    match obj.get(key).and_then(Value::as_f64) {
        Some(ns) => ns,
        None => {
            debug!(field = key, "Response has no numeric timing field, reporting 0");
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Per-item normalization
// ---------------------------------------------------------------------------

/// Normalize one extended-variant item. Never fails: items whose `text` is
/// not a JSON object fall back to a record holding only the raw text.
pub fn normalize_extended_item(item: &Value) -> SearchResult {
    match parse_item_text(item) {
        Ok(parsed) => project(&parsed),
        Err(e) => {
            debug!(error = %e, "Result item kept as raw text");
            match item.get("text").and_then(Value::as_str) {
                Some(raw) => SearchResult::from_text(raw),
                None => SearchResult::default(),
            }
        }
    }
}

/// Parse the JSON record carried in `item.text`.
pub fn parse_item_text(item: &Value) -> Result<Map<String, Value>, ItemDecodeError> {
    let raw = item.get("text").and_then(Value::as_str).ok_or(ItemDecodeError::MissingText)?;
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(obj)) => Ok(obj),
        Ok(other) => Err(ItemDecodeError::NotAnObject(json_kind(&other))),
        Err(e) => Err(ItemDecodeError::InvalidJson(e.to_string())),
    }
}

/// Take only the known fields; anything else in the parsed record is dropped.
fn project(obj: &Map<String, Value>) -> SearchResult {
    SearchResult {
        name: string_field(obj.get("name")),
        location: string_field(obj.get("location")),
        text: string_field(obj.get("text")),
        summary: string_field(obj.get("summary")),
        score: obj.get("score").and_then(Value::as_f64),
        extra: Map::new(),
    }
}

/// Simple variant: lift known fields, pass the rest through. A known field
/// whose value cannot be lifted (say a string `score`) is passed through too.
pub fn lift_record(item: &Value) -> SearchResult {
    let obj = match item {
        Value::Object(obj) => obj,
        Value::String(s) => return SearchResult::from_text(s.as_str()),
        _ => return SearchResult::default(),
    };

    let mut record = project(obj);
    for (key, value) in obj {
        let lifted = match key.as_str() {
            "name" => record.name.is_some(),
            "location" => record.location.is_some(),
            "text" => record.text.is_some(),
            "summary" => record.summary.is_some(),
            "score" => record.score.is_some(),
            _ => false,
        };
        if !lifted && !(KNOWN_FIELDS.contains(&key.as_str()) && value.is_null()) {
            record.extra.insert(key.clone(), value.clone());
        }
    }
    record
}

/// Strings as-is; numbers and booleans in their JSON spelling; anything else unset.
fn string_field(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
