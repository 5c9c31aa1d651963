//! Turns a free-text model completion into an [`AnalysisResult`].
//!
//! The model is asked for JSON but nothing holds it to that. This module finds
//! the embedded object, coerces each field to its declared type and falls back
//! to carrying the raw text in `analysis` when no object can be decoded.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::models::{AnalysisResult, StarLabel};
use crate::utils::truncate_chars;

/// Characters of raw output kept when the completion cannot be parsed.
pub const RAW_FALLBACK_LIMIT: usize = 1500;

pub const MAX_RATING: i64 = 20;
const MAX_LIKES: usize = 5;
const MAX_AUDIENCES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ParseFailure {
    NoObject,
    InvalidJson,
    NotAnObject,
}

/// Normalize a raw completion. Never fails.
pub fn normalize(raw: &str, book_title: &str) -> AnalysisResult {
    match decode_object(raw) {
        Ok(object) => from_object(&object),
        Err(failure) => {
            warn!(?failure, raw_chars = raw.len(), "Completion did not contain a usable JSON object");
            AnalysisResult {
                analysis: truncate_chars(raw, RAW_FALLBACK_LIMIT),
                ..AnalysisResult::empty(book_title)
            }
        }
    }
}

/// Greedy `{ ... }` span: first opening brace to last closing brace.
fn json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn decode_object(raw: &str) -> Result<Map<String, Value>, ParseFailure> {
    let span = json_span(raw).ok_or(ParseFailure::NoObject)?;
    let value: Value = serde_json::from_str(span).map_err(|e| {
        debug!(error = %e, "Embedded JSON failed to decode");
        ParseFailure::InvalidJson
    })?;
    match value {
        Value::Object(object) => Ok(object),
        _ => Err(ParseFailure::NotAnObject),
    }
}

fn from_object(object: &Map<String, Value>) -> AnalysisResult {
    AnalysisResult {
        book_title: text_field(object, "book_title"),
        purpose: text_field(object, "purpose"),
        verdict: text_field(object, "verdict"),
        star_rating: star_rating(object.get("star_rating")),
        star_label: star_label(object.get("star_label")),
        likes: list_field(object, "likes", Some(MAX_LIKES)),
        dislikes: list_field(object, "dislikes", Some(MAX_LIKES)),
        best_for: list_field(object, "best_for", Some(MAX_AUDIENCES)),
        avoid_if: list_field(object, "avoid_if", Some(MAX_AUDIENCES)),
        tags: list_field(object, "tags", None),
        analysis: text_field(object, "analysis"),
        error: None,
        raw_response: None,
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn text_field(object: &Map<String, Value>, key: &str) -> String {
    object.get(key).and_then(scalar_text).unwrap_or_default()
}

/// Non-array values become empty; scalars are not wrapped.
fn list_field(object: &Map<String, Value>, key: &str, cap: Option<usize>) -> Vec<String> {
    let Some(Value::Array(items)) = object.get(key) else {
        return Vec::new();
    };
    let items = items
        .iter()
        .filter(|item| !matches!(item, Value::Bool(_)))
        .filter_map(scalar_text);
    match cap {
        Some(cap) => items.take(cap).collect(),
        None => items.collect(),
    }
}

/// Integers, truncated floats and numeric strings; anything else or out of range is 0.
fn star_rating(value: Option<&Value>) -> i64 {
    let rating = match value {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Some(Value::String(s)) => s.trim().parse::<i64>().ok(),
        Some(Value::Bool(b)) => Some(i64::from(*b)),
        _ => None,
    };

    match rating {
        Some(r) if (0..=MAX_RATING).contains(&r) => r,
        Some(r) => {
            debug!(rating = r, "Star rating out of range");
            0
        }
        None => 0,
    }
}

fn star_label(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_str)
        .and_then(StarLabel::parse)
        .map(|label| label.as_str().to_string())
        .unwrap_or_default()
}
