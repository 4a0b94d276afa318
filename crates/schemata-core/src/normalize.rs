//! Response normalization: range check, identity resolution, reverse scoring.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ScoringError;
use crate::identity::{resolve_response, RawResponse};
use crate::registry::Registry;
use crate::taxonomy::{CanonicalId, SchemaId, MAX_VALUE, MIN_VALUE};

/// A validated response with its schema metadata attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedResponse {
    pub canonical_id: CanonicalId,
    pub schema: SchemaId,
    /// Raw value as answered.
    pub raw: i64,
    /// Value after reverse scoring.
    pub value: i64,
    pub weight: f64,
}

/// `7 - v` for reversed items, `v` otherwise.
pub fn effective_value(raw: i64, reverse: bool) -> i64 {
    if reverse {
        MIN_VALUE + MAX_VALUE - raw
    } else {
        raw
    }
}

pub fn in_range(value: i64) -> bool {
    (MIN_VALUE..=MAX_VALUE).contains(&value)
}

/// Normalize a response set, failing on the first bad entry.
pub fn normalize(
    registry: &Registry,
    responses: &[RawResponse],
) -> Result<Vec<NormalizedResponse>, ScoringError> {
    let mut seen = HashSet::with_capacity(responses.len());
    let mut out = Vec::with_capacity(responses.len());

    for (index, response) in responses.iter().enumerate() {
        if !in_range(response.value) {
            return Err(ScoringError::OutOfRange {
                index,
                value: response.value,
            });
        }
        let item = resolve_response(registry, index, response)?;
        if !seen.insert(item.canonical_id) {
            return Err(ScoringError::DuplicateItem {
                index,
                item: item.canonical_id,
            });
        }
        out.push(NormalizedResponse {
            canonical_id: item.canonical_id,
            schema: item.schema,
            raw: response.value,
            value: effective_value(response.value, item.reverse),
            weight: item.weight,
        });
    }

    Ok(out)
}

// ============================================================================
// JSON ingestion
// ============================================================================

/// Read a response set from JSON.
///
/// Accepted shapes:
/// - `{ "<key>": 4, "<key>": { "value": 5 }, ... }`
/// - `[ { "itemId": "...", "value": 4 }, ... ]`
///
/// Values that are not integers are reported as malformed, naming the index
/// and the text that was sent.
pub fn parse_response_map(value: &Value) -> Result<Vec<RawResponse>, ScoringError> {
    match value {
        Value::Object(map) => map
            .iter()
            .enumerate()
            .map(|(index, (key, v))| {
                let value = response_value(index, v)?;
                Ok(RawResponse::by_key(key, value))
            })
            .collect(),
        Value::Array(rows) => rows
            .iter()
            .enumerate()
            .map(|(index, row)| {
                let Some(obj) = row.as_object() else {
                    return Err(ScoringError::MalformedInput(format!(
                        "response {index} is not an object"
                    )));
                };
                let value = response_value(index, obj.get("value").unwrap_or(&Value::Null))?;
                let text = |field: &str| obj.get(field).and_then(Value::as_str).map(str::to_string);
                Ok(RawResponse {
                    item_id: text("itemId"),
                    canonical_id: text("canonicalId"),
                    position: obj
                        .get("position")
                        .and_then(Value::as_u64)
                        .and_then(|p| u32::try_from(p).ok()),
                    value,
                })
            })
            .collect(),
        _ => Err(ScoringError::MalformedInput(
            "expected an object or an array of responses".to_string(),
        )),
    }
}

fn response_value(index: usize, v: &Value) -> Result<i64, ScoringError> {
    let inner = match v {
        Value::Object(obj) => obj.get("value").unwrap_or(&Value::Null),
        other => other,
    };
    let parsed = match inner {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    // 4.5, "four", null: not a Likert answer at all
    parsed.ok_or_else(|| {
        ScoringError::MalformedInput(format!("response {index}: value {inner} is not an integer"))
    })
}
