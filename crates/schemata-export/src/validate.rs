//! Export payload validation.
//!
//! Works on raw JSON so a malformed payload produces issues rather than a
//! deserialization error. Every problem is collected (up to
//! [`MAX_ISSUES`]) so a caller can show all of them at once. A payload with
//! any issue must not be persisted or transmitted.

use std::collections::HashSet;
use std::sync::OnceLock;

use chrono::DateTime;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use schemata_core::identity::is_opaque_id;
use schemata_core::normalize::in_range;
use schemata_core::registry::is_mapping_version;
use schemata_core::{CanonicalId, Registry, ITEM_COUNT};

use crate::canonical::payload_checksum;
use crate::payload::{ExportPayloadV1, SCHEMA_VERSION};

/// Issues reported before the list is cut off.
pub const MAX_ISSUES: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub field: String,
    pub problem: String,
}

fn semver_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]+\.[0-9]+\.[0-9]+$").expect("static regex"))
}

fn checksum_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9a-f]{64}$").expect("static regex"))
}

#[derive(Default)]
struct Issues {
    list: Vec<ValidationIssue>,
    suppressed: usize,
}

impl Issues {
    fn push(&mut self, field: impl Into<String>, problem: impl Into<String>) {
        if self.list.len() < MAX_ISSUES {
            self.list.push(ValidationIssue {
                field: field.into(),
                problem: problem.into(),
            });
        } else {
            self.suppressed += 1;
        }
    }

    fn finish(mut self) -> Result<(), Vec<ValidationIssue>> {
        if self.suppressed > 0 {
            self.list.push(ValidationIssue {
                field: "$".to_string(),
                problem: format!("{} further problems not reported", self.suppressed),
            });
        }
        if self.list.is_empty() {
            Ok(())
        } else {
            Err(self.list)
        }
    }
}

fn non_empty_str<'v>(
    obj: &'v Map<String, Value>,
    key: &str,
    field: &str,
    issues: &mut Issues,
) -> Option<&'v str> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::String(_)) => {
            issues.push(field, "must not be empty");
            None
        }
        Some(_) => {
            issues.push(field, "must be a string");
            None
        }
        None => {
            issues.push(field, "is missing");
            None
        }
    }
}

fn object<'v>(
    parent: &'v Map<String, Value>,
    key: &str,
    field: &str,
    issues: &mut Issues,
) -> Option<&'v Map<String, Value>> {
    match parent.get(key) {
        Some(Value::Object(obj)) => Some(obj),
        Some(_) => {
            issues.push(field, "must be an object");
            None
        }
        None => {
            issues.push(field, "is missing");
            None
        }
    }
}

/// Parse a whole-second UTC RFC 3339 timestamp, reporting format problems.
fn timestamp(value: &str, field: &str, issues: &mut Issues) -> Option<i64> {
    match DateTime::parse_from_rfc3339(value) {
        Ok(ts) => {
            if value.contains('.') {
                issues.push(field, "must not carry sub-second precision");
            }
            if !value.ends_with('Z') {
                issues.push(field, "must be UTC with a `Z` suffix");
            }
            Some(ts.timestamp())
        }
        Err(e) => {
            issues.push(field, format!("is not an RFC 3339 timestamp: {e}"));
            None
        }
    }
}

fn check_versions(root: &Map<String, Value>, registry: &Registry, issues: &mut Issues) {
    if let Some(version) = non_empty_str(root, "schemaVersion", "schemaVersion", issues) {
        if !semver_pattern().is_match(version) {
            issues.push("schemaVersion", format!("{version:?} is not a MAJOR.MINOR.PATCH version"));
        } else if version != SCHEMA_VERSION {
            issues.push(
                "schemaVersion",
                format!("unsupported version {version} (expected {SCHEMA_VERSION})"),
            );
        }
    }

    if let Some(version) = non_empty_str(root, "mappingVersion", "mappingVersion", issues) {
        let current = registry.mapping_version();
        if !is_mapping_version(version) {
            issues.push("mappingVersion", format!("{version:?} is not a mapping version"));
        } else if version != current {
            issues.push(
                "mappingVersion",
                format!("stale mapping {version} (expected {current})"),
            );
        }
    }
}

fn check_item(
    registry: &Registry,
    i: usize,
    item: &Value,
    seen: &mut HashSet<String>,
    issues: &mut Issues,
) {
    let path = format!("assessment.instrument.items[{i}]");
    let Some(obj) = item.as_object() else {
        issues.push(path, "must be an object");
        return;
    };

    let descriptor = match non_empty_str(obj, "id", &format!("{path}.id"), issues) {
        Some(id) if !is_opaque_id(id) => {
            issues.push(format!("{path}.id"), format!("{id:?} does not match the item id pattern"));
            None
        }
        Some(id) => {
            if !seen.insert(id.to_string()) {
                issues.push(format!("{path}.id"), format!("duplicate item {id}"));
            }
            let found = registry.by_opaque(id);
            if found.is_none() {
                issues.push(format!("{path}.id"), format!("unknown item {id}"));
            }
            found
        }
        None => None,
    };

    if let Some(text) = non_empty_str(obj, "canonicalId", &format!("{path}.canonicalId"), issues) {
        match text.parse::<CanonicalId>() {
            Ok(cid) => {
                if let Some(d) = descriptor {
                    if d.canonical_id != cid {
                        issues.push(
                            format!("{path}.canonicalId"),
                            format!("{cid} does not match item {} ({})", d.opaque_id, d.canonical_id),
                        );
                    }
                }
            }
            Err(_) => issues.push(
                format!("{path}.canonicalId"),
                format!("{text:?} is not a domain.sub.question id"),
            ),
        }
    }

    match obj.get("index").and_then(Value::as_u64) {
        Some(index) => {
            if let Some(d) = descriptor {
                if index != d.position as u64 {
                    issues.push(
                        format!("{path}.index"),
                        format!("{index} does not match item position {}", d.position),
                    );
                }
            }
        }
        None => issues.push(format!("{path}.index"), "must be a positive integer"),
    }

    match obj.get("value").and_then(Value::as_i64) {
        Some(v) if in_range(v) => {}
        Some(v) => issues.push(format!("{path}.value"), format!("{v} is outside 1..=6")),
        None => issues.push(format!("{path}.value"), "must be an integer"),
    }
}

/// Validate a payload as raw JSON.
pub fn validate_export_value(registry: &Registry, payload: &Value) -> Result<(), Vec<ValidationIssue>> {
    let mut issues = Issues::default();
    let Some(root) = payload.as_object() else {
        issues.push("$", "payload must be a JSON object");
        return issues.finish();
    };

    check_versions(root, registry, &mut issues);

    if let Some(respondent) = object(root, "respondent", "respondent", &mut issues) {
        non_empty_str(respondent, "id", "respondent.id", &mut issues);
    }

    let mut completed_at = None;
    if let Some(assessment) = object(root, "assessment", "assessment", &mut issues) {
        non_empty_str(assessment, "id", "assessment.id", &mut issues);

        match assessment.get("completedAt") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => {
                completed_at = timestamp(s, "assessment.completedAt", &mut issues);
            }
            Some(_) => issues.push("assessment.completedAt", "must be a string or null"),
        }

        if let Some(instrument) =
            object(assessment, "instrument", "assessment.instrument", &mut issues)
        {
            match instrument.get("items") {
                Some(Value::Array(items)) => {
                    if items.len() != ITEM_COUNT {
                        issues.push(
                            "assessment.instrument.items",
                            format!("expected {ITEM_COUNT} items, found {}", items.len()),
                        );
                    }
                    let mut seen = HashSet::with_capacity(items.len());
                    for (i, item) in items.iter().enumerate() {
                        check_item(registry, i, item, &mut seen, &mut issues);
                    }
                }
                Some(_) => issues.push("assessment.instrument.items", "must be an array"),
                None => issues.push("assessment.instrument.items", "is missing"),
            }
        }
    }

    if let Some(provenance) = object(root, "provenance", "provenance", &mut issues) {
        let exported_at = non_empty_str(provenance, "exportedAt", "provenance.exportedAt", &mut issues)
            .and_then(|s| timestamp(s, "provenance.exportedAt", &mut issues));
        if let (Some(done), Some(exported)) = (completed_at, exported_at) {
            if done > exported {
                issues.push("assessment.completedAt", "is later than provenance.exportedAt");
            }
        }

        if let Some(checksum) =
            non_empty_str(provenance, "checksumSha256", "provenance.checksumSha256", &mut issues)
        {
            if !checksum_pattern().is_match(checksum) {
                issues.push(
                    "provenance.checksumSha256",
                    "must be 64 lowercase hex characters",
                );
            } else {
                let expected = payload_checksum(payload);
                if checksum != expected {
                    issues.push(
                        "provenance.checksumSha256",
                        "does not match the recomputed checksum",
                    );
                }
            }
        }
    }

    let result = issues.finish();
    if let Err(found) = &result {
        tracing::debug!(issues = found.len(), "export payload failed validation");
    }
    result
}

pub fn validate_export(registry: &Registry, payload: &ExportPayloadV1) -> Result<(), Vec<ValidationIssue>> {
    match serde_json::to_value(payload) {
        Ok(value) => validate_export_value(registry, &value),
        Err(e) => Err(vec![ValidationIssue {
            field: "$".to_string(),
            problem: format!("payload does not serialize: {e}"),
        }]),
    }
}

/// Validate, then render the payload for persistence or transmission.
pub fn verify_and_seal(registry: &Registry, payload: &ExportPayloadV1) -> Result<String, Vec<ValidationIssue>> {
    validate_export(registry, payload)?;
    serde_json::to_string_pretty(payload).map_err(|e| {
        vec![ValidationIssue {
            field: "$".to_string(),
            problem: format!("payload does not serialize: {e}"),
        }]
    })
}
