//! Export payload v1: the wire contract with the Studio importer.

use std::collections::HashSet;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use schemata_core::normalize::{effective_value, in_range, normalize, NormalizedResponse};
use schemata_core::{CanonicalId, ItemDescriptor, RawResponse, Registry, ScoringError, ITEM_COUNT};

use crate::canonical::payload_checksum;

/// Version of the payload layout itself (independent of the mapping version).
pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayloadV1 {
    pub schema_version: String,
    pub mapping_version: String,
    pub respondent: RespondentV1,
    pub assessment: AssessmentV1,
    pub provenance: ProvenanceV1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RespondentV1 {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentV1 {
    pub id: String,
    pub completed_at: Option<String>,
    pub instrument: InstrumentV1,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstrumentV1 {
    pub items: Vec<ExportItemV1>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportItemV1 {
    /// Opaque item id.
    pub id: String,
    pub canonical_id: String,
    /// Raw answer, before any reverse scoring.
    pub value: i64,
    /// 1-based legacy position.
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvenanceV1 {
    pub exported_at: String,
    pub checksum_sha256: String,
}

/// Caller-supplied context for an export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportMetadata {
    pub respondent_id: String,
    pub assessment_id: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub exported_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExportError {
    #[error("export needs exactly {expected} responses, got {actual}")]
    WrongCount { expected: usize, actual: usize },

    #[error(transparent)]
    Response(#[from] ScoringError),

    #[error("completedAt {completed_at} is after exportedAt {exported_at}")]
    TimestampOrder {
        completed_at: String,
        exported_at: String,
    },

    #[error("response {index}: item {item} disagrees with the registry ({detail})")]
    RegistryMismatch {
        index: usize,
        item: CanonicalId,
        detail: String,
    },

    #[error("failed to serialize export payload: {0}")]
    Serialization(String),
}

/// RFC 3339, UTC, whole seconds, `Z` suffix.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.trunc_subsecs(0).to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl ExportPayloadV1 {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_value(&self) -> Result<serde_json::Value, ExportError> {
        serde_json::to_value(self).map_err(|e| ExportError::Serialization(e.to_string()))
    }

    /// Recompute the checksum from the current body.
    pub fn compute_checksum(&self) -> Result<String, ExportError> {
        Ok(payload_checksum(&self.to_value()?))
    }
}

/// Build a sealed payload from raw responses in any accepted key form.
pub fn build_export(
    registry: &Registry,
    responses: &[RawResponse],
    metadata: &ExportMetadata,
) -> Result<ExportPayloadV1, ExportError> {
    if responses.len() != ITEM_COUNT {
        return Err(ExportError::WrongCount {
            expected: ITEM_COUNT,
            actual: responses.len(),
        });
    }
    let normalized = normalize(registry, responses)?;
    build_export_from_normalized(registry, &normalized, metadata)
}

/// Build a sealed payload from already-normalized responses.
///
/// Every entry is checked against the registry again (range, uniqueness,
/// schema, reverse-scored value), since the slice may not have come from
/// [`normalize`]. Items are written in canonical id order (numeric per
/// segment) and carry the raw answer, so the importer can re-run its own
/// reverse scoring.
pub fn build_export_from_normalized(
    registry: &Registry,
    normalized: &[NormalizedResponse],
    metadata: &ExportMetadata,
) -> Result<ExportPayloadV1, ExportError> {
    if normalized.len() != ITEM_COUNT {
        return Err(ExportError::WrongCount {
            expected: ITEM_COUNT,
            actual: normalized.len(),
        });
    }

    let exported_at = metadata.exported_at.trunc_subsecs(0);
    let completed_at = metadata.completed_at.map(|ts| ts.trunc_subsecs(0));
    if let Some(completed) = completed_at {
        if completed > exported_at {
            return Err(ExportError::TimestampOrder {
                completed_at: format_timestamp(completed),
                exported_at: format_timestamp(exported_at),
            });
        }
    }

    let mut seen = HashSet::with_capacity(ITEM_COUNT);
    let mut resolved: Vec<(&ItemDescriptor, i64)> = Vec::with_capacity(ITEM_COUNT);
    for (index, response) in normalized.iter().enumerate() {
        let item = checked_item(registry, index, response)?;
        if !seen.insert(item.canonical_id) {
            return Err(ScoringError::DuplicateItem {
                index,
                item: item.canonical_id,
            }
            .into());
        }
        resolved.push((item, response.raw));
    }
    resolved.sort_by_key(|(item, _)| item.canonical_id);

    let items = resolved
        .into_iter()
        .map(|(item, raw)| ExportItemV1 {
            id: item.opaque_id.clone(),
            canonical_id: item.canonical_id.to_string(),
            value: raw,
            index: item.position,
        })
        .collect();

    let mut payload = ExportPayloadV1 {
        schema_version: SCHEMA_VERSION.to_string(),
        mapping_version: registry.mapping_version().to_string(),
        respondent: RespondentV1 {
            id: metadata.respondent_id.clone(),
        },
        assessment: AssessmentV1 {
            id: metadata.assessment_id.clone(),
            completed_at: completed_at.map(format_timestamp),
            instrument: InstrumentV1 { items },
        },
        provenance: ProvenanceV1 {
            exported_at: format_timestamp(exported_at),
            checksum_sha256: String::new(),
        },
    };
    payload.provenance.checksum_sha256 = payload.compute_checksum()?;

    tracing::debug!(
        assessment = %payload.assessment.id,
        checksum = %payload.provenance.checksum_sha256,
        "built export payload"
    );

    Ok(payload)
}

fn checked_item<'r>(
    registry: &'r Registry,
    index: usize,
    response: &NormalizedResponse,
) -> Result<&'r ItemDescriptor, ExportError> {
    if !in_range(response.raw) {
        return Err(ScoringError::OutOfRange {
            index,
            value: response.raw,
        }
        .into());
    }
    let item = registry
        .by_canonical(response.canonical_id)
        .ok_or_else(|| ScoringError::UnmappableKey {
            index,
            key: response.canonical_id.to_string(),
        })?;

    let mismatch = |detail: String| ExportError::RegistryMismatch {
        index,
        item: item.canonical_id,
        detail,
    };
    if response.schema != item.schema {
        return Err(mismatch(format!(
            "schema {} instead of {}",
            response.schema, item.schema
        )));
    }
    let expected = effective_value(response.raw, item.reverse);
    if response.value != expected {
        return Err(mismatch(format!(
            "scored value {} for raw {}, expected {expected}",
            response.value, response.raw
        )));
    }
    Ok(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn metadata() -> ExportMetadata {
        ExportMetadata {
            respondent_id: "resp-1".to_string(),
            assessment_id: "asmt-1".to_string(),
            completed_at: Some(Utc.with_ymd_and_hms(2026, 3, 1, 9, 30, 0).unwrap()),
            exported_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
        }
    }

    fn full_set() -> Vec<RawResponse> {
        Registry::load()
            .unwrap()
            .items()
            .iter()
            .map(|item| RawResponse::by_key(&item.opaque_id, 1 + (item.position as i64 % 6)))
            .collect()
    }

    #[test]
    fn payload_is_sorted_and_sealed() {
        let registry = Registry::load().unwrap();
        let mut responses = full_set();
        responses.reverse();
        let payload = build_export(registry, &responses, &metadata()).unwrap();

        let items = &payload.assessment.instrument.items;
        assert_eq!(items.len(), ITEM_COUNT);
        let positions: Vec<u32> = items.iter().map(|i| i.index).collect();
        assert_eq!(positions, (1..=ITEM_COUNT as u32).collect::<Vec<_>>());
        assert_eq!(items[0].canonical_id, "1.1.1");

        assert_eq!(payload.provenance.checksum_sha256.len(), 64);
        assert_eq!(
            payload.provenance.checksum_sha256,
            payload.compute_checksum().unwrap()
        );
        assert_eq!(payload.provenance.exported_at, "2026-03-01T10:00:00Z");
        assert_eq!(
            payload.assessment.completed_at.as_deref(),
            Some("2026-03-01T09:30:00Z")
        );
    }

    #[test]
    fn subsecond_input_is_truncated() {
        let registry = Registry::load().unwrap();
        let mut meta = metadata();
        meta.exported_at = Utc
            .timestamp_millis_opt(1_772_359_200_123)
            .single()
            .unwrap();
        let payload = build_export(registry, &full_set(), &meta).unwrap();
        assert!(!payload.provenance.exported_at.contains('.'));
        assert!(payload.provenance.exported_at.ends_with('Z'));
    }

    #[test]
    fn wrong_count_is_rejected() {
        let registry = Registry::load().unwrap();
        let mut responses = full_set();
        responses.pop();
        assert_eq!(
            build_export(registry, &responses, &metadata()).unwrap_err(),
            ExportError::WrongCount {
                expected: 108,
                actual: 107
            }
        );
    }

    #[test]
    fn completed_after_export_is_rejected() {
        let registry = Registry::load().unwrap();
        let mut meta = metadata();
        meta.completed_at = Some(meta.exported_at + chrono::Duration::seconds(1));
        assert!(matches!(
            build_export(registry, &full_set(), &meta),
            Err(ExportError::TimestampOrder { .. })
        ));
    }

    fn normalized_set() -> Vec<NormalizedResponse> {
        normalize(Registry::load().unwrap(), &full_set()).unwrap()
    }

    #[test]
    fn normalized_builder_matches_raw_builder() {
        let registry = Registry::load().unwrap();
        let mut normalized = normalized_set();
        normalized.reverse();
        assert_eq!(
            build_export_from_normalized(registry, &normalized, &metadata()).unwrap(),
            build_export(registry, &full_set(), &metadata()).unwrap()
        );
    }

    #[test]
    fn normalized_builder_rejects_out_of_range_raw() {
        let registry = Registry::load().unwrap();
        let mut normalized = normalized_set();
        normalized[0].raw = 9;
        normalized[0].value = 9;
        assert_eq!(
            build_export_from_normalized(registry, &normalized, &metadata()).unwrap_err(),
            ExportError::Response(ScoringError::OutOfRange { index: 0, value: 9 })
        );
    }

    #[test]
    fn normalized_builder_rejects_non_adjacent_duplicate() {
        let registry = Registry::load().unwrap();
        let mut normalized = normalized_set();
        normalized[90] = normalized[3].clone();
        assert_eq!(
            build_export_from_normalized(registry, &normalized, &metadata()).unwrap_err(),
            ExportError::Response(ScoringError::DuplicateItem {
                index: 90,
                item: normalized[3].canonical_id
            })
        );
    }

    #[test]
    fn normalized_builder_rejects_entries_that_disagree_with_registry() {
        let registry = Registry::load().unwrap();

        let mut wrong_schema = normalized_set();
        wrong_schema[0].schema = schemata_core::SchemaId::Punitiveness;
        assert!(matches!(
            build_export_from_normalized(registry, &wrong_schema, &metadata()),
            Err(ExportError::RegistryMismatch { index: 0, .. })
        ));

        // 1.1.1 is not reversed: raw 2 must stay 2, a flipped 5 is inconsistent.
        let mut flipped = normalized_set();
        assert_eq!(flipped[0].raw, 2);
        flipped[0].value = 5;
        assert!(matches!(
            build_export_from_normalized(registry, &flipped, &metadata()),
            Err(ExportError::RegistryMismatch { index: 0, .. })
        ));
    }

    #[test]
    fn out_of_range_value_is_rejected() {
        let registry = Registry::load().unwrap();
        let mut responses = full_set();
        responses[7].value = 9;
        assert_eq!(
            build_export(registry, &responses, &metadata()).unwrap_err(),
            ExportError::Response(ScoringError::OutOfRange { index: 7, value: 9 })
        );
    }
}
