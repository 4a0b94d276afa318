//! Checksum stability across construction order, and sensitivity to edits.

use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use schemata_core::{RawResponse, Registry};
use schemata_export::{
    build_export, payload_checksum, validate_export, ExportMetadata, ExportPayloadV1,
};

fn metadata() -> ExportMetadata {
    ExportMetadata {
        respondent_id: "respondent-42".to_string(),
        assessment_id: "assessment-7".to_string(),
        completed_at: Some(Utc.with_ymd_and_hms(2026, 9, 30, 18, 0, 0).unwrap()),
        exported_at: Utc.with_ymd_and_hms(2026, 9, 30, 18, 5, 0).unwrap(),
    }
}

/// Value per canonical position, keyed three different ways.
fn keyed(values: &[i64], order: &[usize], form: u8) -> Vec<RawResponse> {
    let registry = Registry::load().unwrap();
    order
        .iter()
        .map(|&i| {
            let item = &registry.items()[i];
            let key = match form {
                0 => item.opaque_id.clone(),
                1 => item.canonical_id.to_string(),
                _ => item.position.to_string(),
            };
            RawResponse::by_key(&key, values[i])
        })
        .collect()
}

#[test]
fn response_map_order_does_not_change_checksum() {
    let registry = Registry::load().unwrap();
    let values: Vec<i64> = (0..108).map(|i| 1 + (i * 5 % 6)).collect();

    // A map keyed by opaque id iterates in a different order than canonical.
    let by_opaque: BTreeMap<String, i64> = registry
        .items()
        .iter()
        .map(|item| (item.opaque_id.clone(), values[item.position as usize - 1]))
        .collect();
    let from_map: Vec<RawResponse> = by_opaque
        .iter()
        .map(|(k, v)| RawResponse::by_key(k, *v))
        .collect();

    let canonical_order: Vec<usize> = (0..108).collect();
    let a = build_export(registry, &keyed(&values, &canonical_order, 1), &metadata()).unwrap();
    let b = build_export(registry, &from_map, &metadata()).unwrap();

    assert_eq!(a.provenance.checksum_sha256, b.provenance.checksum_sha256);
    assert_eq!(a, b);
    assert_eq!(validate_export(registry, &b), Ok(()));
}

#[test]
fn payload_round_trips_through_json_text() {
    let registry = Registry::load().unwrap();
    let values = vec![2; 108];
    let order: Vec<usize> = (0..108).rev().collect();
    let payload = build_export(registry, &keyed(&values, &order, 2), &metadata()).unwrap();

    let text = serde_json::to_string_pretty(&payload).unwrap();
    let parsed = ExportPayloadV1::from_json(&text).unwrap();
    assert_eq!(
        payload_checksum(&serde_json::from_str(&text).unwrap()),
        parsed.provenance.checksum_sha256
    );
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn checksum_is_order_independent_and_value_sensitive(
        values in proptest::collection::vec(1i64..=6, 108),
        order in Just((0..108usize).collect::<Vec<_>>()).prop_shuffle(),
        form in 0u8..3,
        victim in 0usize..108,
    ) {
        let registry = Registry::load().unwrap();
        let canonical_order: Vec<usize> = (0..108).collect();
        let a = build_export(registry, &keyed(&values, &canonical_order, 0), &metadata()).unwrap();
        let b = build_export(registry, &keyed(&values, &order, form), &metadata()).unwrap();
        prop_assert_eq!(&a.provenance.checksum_sha256, &b.provenance.checksum_sha256);

        let mut mutated = values.clone();
        mutated[victim] = if mutated[victim] == 6 { 1 } else { mutated[victim] + 1 };
        let c = build_export(registry, &keyed(&mutated, &canonical_order, 0), &metadata()).unwrap();
        prop_assert_ne!(&a.provenance.checksum_sha256, &c.provenance.checksum_sha256);
    }
}
