//! Export payloads for finalized response sets.
//!
//! A finished assessment leaves the engine as an [`ExportPayloadV1`]: the 108
//! raw answers in canonical order, the payload and mapping versions, and a
//! SHA-256 checksum over the canonical JSON of everything else. The Studio
//! importer recomputes that checksum and rescoring from the same items must
//! reproduce our numbers, so the canonical form here is part of the contract.
//!
//! - [`build_export`] seals a payload (fails on anything but 108 valid answers).
//! - [`validate_export_value`] checks an incoming or outgoing payload and
//!   returns every problem it finds.
//! - [`verify_and_seal`] is the gate in front of persistence/transmission.

pub mod canonical;
pub mod payload;
pub mod validate;

pub use canonical::{payload_checksum, sha256_hex, to_canonical_json};
pub use payload::{
    build_export, build_export_from_normalized, format_timestamp, AssessmentV1, ExportError,
    ExportItemV1, ExportMetadata, ExportPayloadV1, InstrumentV1, ProvenanceV1, RespondentV1,
    SCHEMA_VERSION,
};
pub use validate::{
    validate_export, validate_export_value, verify_and_seal, ValidationIssue, MAX_ISSUES,
};
