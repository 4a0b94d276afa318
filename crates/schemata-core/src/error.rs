use thiserror::Error;

use crate::taxonomy::{CanonicalId, SchemaId};

/// The registry failed its own invariants.
///
/// Fatal: a process that sees this must not start serving scores.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MappingIntegrityError {
    #[error("taxonomy data is not valid JSON for the v1 layout: {0}")]
    Parse(String),

    #[error("mapping version {0:?} does not match the accepted pattern")]
    InvalidMappingVersion(String),

    #[error("domain {domain} is declared {count} times")]
    DomainDeclaration { domain: u8, count: usize },

    #[error("domain {domain} is keyed {actual:?}, expected {expected:?}")]
    DomainKey {
        domain: u8,
        expected: String,
        actual: String,
    },

    #[error("schema {schema} is declared {count} times (expected exactly once)")]
    SchemaDeclaration { schema: SchemaId, count: usize },

    #[error("schema {schema} declared at {domain}.{sub}, expected {expected_domain}.{expected_sub}")]
    SchemaCoordinates {
        schema: SchemaId,
        domain: u8,
        sub: u8,
        expected_domain: u8,
        expected_sub: u8,
    },

    #[error("expected {expected} items, found {actual}")]
    ItemCount { expected: usize, actual: usize },

    #[error("schema {schema} has {actual} items (expected {expected})")]
    SchemaItemCount {
        schema: SchemaId,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate canonical id {0}")]
    DuplicateCanonicalId(CanonicalId),

    #[error("duplicate opaque id {0:?}")]
    DuplicateOpaqueId(String),

    #[error("opaque id {0:?} does not match the item id pattern")]
    MalformedOpaqueId(String),

    #[error("item {item} belongs to {schema} but its id places it outside {schema}'s coordinates")]
    ItemOutsideSchema { item: CanonicalId, schema: SchemaId },

    #[error("item {0} has a question number outside 1..=6")]
    QuestionOutOfRange(CanonicalId),

    #[error("item {item} has invalid weight {weight}")]
    InvalidWeight { item: CanonicalId, weight: f64 },

    #[error("tie-break priority lists schema {schema} {count} times (expected exactly once)")]
    TieBreakPriority { schema: SchemaId, count: usize },

    #[error("persona key {key:?} maps to both {first} and {second}")]
    AmbiguousAlias {
        key: String,
        first: SchemaId,
        second: SchemaId,
    },
}

/// What a strict scoring pass found missing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Incompleteness {
    Schema {
        schema: SchemaId,
        found: usize,
        expected: usize,
    },
    Total { found: usize, expected: usize },
}

impl std::fmt::Display for Incompleteness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Incompleteness::Schema {
                schema,
                found,
                expected,
            } => write!(f, "schema {schema} has {found} of {expected} responses"),
            Incompleteness::Total { found, expected } => {
                write!(f, "{found} of {expected} responses present")
            }
        }
    }
}

/// Per-request scoring failure. Aborts the current call; nothing is partially
/// scored.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ScoringError {
    #[error("response {index}: key {key:?} does not resolve to any item")]
    UnmappableKey { index: usize, key: String },

    #[error("response {index}: value {value} is outside 1..=6")]
    OutOfRange { index: usize, value: i64 },

    #[error("response {index}: item {item} was already answered")]
    DuplicateItem { index: usize, item: CanonicalId },

    #[error("incomplete assessment: {0}")]
    Incomplete(Incompleteness),

    #[error("mapping version mismatch: caller built against {actual:?}, engine is {expected:?}")]
    VersionMismatch { expected: String, actual: String },

    #[error("malformed response set: {0}")]
    MalformedInput(String),
}

impl ScoringError {
    /// Text for the UI boundary. Details stay in logs.
    pub fn user_message(&self) -> &'static str {
        "This assessment is incomplete or corrupted and could not be scored."
    }
}
