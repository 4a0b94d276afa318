//! Schemata scoring engine
//!
//! Turns a 108-item Likert response set into per-schema activation scores and
//! a deterministic ranking:
//!
//! ```text
//! raw responses ──► identity ──► normalize ──► aggregate ──► rank ──► top three
//!                      ▲             ▲              ▲           ▲
//!                      └─────────────┴── registry ──┴───────────┘
//!                                     (108 items, 18 schemas)
//! ```
//!
//! Everything here is a pure function of the response set and the registry.
//! The registry is the only shared state: built once on first use, validated,
//! then read-only. Same inputs, same mapping version, same outputs.
//!
//! Rendering, sessions and storage live elsewhere; export payloads are built
//! by `schemata-export` on top of this crate.

pub mod aggregate;
pub mod config;
pub mod error;
pub mod identity;
pub mod normalize;
pub mod persona;
pub mod pipeline;
pub mod rank;
pub mod registry;
pub mod taxonomy;

pub use aggregate::{aggregate, activation_index, AggregateOptions, SchemaScore};
pub use config::EngineConfig;
pub use error::{Incompleteness, MappingIntegrityError, ScoringError};
pub use identity::{ItemKey, RawResponse};
pub use normalize::{normalize, parse_response_map, NormalizedResponse};
pub use persona::{to_persona, Persona, PersonaTableV1};
pub use pipeline::{check_mapping_version, score_responses, ScoringOutcome};
pub use rank::{rank, rank_with, select_top3, RankingEntry, TieBreakPolicy, Top3, TopPick};
pub use registry::{ItemDescriptor, Registry};
pub use taxonomy::{CanonicalId, Domain, SchemaId, ITEM_COUNT, ITEMS_PER_SCHEMA, SCHEMA_COUNT};
