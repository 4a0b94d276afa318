//! Identity resolution: every accepted item key form funnels through here.
//!
//! Three key forms are accepted, tried in this order:
//! 1. opaque id (`itm_` + 8 lowercase hex), looked up in the registry,
//! 2. canonical `domain.sub.question` id,
//! 3. legacy 1-based position in canonical order.
//!
//! A key matching none of them is an error; it is never guessed or dropped.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ScoringError;
use crate::registry::{ItemDescriptor, Registry};
use crate::taxonomy::CanonicalId;

fn opaque_id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^itm_[0-9a-f]{8}$").expect("static regex"))
}

fn legacy_position_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[0-9]{1,4}$").expect("static regex"))
}

pub fn is_opaque_id(s: &str) -> bool {
    opaque_id_pattern().is_match(s)
}

/// A classified item key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ItemKey {
    Opaque(String),
    Canonical(CanonicalId),
    Legacy(u32),
}

impl ItemKey {
    /// Classify a bare string key by shape.
    ///
    /// Anything that is neither a canonical id nor a plain integer is kept as
    /// an opaque candidate; whether it exists is the registry's call.
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if is_opaque_id(trimmed) {
            return ItemKey::Opaque(trimmed.to_string());
        }
        if let Ok(id) = trimmed.parse::<CanonicalId>() {
            return ItemKey::Canonical(id);
        }
        if legacy_position_pattern().is_match(trimmed) {
            if let Ok(position) = trimmed.parse::<u32>() {
                return ItemKey::Legacy(position);
            }
        }
        ItemKey::Opaque(trimmed.to_string())
    }
}

impl fmt::Display for ItemKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKey::Opaque(id) => f.write_str(id),
            ItemKey::Canonical(id) => write!(f, "{id}"),
            ItemKey::Legacy(position) => write!(f, "#{position}"),
        }
    }
}

/// One raw answer as it arrives from the quiz UI or a stored row.
///
/// Only one identity field is expected; if several are set, the priority is
/// `item_id` > `canonical_id` > `position`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    pub value: i64,
}

impl RawResponse {
    pub fn by_key(key: &str, value: i64) -> Self {
        match ItemKey::parse(key) {
            ItemKey::Opaque(id) => Self {
                item_id: Some(id),
                value,
                ..Default::default()
            },
            ItemKey::Canonical(id) => Self {
                canonical_id: Some(id.to_string()),
                value,
                ..Default::default()
            },
            ItemKey::Legacy(position) => Self {
                position: Some(position),
                value,
                ..Default::default()
            },
        }
    }

    /// The key that resolution will use, or `None` if no identity field is set.
    pub fn key(&self) -> Option<ItemKey> {
        if let Some(id) = self.item_id.as_deref().filter(|s| !s.trim().is_empty()) {
            return Some(ItemKey::Opaque(id.trim().to_string()));
        }
        if let Some(id) = self.canonical_id.as_deref().filter(|s| !s.trim().is_empty()) {
            return Some(match id.parse::<CanonicalId>() {
                Ok(id) => ItemKey::Canonical(id),
                // keep the bad text so the error names it
                Err(_) => ItemKey::Opaque(id.trim().to_string()),
            });
        }
        self.position.map(ItemKey::Legacy)
    }

    fn describe_key(&self) -> String {
        self.key()
            .map(|k| k.to_string())
            .unwrap_or_else(|| "<none>".to_string())
    }
}

/// Resolve one key to its descriptor.
pub fn resolve<'r>(
    registry: &'r Registry,
    key: &ItemKey,
) -> Option<&'r ItemDescriptor> {
    registry.lookup(key)
}

/// Resolve a bare string key to its canonical id.
pub fn resolve_str(registry: &Registry, raw: &str) -> Option<CanonicalId> {
    resolve(registry, &ItemKey::parse(raw)).map(|item| item.canonical_id)
}

/// Resolve the response at `index`, reporting an unmappable key against it.
pub fn resolve_response<'r>(
    registry: &'r Registry,
    index: usize,
    response: &RawResponse,
) -> Result<&'r ItemDescriptor, ScoringError> {
    response
        .key()
        .and_then(|key| resolve(registry, &key))
        .ok_or_else(|| ScoringError::UnmappableKey {
            index,
            key: response.describe_key(),
        })
}
