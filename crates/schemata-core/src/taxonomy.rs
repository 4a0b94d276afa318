//! Closed enumerations for the schema taxonomy, plus the canonical item id.
//!
//! The registry data file names domains and schemas by their snake_case keys;
//! once parsed, downstream code only ever sees these enums, so an unknown
//! schema can't reach the aggregator or ranker.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Number of higher-level domains.
pub const DOMAIN_COUNT: usize = 5;

/// Number of schemas across all domains.
pub const SCHEMA_COUNT: usize = 18;

/// Items backing each schema.
pub const ITEMS_PER_SCHEMA: usize = 6;

/// Total questionnaire length.
pub const ITEM_COUNT: usize = SCHEMA_COUNT * ITEMS_PER_SCHEMA;

/// Lowest and highest accepted Likert values.
pub const MIN_VALUE: i64 = 1;
pub const MAX_VALUE: i64 = 6;

// ============================================================================
// Domains
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    DisconnectionRejection,
    ImpairedAutonomy,
    ImpairedLimits,
    OtherDirectedness,
    OvervigilanceInhibition,
}

impl Domain {
    pub const ALL: [Domain; DOMAIN_COUNT] = [
        Domain::DisconnectionRejection,
        Domain::ImpairedAutonomy,
        Domain::ImpairedLimits,
        Domain::OtherDirectedness,
        Domain::OvervigilanceInhibition,
    ];

    /// 1-based domain number used in canonical ids.
    pub fn number(self) -> u8 {
        match self {
            Domain::DisconnectionRejection => 1,
            Domain::ImpairedAutonomy => 2,
            Domain::ImpairedLimits => 3,
            Domain::OtherDirectedness => 4,
            Domain::OvervigilanceInhibition => 5,
        }
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|d| d.number() == n)
    }

    /// How many schemas this domain owns.
    pub fn schema_count(self) -> usize {
        SchemaId::ALL.iter().filter(|s| s.domain() == self).count()
    }

    pub fn key(self) -> &'static str {
        match self {
            Domain::DisconnectionRejection => "disconnection_rejection",
            Domain::ImpairedAutonomy => "impaired_autonomy",
            Domain::ImpairedLimits => "impaired_limits",
            Domain::OtherDirectedness => "other_directedness",
            Domain::OvervigilanceInhibition => "overvigilance_inhibition",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Schemas
// ============================================================================

/// One of the 18 schema identities, in canonical (domain, sub) order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaId {
    AbandonmentInstability,
    MistrustAbuse,
    EmotionalDeprivation,
    DefectivenessShame,
    SocialIsolation,
    DependenceIncompetence,
    VulnerabilityToHarm,
    Enmeshment,
    Failure,
    EntitlementGrandiosity,
    InsufficientSelfControl,
    Subjugation,
    SelfSacrifice,
    ApprovalSeeking,
    NegativityPessimism,
    EmotionalInhibition,
    UnrelentingStandards,
    Punitiveness,
}

impl SchemaId {
    pub const ALL: [SchemaId; SCHEMA_COUNT] = [
        SchemaId::AbandonmentInstability,
        SchemaId::MistrustAbuse,
        SchemaId::EmotionalDeprivation,
        SchemaId::DefectivenessShame,
        SchemaId::SocialIsolation,
        SchemaId::DependenceIncompetence,
        SchemaId::VulnerabilityToHarm,
        SchemaId::Enmeshment,
        SchemaId::Failure,
        SchemaId::EntitlementGrandiosity,
        SchemaId::InsufficientSelfControl,
        SchemaId::Subjugation,
        SchemaId::SelfSacrifice,
        SchemaId::ApprovalSeeking,
        SchemaId::NegativityPessimism,
        SchemaId::EmotionalInhibition,
        SchemaId::UnrelentingStandards,
        SchemaId::Punitiveness,
    ];

    pub fn domain(self) -> Domain {
        use SchemaId::*;
        match self {
            AbandonmentInstability | MistrustAbuse | EmotionalDeprivation | DefectivenessShame
            | SocialIsolation => Domain::DisconnectionRejection,
            DependenceIncompetence | VulnerabilityToHarm | Enmeshment | Failure => {
                Domain::ImpairedAutonomy
            }
            EntitlementGrandiosity | InsufficientSelfControl => Domain::ImpairedLimits,
            Subjugation | SelfSacrifice | ApprovalSeeking => Domain::OtherDirectedness,
            NegativityPessimism | EmotionalInhibition | UnrelentingStandards | Punitiveness => {
                Domain::OvervigilanceInhibition
            }
        }
    }

    /// 1-based position of this schema within its domain.
    pub fn sub(self) -> u8 {
        let domain = self.domain();
        let position = Self::ALL
            .iter()
            .filter(|s| s.domain() == domain)
            .position(|s| *s == self)
            .unwrap_or(0);
        (position + 1) as u8
    }

    /// Position in [`SchemaId::ALL`], usable as a dense array index.
    pub fn ordinal(self) -> usize {
        self as usize
    }

    pub fn from_coordinates(domain: u8, sub: u8) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.domain().number() == domain && s.sub() == sub)
    }

    pub fn key(self) -> &'static str {
        use SchemaId::*;
        match self {
            AbandonmentInstability => "abandonment_instability",
            MistrustAbuse => "mistrust_abuse",
            EmotionalDeprivation => "emotional_deprivation",
            DefectivenessShame => "defectiveness_shame",
            SocialIsolation => "social_isolation",
            DependenceIncompetence => "dependence_incompetence",
            VulnerabilityToHarm => "vulnerability_to_harm",
            Enmeshment => "enmeshment",
            Failure => "failure",
            EntitlementGrandiosity => "entitlement_grandiosity",
            InsufficientSelfControl => "insufficient_self_control",
            Subjugation => "subjugation",
            SelfSacrifice => "self_sacrifice",
            ApprovalSeeking => "approval_seeking",
            NegativityPessimism => "negativity_pessimism",
            EmotionalInhibition => "emotional_inhibition",
            UnrelentingStandards => "unrelenting_standards",
            Punitiveness => "punitiveness",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|s| s.key() == key)
    }
}

impl fmt::Display for SchemaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ============================================================================
// Canonical item id
// ============================================================================

/// `domain.sub.question` triple.
///
/// Ordering is numeric per segment, so `2.4.10` sorts after `2.4.2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonicalId {
    pub domain: u8,
    pub sub: u8,
    pub question: u8,
}

impl CanonicalId {
    pub const fn new(domain: u8, sub: u8, question: u8) -> Self {
        Self {
            domain,
            sub,
            question,
        }
    }
}

impl Ord for CanonicalId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.domain, self.sub, self.question).cmp(&(other.domain, other.sub, other.question))
    }
}

impl PartialOrd for CanonicalId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for CanonicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.domain, self.sub, self.question)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a canonical item id: {0:?}")]
pub struct CanonicalIdParseError(pub String);

impl FromStr for CanonicalId {
    type Err = CanonicalIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || CanonicalIdParseError(s.to_string());
        let mut parts = s.trim().split('.');
        let mut segment = || -> Result<u8, CanonicalIdParseError> {
            let part = parts.next().ok_or_else(err)?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(err());
            }
            part.parse::<u8>().map_err(|_| err())
        };
        let id = CanonicalId::new(segment()?, segment()?, segment()?);
        if parts.next().is_some() {
            return Err(err());
        }
        Ok(id)
    }
}

impl Serialize for CanonicalId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for CanonicalId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
