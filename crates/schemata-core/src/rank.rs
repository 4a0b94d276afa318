//! Ranking and the primary / secondary / tertiary selection.
//!
//! Order: rounded index (descending), then position of the schema label in
//! the tie-break priority list, then the schema id string. The default list
//! comes from the registry's `tieBreakPriority` rows. The external
//! Studio scorer applies the same three keys, so both sides pick the same
//! top three for the same responses.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::aggregate::SchemaScore;
use crate::registry::Registry;

/// Default activation cut-off for the top-three selection.
pub const DEFAULT_ACTIVATION_THRESHOLD: f64 = 60.0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieBreakPolicy {
    priority: Vec<String>,
}

impl TieBreakPolicy {
    pub fn new(priority: impl IntoIterator<Item = String>) -> Self {
        Self {
            priority: priority.into_iter().collect(),
        }
    }

    /// Fixed clinical/display precedence declared in the taxonomy data.
    pub fn from_registry(registry: &Registry) -> Self {
        Self::new(
            registry
                .tie_break_priority()
                .iter()
                .map(|&schema| registry.label(schema).to_string()),
        )
    }

    pub fn priority(&self) -> &[String] {
        &self.priority
    }

    fn position(&self, label: &str) -> Option<usize> {
        self.priority.iter().position(|p| p == label)
    }

    /// Total order used by [`rank`]; `Less` means `a` ranks higher.
    pub fn compare(&self, a: &SchemaScore, b: &SchemaScore) -> Ordering {
        rounded(b.index)
            .cmp(&rounded(a.index))
            .then_with(|| match (self.position(&a.label), self.position(&b.label)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
            .then_with(|| a.schema.key().cmp(b.schema.key()))
    }
}

/// Index rounded half away from zero; the tie granularity.
pub fn rounded(index: f64) -> i64 {
    index.round() as i64
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingEntry {
    /// 1-based.
    pub rank: usize,
    #[serde(flatten)]
    pub score: SchemaScore,
}

pub fn rank(registry: &Registry, scores: &[SchemaScore]) -> Vec<RankingEntry> {
    rank_with(scores, &TieBreakPolicy::from_registry(registry))
}

pub fn rank_with(scores: &[SchemaScore], policy: &TieBreakPolicy) -> Vec<RankingEntry> {
    let mut sorted: Vec<&SchemaScore> = scores.iter().collect();
    sorted.sort_by(|a, b| policy.compare(a, b));
    sorted
        .into_iter()
        .enumerate()
        .map(|(i, score)| RankingEntry {
            rank: i + 1,
            score: score.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopPick {
    pub entry: RankingEntry,
    /// Index below the activation threshold. Callers decide whether to hide
    /// or annotate it.
    pub low_confidence: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Top3 {
    pub primary: Option<TopPick>,
    pub secondary: Option<TopPick>,
    pub tertiary: Option<TopPick>,
}

impl Top3 {
    pub fn picks(&self) -> impl Iterator<Item = &TopPick> {
        [&self.primary, &self.secondary, &self.tertiary]
            .into_iter()
            .flatten()
    }
}

/// Take the first three entries of an already ranked list.
pub fn select_top3(entries: &[RankingEntry], threshold: f64) -> Top3 {
    let mut picks = entries.iter().take(3).map(|entry| {
        let low_confidence = entry.score.index < threshold;
        if low_confidence {
            tracing::warn!(
                schema = %entry.score.schema,
                index = entry.score.index,
                threshold,
                "top-three schema below activation threshold"
            );
        }
        TopPick {
            entry: entry.clone(),
            low_confidence,
        }
    });
    Top3 {
        primary: picks.next(),
        secondary: picks.next(),
        tertiary: picks.next(),
    }
}
