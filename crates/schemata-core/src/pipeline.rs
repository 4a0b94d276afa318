//! End-to-end scoring: version gate, normalize, aggregate, rank, top three.

use serde::{Deserialize, Serialize};

use crate::aggregate::{aggregate, SchemaScore};
use crate::config::EngineConfig;
use crate::error::ScoringError;
use crate::identity::RawResponse;
use crate::normalize::normalize;
use crate::rank::{rank_with, select_top3, RankingEntry, Top3};
use crate::registry::Registry;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoringOutcome {
    pub mapping_version: String,
    pub scores: Vec<SchemaScore>,
    pub ranking: Vec<RankingEntry>,
    pub top3: Top3,
}

/// Reject a caller built against another mapping release.
///
/// `None` means the caller did not state a version and is trusted to be
/// current.
pub fn check_mapping_version(
    registry: &Registry,
    caller_version: Option<&str>,
    bypass: bool,
) -> Result<(), ScoringError> {
    let Some(actual) = caller_version else {
        return Ok(());
    };
    if actual == registry.mapping_version() {
        return Ok(());
    }
    if bypass {
        tracing::warn!(
            caller = actual,
            engine = registry.mapping_version(),
            "mapping version mismatch bypassed by configuration"
        );
        return Ok(());
    }
    Err(ScoringError::VersionMismatch {
        expected: registry.mapping_version().to_string(),
        actual: actual.to_string(),
    })
}

pub fn score_responses(
    registry: &Registry,
    responses: &[RawResponse],
    config: &EngineConfig,
) -> Result<ScoringOutcome, ScoringError> {
    check_mapping_version(
        registry,
        config.expected_mapping_version.as_deref(),
        config.bypass_version_check,
    )?;

    let normalized = normalize(registry, responses)?;
    let scores = aggregate(registry, &normalized, config.aggregate_options())?;
    let ranking = rank_with(&scores, &config.tie_break_policy(registry));
    let top3 = select_top3(&ranking, config.activation_threshold);

    tracing::debug!(
        responses = responses.len(),
        primary = ?top3.primary.as_ref().map(|p| p.entry.score.schema),
        "scored response set"
    );

    Ok(ScoringOutcome {
        mapping_version: registry.mapping_version().to_string(),
        scores,
        ranking,
        top3,
    })
}
