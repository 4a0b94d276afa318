//! Per-schema aggregation: weighted mean on the 1..6 scale and the 0..100
//! activation index.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Incompleteness, ScoringError};
use crate::normalize::NormalizedResponse;
use crate::registry::Registry;
use crate::taxonomy::{Domain, SchemaId, ITEMS_PER_SCHEMA, ITEM_COUNT, MAX_VALUE, MIN_VALUE};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AggregateOptions {
    /// Use item weights. Off by default: every shipped weight is 1.
    pub apply_weights: bool,
    /// Finished-assessment mode: every schema needs all of its items.
    pub require_completeness: bool,
    /// Round the index to a whole number. Leave off unless a caller really
    /// needs integers; ranking and thresholds compare full precision.
    pub round_index: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self {
            apply_weights: false,
            require_completeness: true,
            round_index: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaScore {
    pub schema: SchemaId,
    pub domain: Domain,
    pub label: String,
    /// Responses that contributed.
    pub n: usize,
    /// Weighted mean on the 1..6 scale.
    pub mean: f64,
    /// Linear rescale of `mean` onto 0..100.
    pub index: f64,
}

impl SchemaScore {
    pub fn is_complete(&self) -> bool {
        self.n == ITEMS_PER_SCHEMA
    }
}

/// `(mean - 1) / 5 * 100`.
pub fn activation_index(mean: f64) -> f64 {
    let span = (MAX_VALUE - MIN_VALUE) as f64;
    (mean - MIN_VALUE as f64) / span * 100.0
}

#[derive(Default)]
struct Accumulator {
    n: usize,
    weighted_sum: f64,
    weight_total: f64,
}

/// Group normalized responses by schema and score each group.
///
/// Scores come back in canonical schema order. In partial mode a schema with
/// no responses is left out rather than reported with an undefined mean.
pub fn aggregate(
    registry: &Registry,
    responses: &[NormalizedResponse],
    options: AggregateOptions,
) -> Result<Vec<SchemaScore>, ScoringError> {
    let mut groups: BTreeMap<SchemaId, Accumulator> = BTreeMap::new();
    for response in responses {
        let weight = if options.apply_weights {
            response.weight
        } else {
            1.0
        };
        let acc = groups.entry(response.schema).or_default();
        acc.n += 1;
        acc.weighted_sum += response.value as f64 * weight;
        acc.weight_total += weight;
    }

    if options.require_completeness {
        for schema in SchemaId::ALL {
            let found = groups.get(&schema).map_or(0, |acc| acc.n);
            if found != ITEMS_PER_SCHEMA {
                return Err(ScoringError::Incomplete(Incompleteness::Schema {
                    schema,
                    found,
                    expected: ITEMS_PER_SCHEMA,
                }));
            }
        }
        if responses.len() != ITEM_COUNT {
            return Err(ScoringError::Incomplete(Incompleteness::Total {
                found: responses.len(),
                expected: ITEM_COUNT,
            }));
        }
    }

    let scores = groups
        .into_iter()
        .filter(|(_, acc)| acc.n > 0 && acc.weight_total > 0.0)
        .map(|(schema, acc)| {
            let mean = acc.weighted_sum / acc.weight_total;
            let mut index = activation_index(mean);
            if options.round_index {
                index = index.round();
            }
            SchemaScore {
                schema,
                domain: schema.domain(),
                label: registry.label(schema).to_string(),
                n: acc.n,
                mean,
                index,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(
        schemas = scores.len(),
        responses = responses.len(),
        strict = options.require_completeness,
        "aggregated schema scores"
    );

    Ok(scores)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::RawResponse;
    use crate::normalize::normalize;
    use crate::registry::TaxonomyFileV1;
    use approx::assert_relative_eq;

    fn all_items(value: i64) -> Vec<RawResponse> {
        Registry::load()
            .unwrap()
            .items()
            .iter()
            .map(|item| RawResponse::by_key(&item.opaque_id, value))
            .collect()
    }

    #[test]
    fn index_is_linear_over_the_scale() {
        assert_relative_eq!(activation_index(1.0), 0.0);
        assert_relative_eq!(activation_index(6.0), 100.0);
        assert_relative_eq!(activation_index(3.5), 50.0);
        assert_relative_eq!(activation_index(4.0), 60.0);
        let mut last = -1.0;
        for step in 0..=50 {
            let index = activation_index(1.0 + step as f64 * 0.1);
            assert!(index > last);
            last = index;
        }
    }

    #[test]
    fn complete_set_yields_eighteen_full_scores() {
        let registry = Registry::load().unwrap();
        let normalized = normalize(registry, &all_items(4)).unwrap();
        let scores = aggregate(registry, &normalized, AggregateOptions::default()).unwrap();
        assert_eq!(scores.len(), 18);
        for score in &scores {
            assert_eq!(score.n, 6);
            assert!(score.is_complete());
            assert_relative_eq!(score.mean, 4.0);
            assert_relative_eq!(score.index, 60.0);
        }
        let order: Vec<SchemaId> = scores.iter().map(|s| s.schema).collect();
        assert_eq!(order, SchemaId::ALL.to_vec());
    }

    #[test]
    fn index_keeps_full_precision_unless_rounding_requested() {
        let registry = Registry::load().unwrap();
        let mut raw = all_items(4);
        // 1.1.1 -> 5: abandonment mean = 25/6
        raw[0].value = 5;
        let normalized = normalize(registry, &raw).unwrap();

        let precise = aggregate(registry, &normalized, AggregateOptions::default()).unwrap();
        assert_relative_eq!(precise[0].index, (25.0 / 6.0 - 1.0) / 5.0 * 100.0);
        assert!(precise[0].index.fract() != 0.0);

        let rounded = aggregate(
            registry,
            &normalized,
            AggregateOptions {
                round_index: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_relative_eq!(rounded[0].index, 63.0);
    }

    #[test]
    fn missing_item_names_the_short_schema() {
        let registry = Registry::load().unwrap();
        let mut raw = all_items(4);
        // drop 2.4.3 (failure)
        raw.retain(|r| r.item_id.as_deref() != Some(registry.items()[50].opaque_id.as_str()));
        assert_eq!(raw.len(), 107);
        let normalized = normalize(registry, &raw).unwrap();
        let err = aggregate(registry, &normalized, AggregateOptions::default()).unwrap_err();
        assert_eq!(
            err,
            ScoringError::Incomplete(Incompleteness::Schema {
                schema: SchemaId::Failure,
                found: 5,
                expected: 6
            })
        );
    }

    #[test]
    fn partial_mode_scores_the_subset_and_reports_n() {
        let registry = Registry::load().unwrap();
        let raw = vec![
            RawResponse::by_key("1.1.1", 6),
            RawResponse::by_key("1.1.2", 4),
            RawResponse::by_key("5.4.1", 1),
        ];
        let normalized = normalize(registry, &raw).unwrap();
        let scores = aggregate(
            registry,
            &normalized,
            AggregateOptions {
                require_completeness: false,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[0].schema, SchemaId::AbandonmentInstability);
        assert_eq!(scores[0].n, 2);
        assert_relative_eq!(scores[0].mean, 5.0);
        assert!(!scores[0].is_complete());
        assert_eq!(scores[1].schema, SchemaId::Punitiveness);
        assert_relative_eq!(scores[1].index, 0.0);
    }

    #[test]
    fn weights_only_apply_when_asked() {
        let mut file = TaxonomyFileV1::embedded().unwrap();
        file.items[0].weight = 3.0;
        let registry = Registry::from_taxonomy(file).unwrap();
        let raw = vec![
            RawResponse::by_key("1.1.1", 6),
            RawResponse::by_key("1.1.2", 2),
        ];
        let normalized = normalize(&registry, &raw).unwrap();
        let partial = AggregateOptions {
            require_completeness: false,
            ..Default::default()
        };

        let unweighted = aggregate(&registry, &normalized, partial).unwrap();
        assert_relative_eq!(unweighted[0].mean, 4.0);

        let weighted = aggregate(
            &registry,
            &normalized,
            AggregateOptions {
                apply_weights: true,
                ..partial
            },
        )
        .unwrap();
        assert_relative_eq!(weighted[0].mean, (6.0 * 3.0 + 2.0) / 4.0);
    }
}
