use serde::{Deserialize, Serialize};

use crate::aggregate::AggregateOptions;
use crate::rank::{TieBreakPolicy, DEFAULT_ACTIVATION_THRESHOLD};
use crate::registry::Registry;

/// Scoring configuration. Every field has a default, so a config file only
/// needs to name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Index below which a top-three pick is flagged low-confidence.
    pub activation_threshold: f64,
    pub apply_weights: bool,
    pub require_completeness: bool,
    pub round_index: bool,
    /// Mapping version the caller built its responses against.
    pub expected_mapping_version: Option<String>,
    /// Score even when `expected_mapping_version` disagrees with the engine.
    pub bypass_version_check: bool,
    /// Replaces the built-in tie-break label order.
    pub tie_break_priority: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            activation_threshold: DEFAULT_ACTIVATION_THRESHOLD,
            apply_weights: false,
            require_completeness: true,
            round_index: false,
            expected_mapping_version: None,
            bypass_version_check: false,
            tie_break_priority: None,
        }
    }
}

impl EngineConfig {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// In-progress scoring: no completeness requirement.
    pub fn partial() -> Self {
        Self {
            require_completeness: false,
            ..Self::default()
        }
    }

    pub fn aggregate_options(&self) -> AggregateOptions {
        AggregateOptions {
            apply_weights: self.apply_weights,
            require_completeness: self.require_completeness,
            round_index: self.round_index,
        }
    }

    /// The configured label order, or the registry's declared one.
    pub fn tie_break_policy(&self, registry: &Registry) -> TieBreakPolicy {
        match &self.tie_break_priority {
            Some(priority) => TieBreakPolicy::new(priority.iter().cloned()),
            None => TieBreakPolicy::from_registry(registry),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_default() {
        assert_eq!(EngineConfig::from_json("{}").unwrap(), EngineConfig::default());
    }

    #[test]
    fn partial_fields_override_defaults() {
        let config = EngineConfig::from_json(
            r#"{ "activationThreshold": 55.5, "requireCompleteness": false }"#,
        )
        .unwrap();
        assert_eq!(config.activation_threshold, 55.5);
        assert!(!config.require_completeness);
        assert!(!config.apply_weights);
        let registry = Registry::load().unwrap();
        assert_eq!(
            config.tie_break_policy(registry),
            TieBreakPolicy::from_registry(registry)
        );
    }
}
