//! Configuration schemas: the three JSON files read once at controller
//! startup, plus the hard-coded defaults substituted when a file is absent.

use crate::error::{ConfigError, FractalResult};
use crate::{CalibrationExample, QueryType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One query type's slice of `policy_table.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypePolicyRecord {
    pub token_budget: BTreeMap<String, i64>,
    pub target_compression: f64,
    pub memory: MemoryDefaults,
    pub compression_ratio_range: (f64, f64),
    pub arbiter_rubric: BTreeMap<String, f64>,
}

/// The memory-policy constants a type contributes to the weighted blend.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryDefaults {
    pub split_threshold_base: f64,
    pub merge_threshold_base: f64,
    pub cache_depth: i64,
}

/// Operator-tunable floor/noise defaults applied across every type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SafetyDefaults {
    pub logic_floor_pct: f64,
    pub arbiter_noise_sigma: f64,
}

/// `policy_table.json`: per-type policy records plus the cross-layer
/// precedence order and shared safety defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyTable {
    pub version: String,
    pub types: BTreeMap<String, TypePolicyRecord>,
    pub cross_layer_precedence: Vec<String>,
    pub safety_defaults: SafetyDefaults,
}

impl PolicyTable {
    /// Validate structural invariants that the engine relies on: every
    /// `QueryType` has a record, the precedence list names every type
    /// exactly once, and every rubric sums to 1.0.
    pub fn validate(&self) -> FractalResult<()> {
        for qt in QueryType::ALL {
            let key = qt.to_string();
            let record = self.types.get(&key).ok_or_else(|| ConfigError::MissingTypeEntry {
                type_name: key.clone(),
            })?;

            let rubric_sum: f64 = record.arbiter_rubric.values().sum();
            if (rubric_sum - 1.0).abs() > 1e-6 {
                return Err(ConfigError::InvalidValue {
                    field: format!("types.{key}.arbiter_rubric"),
                    value: rubric_sum.to_string(),
                    reason: "arbiter_rubric weights must sum to 1.0".to_string(),
                }
                .into());
            }

            let (lo, hi) = record.compression_ratio_range;
            if !(lo > 0.0 && hi >= lo) {
                return Err(ConfigError::InvalidValue {
                    field: format!("types.{key}.compression_ratio_range"),
                    value: format!("({lo}, {hi})"),
                    reason: "compression_ratio_range must satisfy 0 < lo <= hi".to_string(),
                }
                .into());
            }
        }

        if self.cross_layer_precedence.len() != QueryType::ALL.len()
            || !QueryType::ALL
                .iter()
                .all(|qt| self.cross_layer_precedence.iter().any(|p| p == &qt.to_string()))
        {
            return Err(ConfigError::InvalidValue {
                field: "cross_layer_precedence".to_string(),
                value: self.cross_layer_precedence.join(","),
                reason: "must name every query type exactly once".to_string(),
            }
            .into());
        }

        if !(0.0..=1.0).contains(&self.safety_defaults.logic_floor_pct) {
            return Err(ConfigError::InvalidValue {
                field: "safety_defaults.logic_floor_pct".to_string(),
                value: self.safety_defaults.logic_floor_pct.to_string(),
                reason: "logic_floor_pct must be between 0.0 and 1.0".to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// The built-in table substituted when `policy_table.json` is absent.
    /// Per-type token splits favor the component that type leans on most
    /// heavily; the other numeric tables (fusion weights, lambda, knapsack
    /// weights) live in [`Thresholds::default`], not here.
    pub fn default_table() -> Self {
        let mut types = BTreeMap::new();
        types.insert(
            QueryType::PatternLanguage.to_string(),
            TypePolicyRecord {
                token_budget: BTreeMap::from([
                    ("error_epochs".to_string(), 400),
                    ("tone_analysis".to_string(), 900),
                    ("recent_context".to_string(), 1600),
                    ("aux_dependencies".to_string(), 600),
                ]),
                target_compression: 4.0,
                memory: MemoryDefaults {
                    split_threshold_base: 0.7,
                    merge_threshold_base: 0.3,
                    cache_depth: 4,
                },
                compression_ratio_range: (2.0, 6.0),
                arbiter_rubric: BTreeMap::from([
                    ("fluency".to_string(), 0.5),
                    ("style_match".to_string(), 0.3),
                    ("correctness".to_string(), 0.2),
                ]),
            },
        );
        types.insert(
            QueryType::Logic.to_string(),
            TypePolicyRecord {
                token_budget: BTreeMap::from([
                    ("error_epochs".to_string(), 1200),
                    ("tone_analysis".to_string(), 200),
                    ("recent_context".to_string(), 1400),
                    ("aux_dependencies".to_string(), 700),
                ]),
                target_compression: 1.5,
                memory: MemoryDefaults {
                    split_threshold_base: 0.5,
                    merge_threshold_base: 0.2,
                    cache_depth: 8,
                },
                compression_ratio_range: (1.0, 15.0),
                arbiter_rubric: BTreeMap::from([
                    ("correctness".to_string(), 0.6),
                    ("reasoning_trace".to_string(), 0.3),
                    ("fluency".to_string(), 0.1),
                ]),
            },
        );
        types.insert(
            QueryType::Creative.to_string(),
            TypePolicyRecord {
                token_budget: BTreeMap::from([
                    ("error_epochs".to_string(), 300),
                    ("tone_analysis".to_string(), 1100),
                    ("recent_context".to_string(), 1500),
                    ("aux_dependencies".to_string(), 600),
                ]),
                target_compression: 3.0,
                memory: MemoryDefaults {
                    split_threshold_base: 0.8,
                    merge_threshold_base: 0.4,
                    cache_depth: 5,
                },
                compression_ratio_range: (2.0, 8.0),
                arbiter_rubric: BTreeMap::from([
                    ("novelty".to_string(), 0.5),
                    ("coherence".to_string(), 0.3),
                    ("fluency".to_string(), 0.2),
                ]),
            },
        );
        types.insert(
            QueryType::Retrieval.to_string(),
            TypePolicyRecord {
                token_budget: BTreeMap::from([
                    ("error_epochs".to_string(), 300),
                    ("tone_analysis".to_string(), 200),
                    ("recent_context".to_string(), 1000),
                    ("aux_dependencies".to_string(), 2000),
                ]),
                target_compression: 2.0,
                memory: MemoryDefaults {
                    split_threshold_base: 0.6,
                    merge_threshold_base: 0.3,
                    cache_depth: 6,
                },
                compression_ratio_range: (1.0, 10.0),
                arbiter_rubric: BTreeMap::from([
                    ("provenance".to_string(), 0.5),
                    ("correctness".to_string(), 0.3),
                    ("fluency".to_string(), 0.2),
                ]),
            },
        );

        PolicyTable {
            version: "1.0.0-default".to_string(),
            types,
            cross_layer_precedence: vec![
                QueryType::Retrieval.to_string(),
                QueryType::Logic.to_string(),
                QueryType::PatternLanguage.to_string(),
                QueryType::Creative.to_string(),
            ],
            safety_defaults: SafetyDefaults {
                logic_floor_pct: 0.15,
                arbiter_noise_sigma: 0.02,
            },
        }
    }
}

/// The fusion weight matrix, one row per classifier head, columns
/// `[pattern_language, logic, creative, retrieval]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FusionWeights {
    pub lexical: [f64; 4],
    pub structural: [f64; 4],
    pub pragmatic: [f64; 4],
    pub uncertainty: [f64; 4],
    pub pattern_override: [f64; 4],
}

impl Default for FusionWeights {
    fn default() -> Self {
        FusionWeights {
            lexical: [0.25, 0.25, 0.25, 0.25],
            structural: [0.10, 0.40, 0.10, 0.40],
            pragmatic: [0.20, 0.30, 0.30, 0.20],
            uncertainty: [0.15, 0.35, 0.35, 0.15],
            pattern_override: [0.1, 0.7, 0.1, 0.1],
        }
    }
}

/// Per-type IB lambda, shared verbatim between the classifier's
/// policy-emission threshold and the allocator's guardrail.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LambdaTable {
    pub pattern_language: f64,
    pub logic: f64,
    pub creative: f64,
    pub retrieval: f64,
}

impl Default for LambdaTable {
    fn default() -> Self {
        LambdaTable {
            pattern_language: 0.5,
            logic: 1.0,
            creative: 0.6,
            retrieval: 1.2,
        }
    }
}

impl LambdaTable {
    pub fn get(&self, qt: QueryType) -> f64 {
        match qt {
            QueryType::PatternLanguage => self.pattern_language,
            QueryType::Logic => self.logic,
            QueryType::Creative => self.creative,
            QueryType::Retrieval => self.retrieval,
        }
    }
}

/// Retrieval safety rail constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRailThresholds {
    pub provenance_quota: usize,
    pub confidence_threshold: f64,
    pub contradiction_pairs: Vec<(String, String)>,
    pub citation_markers: Vec<String>,
    pub uncertain_template: String,
    pub clarifying_template: String,
}

impl Default for SafetyRailThresholds {
    fn default() -> Self {
        SafetyRailThresholds {
            provenance_quota: 3,
            confidence_threshold: 0.6,
            contradiction_pairs: [
                ("yes", "no"),
                ("true", "false"),
                ("correct", "incorrect"),
                ("valid", "invalid"),
                ("always", "never"),
            ]
            .into_iter()
            .map(|(a, b)| (a.to_string(), b.to_string()))
            .collect(),
            citation_markers: vec![
                "[".to_string(),
                "]".to_string(),
                "source:".to_string(),
                "according to".to_string(),
                "from".to_string(),
            ],
            uncertain_template: "I don't have enough reliable sources to answer confidently."
                .to_string(),
            clarifying_template: "Could you point me to a source, or narrow the question?"
                .to_string(),
        }
    }
}

/// `thresholds.json`: versioned tuning constants not covered by the
/// per-type policy table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    pub version: String,
    pub ece_bin_count: usize,
    pub ece_drift_threshold: f64,
    pub fusion_weights: FusionWeights,
    pub lambda_table: LambdaTable,
    pub safety_rails: SafetyRailThresholds,
    pub telemetry_ring_capacity: usize,
    pub entropy_warning_threshold: f64,
    pub churn_warning_rate: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Thresholds {
            version: "1.0.0-default".to_string(),
            ece_bin_count: 10,
            ece_drift_threshold: 0.10,
            fusion_weights: FusionWeights::default(),
            lambda_table: LambdaTable::default(),
            safety_rails: SafetyRailThresholds::default(),
            telemetry_ring_capacity: 200,
            entropy_warning_threshold: 0.5,
            churn_warning_rate: 0.15,
        }
    }
}

impl Thresholds {
    pub fn validate(&self) -> FractalResult<()> {
        if self.ece_bin_count == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ece_bin_count".to_string(),
                value: self.ece_bin_count.to_string(),
                reason: "ece_bin_count must be positive".to_string(),
            }
            .into());
        }
        if !(0.0..=1.0).contains(&self.ece_drift_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "ece_drift_threshold".to_string(),
                value: self.ece_drift_threshold.to_string(),
                reason: "ece_drift_threshold must be between 0.0 and 1.0".to_string(),
            }
            .into());
        }
        if self.safety_rails.provenance_quota == 0 {
            return Err(ConfigError::InvalidValue {
                field: "safety_rails.provenance_quota".to_string(),
                value: self.safety_rails.provenance_quota.to_string(),
                reason: "provenance_quota must be positive".to_string(),
            }
            .into());
        }
        if self.telemetry_ring_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "telemetry_ring_capacity".to_string(),
                value: self.telemetry_ring_capacity.to_string(),
                reason: "telemetry_ring_capacity must be positive".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

/// `calibration_set.json`: the raw array on disk, wrapped for
/// `serde_json::from_reader`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSetFile {
    pub examples: Vec<CalibrationExample>,
}

impl CalibrationSetFile {
    pub fn validate(&self) -> FractalResult<()> {
        for (i, example) in self.examples.iter().enumerate() {
            if example.query.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("examples[{i}].query"),
                    value: example.query.clone(),
                    reason: "calibration example query must not be empty".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_validates() {
        PolicyTable::default_table().validate().unwrap();
    }

    #[test]
    fn default_thresholds_validate() {
        Thresholds::default().validate().unwrap();
    }

    #[test]
    fn missing_type_entry_is_rejected() {
        let mut table = PolicyTable::default_table();
        table.types.remove(&QueryType::Creative.to_string());
        assert!(table.validate().is_err());
    }

    #[test]
    fn unbalanced_rubric_is_rejected() {
        let mut table = PolicyTable::default_table();
        let record = table.types.get_mut(&QueryType::Logic.to_string()).unwrap();
        record.arbiter_rubric.insert("extra".to_string(), 5.0);
        assert!(table.validate().is_err());
    }
}
