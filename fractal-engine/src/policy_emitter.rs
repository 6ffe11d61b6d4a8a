//! Emits the five per-layer policies for a turn by mixture-weighted
//! interpolation across the policy table's per-type records.

use crate::classifier::lambda_for_mixture;
use fractal_core::{
    ArbiterPolicy, Axis, BudgetSplit, CodePolicy, CompressionLevel, FractalPolicies, GlobalBudget,
    LessonsPolicy, MemoryPolicy, PolicyTable, QueryType, StorageMode, Thresholds, TokenPolicy,
    TypeMixture,
};
use std::collections::BTreeMap;

fn emit_token_policy(mixture: &TypeMixture, table: &PolicyTable, thresholds: &Thresholds, budget: &GlobalBudget) -> TokenPolicy {
    let mut split = BudgetSplit {
        error_epochs: 0,
        tone_analysis: 0,
        recent_context: 0,
        aux_dependencies: 0,
    };
    let mut compression_target = 0.0;

    for (qt, weight) in mixture.iter() {
        let record = &table.types[&qt.to_string()];
        split.error_epochs += (weight * *record.token_budget.get("error_epochs").unwrap_or(&0) as f64) as i64;
        split.tone_analysis += (weight * *record.token_budget.get("tone_analysis").unwrap_or(&0) as f64) as i64;
        split.recent_context += (weight * *record.token_budget.get("recent_context").unwrap_or(&0) as f64) as i64;
        split.aux_dependencies += (weight * *record.token_budget.get("aux_dependencies").unwrap_or(&0) as f64) as i64;
        compression_target += weight * record.target_compression;
    }

    let axes = mixture.travis_axes();
    match axes.dominant_axis {
        Axis::PatternLanguage if axes.dominant_strength > 0.55 => {
            compression_target += (axes.dominant_strength - 0.5) * 20.0;
        }
        Axis::LogicCreative if axes.dominant_strength > 0.55 => {
            compression_target = (compression_target - (axes.dominant_strength - 0.5) * 10.0).max(15.0);
        }
        _ => {}
    }

    let lambda_threshold = lambda_for_mixture(mixture, &thresholds.lambda_table);

    let _ = budget; // component split is already scaled per-type; global budget is applied by the allocator/resolver.
    TokenPolicy {
        budget_split: split,
        compression_target,
        lambda_threshold,
    }
}

fn emit_memory_policy(mixture: &TypeMixture, table: &PolicyTable) -> MemoryPolicy {
    let mut split_threshold = 0.0;
    let mut merge_threshold = 0.0;
    let mut cache_depth = 0.0;
    let mut compression_ratio_target = 0.0;

    for (qt, weight) in mixture.iter() {
        let record = &table.types[&qt.to_string()];
        split_threshold += weight * record.memory.split_threshold_base;
        merge_threshold += weight * record.memory.merge_threshold_base;
        cache_depth += weight * record.memory.cache_depth as f64;
        let (lo, hi) = record.compression_ratio_range;
        compression_ratio_target += weight * (lo + hi) / 2.0;
    }

    MemoryPolicy {
        cache_depth: cache_depth as i64,
        split_threshold,
        merge_threshold,
        compression_ratio_target,
    }
}

fn emit_code_policy(dominant: QueryType) -> CodePolicy {
    let (enabled, cold): (Vec<&str>, Vec<&str>) = match dominant {
        QueryType::PatternLanguage => (vec!["examples_core", "style_core"], vec!["reason_core"]),
        QueryType::Logic => (vec!["reason_core", "trace_core"], vec!["examples_core"]),
        QueryType::Creative => (vec!["vibe_core", "constraint_core"], vec![]),
        QueryType::Retrieval => (vec!["fact_core", "citation_core"], vec!["vibe_core"]),
    };
    let modules_enabled: Vec<String> = enabled.iter().map(|s| s.to_string()).collect();
    let modules_cold: Vec<String> = cold.iter().map(|s| s.to_string()).collect();
    let lazy_load_order = modules_enabled.iter().chain(modules_cold.iter()).cloned().collect();
    CodePolicy {
        modules_enabled,
        modules_cold,
        lazy_load_order,
    }
}

fn emit_arbiter_policy(mixture: &TypeMixture, table: &PolicyTable) -> ArbiterPolicy {
    let mut all_metrics = std::collections::BTreeSet::new();
    for qt in QueryType::ALL {
        all_metrics.extend(table.types[&qt.to_string()].arbiter_rubric.keys().cloned());
    }

    let mut rubric_weights: BTreeMap<String, f64> = BTreeMap::new();
    for metric in &all_metrics {
        let mut weight_sum = 0.0;
        for (qt, weight) in mixture.iter() {
            let record = &table.types[&qt.to_string()];
            weight_sum += weight * record.arbiter_rubric.get(metric).copied().unwrap_or(0.0);
        }
        rubric_weights.insert(metric.clone(), weight_sum);
    }

    let total: f64 = rubric_weights.values().sum();
    if total > 0.0 {
        for v in rubric_weights.values_mut() {
            *v /= total;
        }
    }

    ArbiterPolicy {
        rubric_weights,
        noise_sigma: table.safety_defaults.arbiter_noise_sigma,
    }
}

fn emit_lessons_policy(mixture: &TypeMixture) -> LessonsPolicy {
    if mixture.pattern_language > 0.5 {
        LessonsPolicy {
            store_mode: StorageMode::Pattern,
            compression_level: CompressionLevel::High,
        }
    } else if mixture.logic > 0.5 {
        LessonsPolicy {
            store_mode: StorageMode::Raw,
            compression_level: CompressionLevel::Low,
        }
    } else if mixture.creative > 0.5 {
        LessonsPolicy {
            store_mode: StorageMode::Superpattern,
            compression_level: CompressionLevel::Medium,
        }
    } else {
        LessonsPolicy {
            store_mode: StorageMode::Mixed,
            compression_level: CompressionLevel::Medium,
        }
    }
}

/// Emit the complete policy bundle for one turn's mixture.
pub fn get_policies(mixture: TypeMixture, table: &PolicyTable, thresholds: &Thresholds, budget: &GlobalBudget) -> FractalPolicies {
    let (dominant_type, confidence) = mixture.dominant();
    FractalPolicies {
        query_type_mixture: mixture,
        dominant_type,
        confidence,
        token_policy: emit_token_policy(&mixture, table, thresholds, budget),
        memory_policy: emit_memory_policy(&mixture, table),
        code_policy: emit_code_policy(dominant_type),
        arbiter_policy: emit_arbiter_policy(&mixture, table),
        lessons_policy: emit_lessons_policy(&mixture),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arbiter_rubric_sums_to_one() {
        let table = PolicyTable::default_table();
        let thresholds = Thresholds::default();
        let budget = GlobalBudget::default();
        let mixture = TypeMixture {
            pattern_language: 0.2,
            logic: 0.5,
            creative: 0.2,
            retrieval: 0.1,
        };
        let policies = get_policies(mixture, &table, &thresholds, &budget);
        let sum: f64 = policies.arbiter_policy.rubric_weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn logic_dominant_lessons_policy_is_raw_and_low() {
        let mixture = TypeMixture {
            pattern_language: 0.1,
            logic: 0.7,
            creative: 0.1,
            retrieval: 0.1,
        };
        let policy = emit_lessons_policy(&mixture);
        assert_eq!(policy.store_mode, StorageMode::Raw);
        assert_eq!(policy.compression_level, CompressionLevel::Low);
    }

    #[test]
    fn code_policy_lazy_load_order_is_enabled_then_cold() {
        let policy = emit_code_policy(QueryType::Retrieval);
        assert_eq!(policy.lazy_load_order, vec!["fact_core", "citation_core", "vibe_core"]);
    }
}
