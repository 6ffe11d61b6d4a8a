//! Cross-layer conflict resolution. When the memory layer and token layer
//! disagree, or requested budgets exceed what's available, precedence
//! (retrieval > logic > pattern_language > creative) picks the winner.

use fractal_core::{BudgetSplit, CompressionDecision, QueryType, TypeMixture};
use std::collections::BTreeMap;

const PRECEDENCE: [QueryType; 4] =
    [QueryType::Retrieval, QueryType::Logic, QueryType::PatternLanguage, QueryType::Creative];

fn precedence_rank(query_type: QueryType) -> usize {
    PRECEDENCE.iter().position(|qt| *qt == query_type).unwrap_or(99)
}

/// Outcome of a memory/token compression conflict.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionResolution {
    pub conflict: bool,
    pub decision: CompressionDecision,
    pub winner: Option<&'static str>,
    pub reason: String,
}

/// Resolve a disagreement between the memory layer (wants to compress) and
/// the token layer (wants to expand). Retrieval and logic dominance favors
/// detail preservation; pattern_language and creative allow compression.
pub fn resolve_compression(memory_wants_compress: bool, token_wants_expand: bool, mixture: &TypeMixture) -> CompressionResolution {
    if memory_wants_compress == !token_wants_expand {
        return CompressionResolution {
            conflict: false,
            decision: if memory_wants_compress { CompressionDecision::Compress } else { CompressionDecision::Expand },
            winner: None,
            reason: "layers_agree".to_string(),
        };
    }

    let (dominant, _) = mixture.dominant();
    let rank = precedence_rank(dominant);
    let (decision, winner) =
        if rank <= 1 { (CompressionDecision::Expand, "token_layer") } else { (CompressionDecision::Compress, "memory_layer") };

    CompressionResolution {
        conflict: true,
        decision,
        winner: Some(winner),
        reason: format!("{dominant}_precedence"),
    }
}

fn protected_components(dominant: QueryType) -> [&'static str; 2] {
    match dominant {
        QueryType::Retrieval | QueryType::Logic => ["error_epochs", "aux_dependencies"],
        QueryType::PatternLanguage | QueryType::Creative => ["recent_context", "tone_analysis"],
    }
}

/// Outcome of a budget conflict: the allocated (possibly scaled-down) token
/// amount per component.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetResolution {
    pub conflict: bool,
    pub allocated: BTreeMap<&'static str, i64>,
    pub protected: Vec<&'static str>,
}

/// Scale a requested `BudgetSplit` down to fit `available`, protecting the
/// dominant type's preferred components at their full request and scaling
/// the rest proportionally.
pub fn resolve_budget(requested: &BudgetSplit, available: i64, mixture: &TypeMixture) -> BudgetResolution {
    let requested_map = requested.as_map();
    let total_requested = requested.total();

    if total_requested <= available {
        return BudgetResolution {
            conflict: false,
            allocated: requested_map,
            protected: Vec::new(),
        };
    }

    let (dominant, _) = mixture.dominant();
    let protected = protected_components(dominant);
    let is_protected = |component: &str| protected.iter().any(|p| *p == component);
    let protected_total: i64 = protected.iter().filter_map(|c| requested_map.get(c)).sum();
    let remaining = available - protected_total;
    let unprotected_total: i64 = requested_map
        .iter()
        .filter(|(component, _)| !is_protected(component))
        .map(|(_, v)| *v)
        .sum();

    let mut allocated = BTreeMap::new();
    for (component, amount) in requested_map.iter().map(|(k, v)| (*k, *v)) {
        if is_protected(component) {
            allocated.insert(component, amount);
        } else if unprotected_total > 0 {
            let scale = remaining as f64 / unprotected_total as f64;
            allocated.insert(component, (amount as f64 * scale) as i64);
        } else {
            allocated.insert(component, 0);
        }
    }

    BudgetResolution {
        conflict: true,
        allocated,
        protected: protected.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logic_mixture() -> TypeMixture {
        TypeMixture {
            pattern_language: 0.1,
            logic: 0.7,
            creative: 0.1,
            retrieval: 0.1,
        }
    }

    fn pattern_mixture() -> TypeMixture {
        TypeMixture {
            pattern_language: 0.7,
            logic: 0.2,
            creative: 0.05,
            retrieval: 0.05,
        }
    }

    #[test]
    fn logic_precedence_favors_expansion() {
        let resolution = resolve_compression(true, true, &logic_mixture());
        assert_eq!(resolution.decision, CompressionDecision::Expand);
        assert_eq!(resolution.winner, Some("token_layer"));
    }

    #[test]
    fn pattern_precedence_allows_compression() {
        let resolution = resolve_compression(true, true, &pattern_mixture());
        assert_eq!(resolution.decision, CompressionDecision::Compress);
        assert_eq!(resolution.winner, Some("memory_layer"));
    }

    #[test]
    fn agreeing_layers_have_no_conflict() {
        let resolution = resolve_compression(true, false, &logic_mixture());
        assert!(!resolution.conflict);
        assert_eq!(resolution.decision, CompressionDecision::Compress);
    }

    #[test]
    fn budget_conflict_protects_logic_components_and_fits_available() {
        let requested = BudgetSplit {
            error_epochs: 1200,
            tone_analysis: 800,
            recent_context: 1200,
            aux_dependencies: 800,
        };
        let resolution = resolve_budget(&requested, 3000, &logic_mixture());
        assert!(resolution.conflict);
        assert_eq!(resolution.allocated["error_epochs"], 1200);
        assert_eq!(resolution.allocated["aux_dependencies"], 800);
        let total: i64 = resolution.allocated.values().sum();
        assert!(total <= 3000);
    }

    #[test]
    fn budget_within_available_passes_through() {
        let requested = BudgetSplit {
            error_epochs: 500,
            tone_analysis: 500,
            recent_context: 500,
            aux_dependencies: 500,
        };
        let resolution = resolve_budget(&requested, 3000, &logic_mixture());
        assert!(!resolution.conflict);
        assert_eq!(resolution.allocated["tone_analysis"], 500);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any requested split and any available budget large enough to
        /// cover the dominant type's protected components, the resolved
        /// allocation never sums above what's available.
        #[test]
        fn prop_resolved_budget_never_exceeds_available_when_protected_fits(
            error_epochs in 0i64..2000,
            tone_analysis in 0i64..2000,
            recent_context in 0i64..2000,
            aux_dependencies in 0i64..2000,
            available in 0i64..3000,
            logic in 0.0f64..1.0,
        ) {
            let requested = BudgetSplit { error_epochs, tone_analysis, recent_context, aux_dependencies };
            let mixture = TypeMixture { pattern_language: 1.0 - logic, logic, creative: 0.0, retrieval: 0.0 };
            let protected_total = if logic > 0.5 { error_epochs + aux_dependencies } else { recent_context + tone_analysis };
            let resolution = resolve_budget(&requested, available, &mixture);
            let total: i64 = resolution.allocated.values().sum();
            if resolution.conflict {
                if protected_total <= available {
                    prop_assert!(total <= available, "total {} exceeded available {}", total, available);
                }
            } else {
                prop_assert_eq!(total, requested.total());
            }
        }
    }
}
