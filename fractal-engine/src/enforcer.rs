//! Critical-span bypass, hard compression floors, and the retrieval safety
//! rails. Three independent safeguards applied after the knapsack allocator
//! has already run.

use fractal_core::{QueryType, SafetyAction, SafetyRailThresholds, Source, Span, SpanCategory, TypeMixture};

const ALWAYS_CRITICAL: [SpanCategory; 3] =
    [SpanCategory::CurrentQuery, SpanCategory::LastUserMessage, SpanCategory::ActiveError];

fn type_critical_categories(query_type: QueryType) -> &'static [SpanCategory] {
    match query_type {
        QueryType::Logic => &[
            SpanCategory::ReasoningSteps,
            SpanCategory::Invariants,
            SpanCategory::ErrorChains,
            SpanCategory::ProofTraces,
            SpanCategory::MathematicalDerivations,
        ],
        QueryType::Retrieval => &[
            SpanCategory::Facts,
            SpanCategory::Citations,
            SpanCategory::Sources,
            SpanCategory::GroundTruth,
            SpanCategory::Provenance,
        ],
        QueryType::PatternLanguage => &[SpanCategory::ConcreteExamples, SpanCategory::StylePatterns],
        QueryType::Creative => &[SpanCategory::Constraints, SpanCategory::CreativeIntent],
    }
}

/// Hard floor on compression ratio (original/kept) for the dominant type,
/// or `None` when the type has no floor.
fn hard_floor(query_type: QueryType) -> Option<f64> {
    match query_type {
        QueryType::Logic => Some(15.0),
        QueryType::Retrieval => Some(10.0),
        QueryType::PatternLanguage | QueryType::Creative => None,
    }
}

/// Extract the spans that must bypass the allocator's ROI ranking: the
/// universal categories, the per-type critical set for any type whose
/// mixture weight exceeds 0.3, and any span on the learned causal list.
pub fn get_critical_spans<'a>(all_spans: &'a [Span], mixture: &TypeMixture, learned_critical: &[String]) -> Vec<&'a Span> {
    all_spans
        .iter()
        .filter(|span| {
            let category = span.category();
            if let Some(category) = category {
                if ALWAYS_CRITICAL.contains(category) {
                    return true;
                }
                for (query_type, weight) in mixture.iter() {
                    if weight > 0.3 && type_critical_categories(query_type).contains(category) {
                        return true;
                    }
                }
            }
            learned_critical.iter().any(|id| id == &span.span_id)
        })
        .collect()
}

/// Merge critical spans into the allocator's chosen set, deduplicating by
/// `span_id`. The result may exceed the token budget.
pub fn union_critical(chosen: Vec<Span>, critical: Vec<&Span>) -> Vec<Span> {
    let mut result = chosen;
    let seen: std::collections::BTreeSet<&str> = result.iter().map(|s| s.span_id.as_str()).collect();
    for span in critical {
        if !seen.contains(span.span_id.as_str()) {
            result.push(span.clone());
        }
    }
    result
}

/// Resource-exhaustion outcome of `check_hard_floor`: whether the dominant
/// type's hard compression floor was violated, and the minimum token count
/// that floor requires. Reported, never an `Err` — resource exhaustion is a
/// result to act on, not a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloorViolation {
    pub violated: bool,
    pub minimum_tokens: i64,
}

/// Minimum tokens the dominant type's floor requires, or 0 if unfloored.
fn minimum_tokens_for(mixture: &TypeMixture, total_tokens: i64) -> i64 {
    let (dominant, _) = mixture.dominant();
    match hard_floor(dominant) {
        Some(floor) if total_tokens > 0 => (total_tokens as f64 / floor) as i64,
        _ => 0,
    }
}

/// Check whether `total_tokens / chosen_tokens` exceeds the hard compression
/// floor for any type weighted > 0.5, and what the floor's minimum token
/// count would be.
pub fn check_hard_floor(mixture: &TypeMixture, chosen_tokens: i64, total_tokens: i64) -> FloorViolation {
    let minimum_tokens = minimum_tokens_for(mixture, total_tokens);
    let violated = if total_tokens == 0 || chosen_tokens == 0 {
        false
    } else {
        let actual_ratio = total_tokens as f64 / chosen_tokens as f64;
        mixture
            .iter()
            .into_iter()
            .any(|(qt, weight)| weight > 0.5 && hard_floor(qt).is_some_and(|floor| actual_ratio > floor))
    };
    FloorViolation { violated, minimum_tokens }
}

/// Outcome of `check_retrieval_safety`.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyCheckResult {
    pub safe: bool,
    pub action: SafetyAction,
    pub reason: String,
    pub template: Option<String>,
}

fn detect_contradiction(sources: &[Source], thresholds: &SafetyRailThresholds) -> Option<String> {
    if sources.len() < 2 {
        return None;
    }
    let texts: Vec<String> = sources.iter().map(|s| s.text.to_lowercase()).collect();
    for (kw1, kw2) in &thresholds.contradiction_pairs {
        let has_kw1 = texts.iter().any(|t| t.contains(kw1.as_str()));
        let has_kw2 = texts.iter().any(|t| t.contains(kw2.as_str()));
        if has_kw1 && has_kw2 {
            let source1 = sources
                .iter()
                .zip(&texts)
                .find(|(_, t)| t.contains(kw1.as_str()))
                .map(|(s, _)| s.source_id.as_str())
                .unwrap_or("?");
            let source2 = sources
                .iter()
                .zip(&texts)
                .find(|(_, t)| t.contains(kw2.as_str()))
                .map(|(s, _)| s.source_id.as_str())
                .unwrap_or("?");
            return Some(format!("Source {source1} says '{kw1}' but {source2} says '{kw2}'"));
        }
    }
    None
}

fn citations_present(answer: &str, sources: &[Source], thresholds: &SafetyRailThresholds) -> bool {
    let answer_lower = answer.to_lowercase();
    if sources.iter().any(|s| !s.source_id.is_empty() && answer_lower.contains(&s.source_id.to_lowercase())) {
        return true;
    }
    thresholds.citation_markers.iter().any(|marker| answer_lower.contains(marker.as_str()))
}

/// Run the retrieval-mode safety rails. A no-op (always safe) unless the
/// mixture's retrieval weight is at least 0.5.
pub fn check_retrieval_safety(
    mixture: &TypeMixture,
    sources: &[Source],
    proposed_answer: &str,
    thresholds: &SafetyRailThresholds,
) -> SafetyCheckResult {
    if mixture.retrieval <= 0.5 {
        return SafetyCheckResult {
            safe: true,
            action: SafetyAction::Proceed,
            reason: "not_retrieval_mode".to_string(),
            template: None,
        };
    }

    let grounded: Vec<&Source> = sources.iter().filter(|s| s.confidence > thresholds.confidence_threshold).collect();
    if grounded.len() < thresholds.provenance_quota {
        return SafetyCheckResult {
            safe: false,
            action: SafetyAction::UseTemplate,
            reason: format!("insufficient_provenance: {} < {}", grounded.len(), thresholds.provenance_quota),
            template: Some(thresholds.uncertain_template.clone()),
        };
    }

    if let Some(conflict) = detect_contradiction(sources, thresholds) {
        return SafetyCheckResult {
            safe: false,
            action: SafetyAction::UseTemplate,
            reason: "source_contradiction".to_string(),
            template: Some(thresholds.clarifying_template.replace("{conflict_summary}", &conflict)),
        };
    }

    if !citations_present(proposed_answer, sources, thresholds) {
        return SafetyCheckResult {
            safe: false,
            action: SafetyAction::AddCitations,
            reason: "missing_citations".to_string(),
            template: None,
        };
    }

    SafetyCheckResult {
        safe: true,
        action: SafetyAction::Proceed,
        reason: "all_checks_passed".to_string(),
        template: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractal_core::SpanType;

    fn logic_mixture() -> TypeMixture {
        TypeMixture {
            pattern_language: 0.1,
            logic: 0.7,
            creative: 0.1,
            retrieval: 0.1,
        }
    }

    #[test]
    fn reasoning_steps_survive_for_logic_query() {
        let spans = vec![
            Span::new("query", SpanType::RecentTurn, 50, "q").with_category(SpanCategory::CurrentQuery),
            Span::new("r1", SpanType::RecentTurn, 100, "step 1").with_category(SpanCategory::ReasoningSteps),
            Span::new("aux1", SpanType::AuxDep, 90, "background"),
        ];
        let critical = get_critical_spans(&spans, &logic_mixture(), &[]);
        let ids: std::collections::BTreeSet<&str> = critical.iter().map(|s| s.span_id.as_str()).collect();
        assert!(ids.contains("query"));
        assert!(ids.contains("r1"));
        assert!(!ids.contains("aux1"));
    }

    #[test]
    fn hard_floor_is_violated_past_fifteen_to_one() {
        assert!(!check_hard_floor(&logic_mixture(), 2000, 20000).violated);
        assert!(check_hard_floor(&logic_mixture(), 2000, 40000).violated);
    }

    #[test]
    fn minimum_tokens_matches_floor_division() {
        assert_eq!(check_hard_floor(&logic_mixture(), 2000, 30000).minimum_tokens, 2000);
    }

    #[test]
    fn insufficient_provenance_triggers_uncertain_template() {
        let thresholds = SafetyRailThresholds::default();
        let mixture = TypeMixture {
            pattern_language: 0.1,
            logic: 0.2,
            creative: 0.1,
            retrieval: 0.6,
        };
        let sources = vec![Source::new("uncertain", "I think ML started around 1950", 0.3)];
        let result = check_retrieval_safety(&mixture, &sources, "ML started in 1950", &thresholds);
        assert!(!result.safe);
        assert_eq!(result.action, SafetyAction::UseTemplate);
        assert!(result.template.is_some());
    }

    #[test]
    fn contradicting_sources_trigger_clarifying_template() {
        let thresholds = SafetyRailThresholds::default();
        let mixture = TypeMixture {
            pattern_language: 0.1,
            logic: 0.2,
            creative: 0.1,
            retrieval: 0.6,
        };
        let sources = vec![
            Source::new("source_a", "The answer is yes, this is correct", 0.9),
            Source::new("source_b", "The answer is no, this is incorrect", 0.9),
            Source::new("source_c", "Additional info", 0.8),
        ];
        let result = check_retrieval_safety(&mixture, &sources, "The answer is yes", &thresholds);
        assert!(!result.safe);
        assert_eq!(result.reason, "source_contradiction");
    }

    #[test]
    fn grounded_cited_answer_proceeds() {
        let thresholds = SafetyRailThresholds::default();
        let mixture = TypeMixture {
            pattern_language: 0.1,
            logic: 0.2,
            creative: 0.1,
            retrieval: 0.6,
        };
        let sources = vec![
            Source::new("wiki_ml", "Machine learning was developed in the 1950s", 0.9),
            Source::new("turing_bio", "Alan Turing contributed to early AI", 0.95),
            Source::new("nn_history", "Neural networks emerged in the 1980s", 0.85),
        ];
        let result = check_retrieval_safety(
            &mixture,
            &sources,
            "Machine learning was developed in the 1950s, according to wiki_ml",
            &thresholds,
        );
        assert!(result.safe);
        assert_eq!(result.action, SafetyAction::Proceed);
    }
}
