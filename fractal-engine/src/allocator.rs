//! Greedy knapsack allocation by gain/cost ratio, with the Information
//! Bottleneck guardrail applied after the budget fill.

use crate::classifier::lambda_for_mixture;
use fractal_core::{AllocationResult, AllocationTelemetry, LambdaTable, Span, SpanRoi, SpanType, TypeMixture};

fn base_gain(span_type: SpanType) -> f64 {
    match span_type {
        SpanType::ErrorEpoch => 10.0,
        SpanType::ToneShift => 5.0,
        SpanType::RecentTurn => 3.0,
        SpanType::AuxDep => 2.0,
    }
}

fn type_weight(query_type: &str, span_type: SpanType) -> f64 {
    let table: &[(&str, [(SpanType, f64); 4])] = &[
        (
            "pattern_language",
            [
                (SpanType::ErrorEpoch, 0.6),
                (SpanType::ToneShift, 0.8),
                (SpanType::RecentTurn, 1.0),
                (SpanType::AuxDep, 0.2),
            ],
        ),
        (
            "logic",
            [
                (SpanType::ErrorEpoch, 1.0),
                (SpanType::ToneShift, 0.3),
                (SpanType::RecentTurn, 1.0),
                (SpanType::AuxDep, 0.8),
            ],
        ),
        (
            "creative",
            [
                (SpanType::ErrorEpoch, 0.7),
                (SpanType::ToneShift, 0.9),
                (SpanType::RecentTurn, 1.0),
                (SpanType::AuxDep, 0.5),
            ],
        ),
        (
            "retrieval",
            [
                (SpanType::ErrorEpoch, 0.5),
                (SpanType::ToneShift, 0.2),
                (SpanType::RecentTurn, 0.6),
                (SpanType::AuxDep, 1.0),
            ],
        ),
    ];
    table
        .iter()
        .find(|(name, _)| *name == query_type)
        .and_then(|(_, weights)| weights.iter().find(|(st, _)| *st == span_type).map(|(_, w)| *w))
        .unwrap_or(0.5)
}

fn predict_gain(span: &Span, mixture: &TypeMixture) -> f64 {
    let base = base_gain(span.span_type);
    mixture
        .iter()
        .into_iter()
        .map(|(qt, weight)| weight * base * type_weight(&qt.to_string(), span.span_type))
        .sum()
}

/// Allocate `spans` under `budget` tokens for the given mixture. Negative-cost
/// spans are dropped (input-defect handling) before scoring.
pub fn allocate(spans: Vec<Span>, budget: i64, mixture: &TypeMixture, lambda_table: &LambdaTable) -> AllocationResult {
    let total_spans = spans.len();
    let mut scored: Vec<(Span, f64, f64)> = spans
        .into_iter()
        .filter_map(|span| {
            if span.cost < 0 {
                tracing::debug!(span_id = %span.span_id, "dropping span with negative cost");
                return None;
            }
            let gain = predict_gain(&span, mixture);
            let ratio = if span.cost > 0 { gain / span.cost as f64 } else { 0.0 };
            Some((span, gain, ratio))
        })
        .collect();

    // Descending ratio, tie-broken by ascending span_id for determinism.
    scored.sort_by(|a, b| {
        b.2.partial_cmp(&a.2)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.span_id.cmp(&b.0.span_id))
    });

    let mut within_budget = Vec::new();
    let mut rejected_budget = Vec::new();
    let mut used = 0i64;
    for entry in scored.into_iter() {
        if used + entry.0.cost <= budget {
            used += entry.0.cost;
            within_budget.push(entry);
        } else {
            rejected_budget.push(entry);
        }
    }

    let lambda_threshold = lambda_for_mixture(mixture, lambda_table);
    let chosen_before_ib = within_budget.len();

    let mut kept = Vec::new();
    let mut dropped_by_ib = Vec::new();
    for entry in within_budget {
        if entry.1 >= lambda_threshold {
            kept.push(entry);
        } else {
            dropped_by_ib.push(entry);
        }
    }

    let tokens_used: i64 = kept.iter().map(|(s, _, _)| s.cost).sum();
    let utilization_pct = if budget > 0 { tokens_used as f64 / budget as f64 * 100.0 } else { 0.0 };

    let to_roi = |(span, gain, ratio): &(Span, f64, f64), keep: bool| SpanRoi {
        span_id: span.span_id.clone(),
        span_type: span.span_type,
        gain: *gain,
        cost: span.cost,
        ratio: *ratio,
        kept: keep,
    };

    let mut roi_top_10_kept: Vec<SpanRoi> = kept.iter().map(|e| to_roi(e, true)).collect();
    roi_top_10_kept.sort_by(|a, b| b.ratio.partial_cmp(&a.ratio).unwrap_or(std::cmp::Ordering::Equal));
    roi_top_10_kept.truncate(10);

    let mut all_dropped: Vec<SpanRoi> = dropped_by_ib
        .iter()
        .map(|e| to_roi(e, false))
        .chain(rejected_budget.iter().map(|e| to_roi(e, false)))
        .collect();
    all_dropped.sort_by(|a, b| b.ratio.partial_cmp(&a.ratio).unwrap_or(std::cmp::Ordering::Equal));
    all_dropped.truncate(10);

    let telemetry = AllocationTelemetry {
        total_spans,
        chosen_before_ib,
        chosen_after_ib: kept.len(),
        tokens_used,
        tokens_budget: budget,
        utilization_pct,
        lambda_threshold,
        roi_top_10_kept,
        roi_top_10_dropped: all_dropped,
    };

    let chosen_spans: Vec<Span> = kept.into_iter().map(|(s, _, _)| s).collect();
    AllocationResult {
        token_count: chosen_spans.iter().map(|s| s.cost).sum(),
        chosen: chosen_spans,
        telemetry,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractal_core::LambdaTable;

    fn logic_mixture() -> TypeMixture {
        TypeMixture {
            pattern_language: 0.1,
            logic: 0.7,
            creative: 0.1,
            retrieval: 0.1,
        }
    }

    #[test]
    fn allocation_never_exceeds_budget() {
        let spans = vec![
            Span::new("a", SpanType::ErrorEpoch, 300, "a"),
            Span::new("b", SpanType::ErrorEpoch, 250, "b"),
            Span::new("c", SpanType::ToneShift, 150, "c"),
            Span::new("d", SpanType::RecentTurn, 200, "d"),
            Span::new("e", SpanType::AuxDep, 100, "e"),
        ];
        let result = allocate(spans, 800, &logic_mixture(), &LambdaTable::default());
        assert!(result.chosen.iter().map(|s| s.cost).sum::<i64>() <= 800);
    }

    #[test]
    fn ties_break_by_ascending_span_id() {
        let spans: Vec<Span> = (0..10)
            .map(|i| Span::new(format!("span-{i}"), SpanType::AuxDep, 100, "identical"))
            .collect();
        let result = allocate(spans, 350, &logic_mixture(), &LambdaTable::default());
        let ids: Vec<&str> = result.chosen.iter().map(|s| s.span_id.as_str()).collect();
        assert_eq!(ids, vec!["span-0", "span-1", "span-2"]);
    }

    #[test]
    fn negative_cost_span_is_dropped() {
        let spans = vec![Span::new("bad", SpanType::AuxDep, -5, "broken")];
        let result = allocate(spans, 100, &logic_mixture(), &LambdaTable::default());
        assert!(result.chosen.is_empty());
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn arb_mixture() -> impl Strategy<Value = TypeMixture> {
        (0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0, 0.0f64..1.0).prop_map(|(a, b, c, d)| {
            TypeMixture {
                pattern_language: a,
                logic: b,
                creative: c,
                retrieval: d,
            }
            .sanitize()
        })
    }

    fn arb_span_type() -> impl Strategy<Value = SpanType> {
        prop_oneof![
            Just(SpanType::ErrorEpoch),
            Just(SpanType::ToneShift),
            Just(SpanType::RecentTurn),
            Just(SpanType::AuxDep),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        /// For any set of non-negative-cost spans and any budget, the
        /// allocator never chooses more tokens than the budget allows.
        #[test]
        fn prop_allocation_respects_token_budget(
            budget in 0i64..5000,
            costs in prop::collection::vec(0i64..500, 0..20),
            span_type in arb_span_type(),
            mixture in arb_mixture(),
        ) {
            let spans: Vec<Span> = costs
                .into_iter()
                .enumerate()
                .map(|(i, cost)| Span::new(format!("s{i}"), span_type, cost, "text"))
                .collect();
            let result = allocate(spans, budget, &mixture, &LambdaTable::default());
            prop_assert!(result.chosen.iter().map(|s| s.cost).sum::<i64>() <= budget);
        }
    }
}
