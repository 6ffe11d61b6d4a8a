//! Assembles a turn's `TelemetryRecord` from the allocator's telemetry and
//! the emitted policies, and checks it for the two anomaly classes:
//! type-mixture homogenization and split/merge churn miscalibration.

use fractal_core::{
    AllocationTelemetry, BudgetLedger, Churn, ComponentLedger, FractalPolicies, InterventionRecord, SpanRoi, SpanType,
    Thresholds, TypeMixture,
};
use sha2::{Digest, Sha256};

fn hash_query(query: &str) -> String {
    hex::encode(Sha256::digest(query.as_bytes()))
}

fn component_ledger(allocation: &AllocationTelemetry, span_type: SpanType) -> ComponentLedger {
    let spans: Vec<&SpanRoi> = allocation
        .roi_top_10_kept
        .iter()
        .chain(allocation.roi_top_10_dropped.iter())
        .filter(|s| s.span_type == span_type)
        .collect();
    let used: i64 = spans.iter().filter(|s| s.kept).map(|s| s.cost).sum();
    let pruned: i64 = spans.iter().filter(|s| !s.kept).map(|s| s.cost).sum();
    ComponentLedger {
        allocated: used + pruned,
        used,
        pruned,
    }
}

fn build_budget_ledger(allocation: &AllocationTelemetry) -> BudgetLedger {
    BudgetLedger {
        error_epochs: component_ledger(allocation, SpanType::ErrorEpoch),
        tone_analysis: component_ledger(allocation, SpanType::ToneShift),
        recent_context: component_ledger(allocation, SpanType::RecentTurn),
        aux_dependencies: component_ledger(allocation, SpanType::AuxDep),
    }
}

fn shannon_entropy(mixture: &TypeMixture) -> f64 {
    mixture
        .iter()
        .into_iter()
        .map(|(_, w)| if w > 0.0 { -w * w.log2() } else { 0.0 })
        .sum()
}

/// Build a complete telemetry record for one turn and push it into `ring`,
/// returning any anomalies surfaced by the check.
pub fn record_turn(
    ring: &mut fractal_core::TelemetryRing,
    query: &str,
    policies: &FractalPolicies,
    allocation: &AllocationTelemetry,
    churn: Churn,
    interventions: Vec<InterventionRecord>,
    thresholds: &Thresholds,
) -> Vec<fractal_core::TelemetryAnomaly> {
    let turn_id = ring.next_turn_id();
    let mut roi_top_10: Vec<SpanRoi> =
        allocation.roi_top_10_kept.iter().chain(allocation.roi_top_10_dropped.iter()).cloned().collect();
    roi_top_10.sort_by(|a, b| b.ratio.partial_cmp(&a.ratio).unwrap_or(std::cmp::Ordering::Equal));
    roi_top_10.truncate(10);

    let mut mixture_trace = ring.last_n_mixtures(9);
    mixture_trace.push(policies.query_type_mixture);

    let record = fractal_core::TelemetryRecord {
        turn_id,
        timestamp: chrono::Utc::now(),
        query_hash: hash_query(query),
        policy_id: "v1.0.0".to_string(),
        type_mixture: policies.query_type_mixture,
        budget_ledger: build_budget_ledger(allocation),
        roi_top_10,
        mixture_trace,
        churn,
        interventions,
    };

    let entropy = shannon_entropy(&policies.query_type_mixture);
    let mut anomalies = Vec::new();

    if entropy < thresholds.entropy_warning_threshold {
        tracing::warn!(entropy, turn_id, "type mixture entropy low, classifier may be drifting");
        anomalies.push(fractal_core::TelemetryAnomaly {
            kind: "homogenization".to_string(),
            message: format!("type mixture entropy {entropy:.2} below {:.2}", thresholds.entropy_warning_threshold),
        });
    }

    let churn_rate = (record.churn.splits + record.churn.merges) as f64 / 100.0;
    if churn_rate > thresholds.churn_warning_rate {
        tracing::warn!(churn_rate, turn_id, "split/merge churn above threshold, thresholds may be miscalibrated");
        anomalies.push(fractal_core::TelemetryAnomaly {
            kind: "threshold_miscalibration".to_string(),
            message: format!("churn rate {churn_rate:.1%} above {:.1%}", thresholds.churn_warning_rate),
        });
    }

    ring.push(record);
    anomalies
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractal_core::{
        ArbiterPolicy, CodePolicy, CompressionLevel, LessonsPolicy, MemoryPolicy, StorageMode, TelemetryRing, TokenPolicy,
    };

    fn sample_policies(mixture: TypeMixture) -> FractalPolicies {
        let (dominant_type, confidence) = mixture.dominant();
        FractalPolicies {
            query_type_mixture: mixture,
            dominant_type,
            confidence,
            token_policy: TokenPolicy {
                budget_split: fractal_core::BudgetSplit {
                    error_epochs: 1000,
                    tone_analysis: 400,
                    recent_context: 1200,
                    aux_dependencies: 600,
                },
                compression_target: 20.0,
                lambda_threshold: 0.9,
            },
            memory_policy: MemoryPolicy {
                cache_depth: 3,
                split_threshold: 0.5,
                merge_threshold: 0.4,
                compression_ratio_target: 20.0,
            },
            code_policy: CodePolicy {
                modules_enabled: vec![],
                modules_cold: vec![],
                lazy_load_order: vec![],
            },
            arbiter_policy: ArbiterPolicy {
                rubric_weights: Default::default(),
                noise_sigma: 0.05,
            },
            lessons_policy: LessonsPolicy {
                store_mode: StorageMode::Raw,
                compression_level: CompressionLevel::Low,
            },
        }
    }

    fn sample_allocation() -> AllocationTelemetry {
        AllocationTelemetry {
            total_spans: 4,
            chosen_before_ib: 3,
            chosen_after_ib: 3,
            tokens_used: 730,
            tokens_budget: 3500,
            utilization_pct: 20.8,
            lambda_threshold: 1.0,
            roi_top_10_kept: vec![
                SpanRoi {
                    span_id: "err1".into(),
                    span_type: SpanType::ErrorEpoch,
                    gain: 10.0,
                    cost: 300,
                    ratio: 0.033,
                    kept: true,
                },
                SpanRoi {
                    span_id: "tone1".into(),
                    span_type: SpanType::ToneShift,
                    gain: 3.0,
                    cost: 150,
                    ratio: 0.020,
                    kept: true,
                },
            ],
            roi_top_10_dropped: vec![SpanRoi {
                span_id: "aux1".into(),
                span_type: SpanType::AuxDep,
                gain: 1.0,
                cost: 100,
                ratio: 0.010,
                kept: false,
            }],
        }
    }

    #[test]
    fn budget_ledger_sums_used_and_pruned_by_component() {
        let allocation = sample_allocation();
        let ledger = build_budget_ledger(&allocation);
        assert_eq!(ledger.error_epochs.used, 300);
        assert_eq!(ledger.aux_dependencies.pruned, 100);
        assert_eq!(ledger.aux_dependencies.allocated, 100);
    }

    #[test]
    fn low_entropy_mixture_triggers_homogenization_warning() {
        let mut ring = TelemetryRing::new(50);
        let mixture = TypeMixture {
            pattern_language: 0.01,
            logic: 0.97,
            creative: 0.01,
            retrieval: 0.01,
        };
        let policies = sample_policies(mixture);
        let allocation = sample_allocation();
        let thresholds = Thresholds::default();
        let anomalies = record_turn(&mut ring, "query", &policies, &allocation, Churn::default(), vec![], &thresholds);
        assert!(anomalies.iter().any(|a| a.kind == "homogenization"));
    }

    #[test]
    fn high_churn_triggers_miscalibration_warning() {
        let mut ring = TelemetryRing::new(50);
        let mixture = TypeMixture {
            pattern_language: 0.25,
            logic: 0.25,
            creative: 0.25,
            retrieval: 0.25,
        };
        let policies = sample_policies(mixture);
        let allocation = sample_allocation();
        let thresholds = Thresholds::default();
        let churn = Churn { splits: 10, merges: 10 };
        let anomalies = record_turn(&mut ring, "query", &policies, &allocation, churn, vec![], &thresholds);
        assert!(anomalies.iter().any(|a| a.kind == "threshold_miscalibration"));
    }

    #[test]
    fn ring_tracks_mixture_trace_across_turns() {
        let mut ring = TelemetryRing::new(50);
        let thresholds = Thresholds::default();
        for i in 0..3 {
            let mixture = TypeMixture {
                pattern_language: 0.2 + i as f64 * 0.02,
                logic: 0.5 - i as f64 * 0.02,
                creative: 0.2,
                retrieval: 0.1,
            };
            let policies = sample_policies(mixture);
            let allocation = sample_allocation();
            record_turn(&mut ring, "q", &policies, &allocation, Churn::default(), vec![], &thresholds);
        }
        assert_eq!(ring.records.len(), 3);
        assert_eq!(ring.records.last().unwrap().mixture_trace.len(), 3);
    }
}
