//! The top-level orchestrator: loads configuration once at startup, then
//! drives the six pipeline components in strict order for each turn.

use crate::allocator::allocate;
use crate::calibration_monitor::calibration_check;
use crate::classifier::classify_mixture;
use crate::enforcer::{check_hard_floor, get_critical_spans, union_critical};
use crate::policy_emitter::get_policies;
use crate::resolver::{resolve_budget, resolve_compression, BudgetResolution, CompressionResolution};
use fractal_core::{
    CalibrationState, FractalError, FractalPolicies, FractalResult, GlobalBudget, PolicyTable, Span, Thresholds, TelemetryRing,
};
use std::path::{Path, PathBuf};

/// Everything produced by `Controller::handle` for one turn.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub policies: FractalPolicies,
    pub chosen_spans: Vec<Span>,
    pub compression: Option<CompressionResolution>,
    pub budget: Option<BudgetResolution>,
    pub hard_floor_violated: bool,
    pub minimum_tokens: i64,
}

/// Owns the static configuration and the mutable calibration/telemetry
/// state that persist across turns.
pub struct Controller {
    policy_table: PolicyTable,
    thresholds: Thresholds,
    pub calibration_state: CalibrationState,
    pub telemetry: TelemetryRing,
}

impl Controller {
    /// Build a controller from already-validated configuration.
    pub fn new(policy_table: PolicyTable, thresholds: Thresholds, calibration_state: CalibrationState) -> Self {
        let capacity = thresholds.telemetry_ring_capacity;
        Controller {
            policy_table,
            thresholds,
            calibration_state,
            telemetry: TelemetryRing::new(capacity),
        }
    }

    /// Load `policy_table.json`, `thresholds.json` and `calibration_set.json`
    /// from `dir`, falling back to hard-coded defaults for any file that
    /// doesn't exist. Every loaded or defaulted table is validated before
    /// the controller is built.
    pub fn load(dir: &Path) -> FractalResult<Self> {
        let policy_table = match read_json::<PolicyTable>(&dir.join("policy_table.json"))? {
            Some(table) => table,
            None => PolicyTable::default_table(),
        };
        policy_table.validate()?;

        let thresholds = match read_json::<Thresholds>(&dir.join("thresholds.json"))? {
            Some(thresholds) => thresholds,
            None => Thresholds::default(),
        };
        thresholds.validate()?;

        let calibration_set = match read_json::<fractal_core::CalibrationSetFile>(&dir.join("calibration_set.json"))? {
            Some(file) => {
                file.validate()?;
                file.examples
            }
            None => CalibrationState::default_calibration_set(),
        };

        Ok(Controller::new(policy_table, thresholds, CalibrationState::new(calibration_set)))
    }

    /// Run the calibration monitor standalone, without a full turn.
    pub fn check_drift(&mut self) -> crate::calibration_monitor::CalibrationCheck {
        calibration_check(&mut self.calibration_state, &self.thresholds)
    }

    /// Run the classify -> emit-policies -> allocate -> enforce -> resolve
    /// -> record pipeline for one turn. Deterministic given identical
    /// inputs and identical calibration/telemetry state.
    #[allow(clippy::too_many_arguments)]
    pub fn handle(
        &mut self,
        query: &str,
        history: &[String],
        spans: Vec<Span>,
        total_tokens: i64,
        budget: &GlobalBudget,
        learned_critical: &[String],
        memory_wants_compress: bool,
        token_wants_expand: bool,
    ) -> TurnOutcome {
        let logic_floor = self.calibration_state.logic_floor();
        let mixture = classify_mixture(query, history, &self.thresholds, logic_floor);
        let policies = get_policies(mixture, &self.policy_table, &self.thresholds, budget);

        let allocation = allocate(spans.clone(), policies.token_policy.budget_split.total(), &mixture, &self.thresholds.lambda_table);
        let critical = get_critical_spans(&spans, &mixture, learned_critical);
        let chosen_spans = union_critical(allocation.chosen.clone(), critical);

        let chosen_tokens: i64 = chosen_spans.iter().map(|s| s.cost).sum();
        let floor = check_hard_floor(&mixture, chosen_tokens, total_tokens);

        let compression = if memory_wants_compress != !token_wants_expand {
            Some(resolve_compression(memory_wants_compress, token_wants_expand, &mixture))
        } else {
            None
        };

        let requested = policies.token_policy.budget_split;
        let budget_resolution = if requested.total() > budget.tokens {
            Some(resolve_budget(&requested, budget.tokens, &mixture))
        } else {
            None
        };

        let churn = fractal_core::Churn::default();
        crate::telemetry_recorder::record_turn(
            &mut self.telemetry,
            query,
            &policies,
            &allocation.telemetry,
            churn,
            Vec::new(),
            &self.thresholds,
        );

        TurnOutcome {
            policies,
            chosen_spans,
            compression,
            budget: budget_resolution,
            hard_floor_violated: floor.violated,
            minimum_tokens: floor.minimum_tokens,
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &PathBuf) -> FractalResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path).map_err(|e| {
        FractalError::Config(fractal_core::ConfigError::Malformed {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    })?;
    let value = serde_json::from_str(&contents).map_err(|e| {
        FractalError::Config(fractal_core::ConfigError::Malformed {
            file: path.display().to_string(),
            reason: e.to_string(),
        })
    })?;
    Ok(Some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fractal_core::{SpanType, Thresholds};

    fn sample_spans() -> Vec<Span> {
        vec![
            Span::new("q", SpanType::RecentTurn, 50, "current query").with_category(fractal_core::SpanCategory::CurrentQuery),
            Span::new("r1", SpanType::ErrorEpoch, 300, "reasoning trace"),
            Span::new("aux1", SpanType::AuxDep, 120, "background"),
        ]
    }

    #[test]
    fn handle_never_panics_and_returns_policies_for_dominant_type() {
        let mut controller = Controller::new(PolicyTable::default_table(), Thresholds::default(), CalibrationState::default());
        let outcome = controller.handle(
            "What is the ratio of x and y?",
            &[],
            sample_spans(),
            3000,
            &GlobalBudget::default(),
            &[],
            false,
            false,
        );
        assert_eq!(outcome.policies.dominant_type, fractal_core::QueryType::Logic);
    }

    #[test]
    fn missing_config_dir_falls_back_to_defaults() {
        let controller = Controller::load(Path::new("/nonexistent/does/not/exist")).expect("defaults should load");
        assert_eq!(controller.calibration_state.calibration_set.len(), 4);
    }

    #[test]
    fn handle_is_deterministic_for_repeated_identical_turns() {
        let mut controller = Controller::new(PolicyTable::default_table(), Thresholds::default(), CalibrationState::default());
        assert_deterministic(
            || {
                let outcome = controller.handle(
                    "What is the ratio of x and y?",
                    &[],
                    sample_spans(),
                    3000,
                    &GlobalBudget::default(),
                    &[],
                    false,
                    false,
                );
                outcome.policies
            },
            5,
        );
    }
}

/// Calls `f` `n` times and asserts every call serializes identically,
/// following the stated intent of cross-implementation determinism
/// checking: here, repeated runs of the same pipeline stage over identical
/// inputs must agree bit-for-bit.
#[cfg(test)]
fn assert_deterministic<T: serde::Serialize>(mut f: impl FnMut() -> T, n: usize) {
    assert!(n > 0, "assert_deterministic requires at least one call");
    let first = serde_json::to_string(&f()).expect("serialize determinism check result");
    for i in 1..n {
        let next = serde_json::to_string(&f()).expect("serialize determinism check result");
        assert_eq!(first, next, "call {i} diverged from call 0");
    }
}
