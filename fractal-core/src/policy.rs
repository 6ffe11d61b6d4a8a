//! The five per-layer policies emitted together each turn, plus the
//! bundle that wraps them with the mixture they were derived from.

use crate::{CompressionLevel, QueryType, StorageMode, TypeMixture};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-component token budget split. Components are fixed by name because
/// every config table and every resolver rule names them explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetSplit {
    pub error_epochs: i64,
    pub tone_analysis: i64,
    pub recent_context: i64,
    pub aux_dependencies: i64,
}

impl BudgetSplit {
    pub fn total(&self) -> i64 {
        self.error_epochs + self.tone_analysis + self.recent_context + self.aux_dependencies
    }

    /// View the split as a name->amount map, for the resolver's generic
    /// budget-conflict arithmetic.
    pub fn as_map(&self) -> BTreeMap<&'static str, i64> {
        BTreeMap::from([
            ("error_epochs", self.error_epochs),
            ("tone_analysis", self.tone_analysis),
            ("recent_context", self.recent_context),
            ("aux_dependencies", self.aux_dependencies),
        ])
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPolicy {
    pub budget_split: BudgetSplit,
    pub compression_target: f64,
    pub lambda_threshold: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MemoryPolicy {
    pub cache_depth: i64,
    pub split_threshold: f64,
    pub merge_threshold: f64,
    pub compression_ratio_target: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodePolicy {
    pub modules_enabled: Vec<String>,
    pub modules_cold: Vec<String>,
    pub lazy_load_order: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArbiterPolicy {
    pub rubric_weights: BTreeMap<String, f64>,
    pub noise_sigma: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonsPolicy {
    pub store_mode: StorageMode,
    pub compression_level: CompressionLevel,
}

/// The complete policy set for one turn, plus the mixture and dominant
/// type it was derived from. Immutable once emitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FractalPolicies {
    pub query_type_mixture: TypeMixture,
    pub dominant_type: QueryType,
    pub confidence: f64,
    pub token_policy: TokenPolicy,
    pub memory_policy: MemoryPolicy,
    pub code_policy: CodePolicy,
    pub arbiter_policy: ArbiterPolicy,
    pub lessons_policy: LessonsPolicy,
}

/// The global resource budget an invocation is given to work within.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GlobalBudget {
    pub tokens: i64,
    pub latency_ms: i64,
    pub cost_usd: f64,
    pub vram_mb: i64,
}

impl Default for GlobalBudget {
    fn default() -> Self {
        GlobalBudget {
            tokens: 3500,
            latency_ms: 500,
            cost_usd: 0.01,
            vram_mb: 2000,
        }
    }
}
