//! Fractal Policy Controller - Decision Pipeline
//!
//! The six components that turn a query into a turn's policies, chosen
//! context spans, and telemetry: the ensemble classifier, the calibration
//! monitor, the policy emitter, the knapsack allocator, the critical-span
//! and safety-rail enforcer, and the cross-layer conflict resolver. The
//! controller module wires them together behind a single entry point.

mod allocator;
mod calibration_monitor;
mod classifier;
mod controller;
mod enforcer;
mod policy_emitter;
mod resolver;
mod telemetry_recorder;

pub use allocator::allocate;
pub use calibration_monitor::{calibration_check, CalibrationCheck};
pub use classifier::{classify_mixture, dominant_type, lambda_for_mixture};
pub use controller::{Controller, TurnOutcome};
pub use enforcer::{check_hard_floor, check_retrieval_safety, get_critical_spans, union_critical, FloorViolation, SafetyCheckResult};
pub use policy_emitter::get_policies;
pub use resolver::{resolve_budget, resolve_compression, BudgetResolution, CompressionResolution};
pub use telemetry_recorder::record_turn;
