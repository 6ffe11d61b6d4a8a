//! Per-turn telemetry records and the bounded ring they accumulate in.

use crate::{SafetyAction, SpanRoi, TypeMixture};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Allocated/used/pruned token counts for one budget component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ComponentLedger {
    pub allocated: i64,
    pub used: i64,
    pub pruned: i64,
}

/// The full per-component budget ledger for a turn.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BudgetLedger {
    pub error_epochs: ComponentLedger,
    pub tone_analysis: ComponentLedger,
    pub recent_context: ComponentLedger,
    pub aux_dependencies: ComponentLedger,
}

/// Split/merge churn reported by the external memory collaborator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Churn {
    pub splits: i64,
    pub merges: i64,
}

/// A safety-rail or resolver intervention worth recording against a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterventionRecord {
    pub component: String,
    pub action: SafetyAction,
    pub reason: String,
}

/// Complete telemetry for one turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub turn_id: u64,
    pub timestamp: DateTime<Utc>,
    pub query_hash: String,
    pub policy_id: String,
    pub type_mixture: TypeMixture,
    pub budget_ledger: BudgetLedger,
    pub roi_top_10: Vec<SpanRoi>,
    pub mixture_trace: Vec<TypeMixture>,
    pub churn: Churn,
    pub interventions: Vec<InterventionRecord>,
}

/// A bounded ring of the most recent telemetry records.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TelemetryRing {
    pub records: Vec<TelemetryRecord>,
    pub capacity: usize,
    next_turn_id: u64,
}

impl TelemetryRing {
    pub fn new(capacity: usize) -> Self {
        TelemetryRing {
            records: Vec::new(),
            capacity,
            next_turn_id: 1,
        }
    }

    pub fn next_turn_id(&mut self) -> u64 {
        let id = self.next_turn_id;
        self.next_turn_id += 1;
        id
    }

    pub fn push(&mut self, record: TelemetryRecord) {
        self.records.push(record);
        if self.records.len() > self.capacity {
            let overflow = self.records.len() - self.capacity;
            self.records.drain(0..overflow);
        }
    }

    pub fn last_n_mixtures(&self, n: usize) -> Vec<TypeMixture> {
        self.records
            .iter()
            .rev()
            .take(n)
            .map(|r| r.type_mixture)
            .rev()
            .collect()
    }

    pub fn export(&self) -> TelemetryExport {
        TelemetryExport {
            turn_count: self.records.len(),
            turns: self.records.clone(),
        }
    }
}

/// Shape of the telemetry JSON export named in the external interfaces.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryExport {
    pub turn_count: usize,
    pub turns: Vec<TelemetryRecord>,
}

/// An anomaly surfaced by the telemetry recorder (entropy homogenization
/// or split/merge churn miscalibration).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryAnomaly {
    pub kind: String,
    pub message: String,
}

pub type ConflictStatistics = BTreeMap<String, usize>;
