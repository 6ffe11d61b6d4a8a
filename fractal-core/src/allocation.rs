//! Allocation results and the ROI telemetry the allocator reports.

use crate::Span;
use serde::{Deserialize, Serialize};

/// One span's scored outcome, kept for the top-10 kept/dropped lists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanRoi {
    pub span_id: String,
    pub span_type: crate::SpanType,
    pub gain: f64,
    pub cost: i64,
    pub ratio: f64,
    pub kept: bool,
}

/// Telemetry produced by a single `allocate` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationTelemetry {
    pub total_spans: usize,
    pub chosen_before_ib: usize,
    pub chosen_after_ib: usize,
    pub tokens_used: i64,
    pub tokens_budget: i64,
    pub utilization_pct: f64,
    pub lambda_threshold: f64,
    pub roi_top_10_kept: Vec<SpanRoi>,
    pub roi_top_10_dropped: Vec<SpanRoi>,
}

/// The result of one `allocate` call: the chosen spans (before any
/// critical-span union) and the telemetry describing how they were chosen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub chosen: Vec<Span>,
    pub token_count: i64,
    pub telemetry: AllocationTelemetry,
}
