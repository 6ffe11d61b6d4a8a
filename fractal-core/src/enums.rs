//! Closed enums for the Fractal Policy Controller.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

fn normalize_token(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// The four cognitive query types. A `TypeMixture` always carries exactly
/// these four, in this order, so downstream code can iterate deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    PatternLanguage,
    Logic,
    Creative,
    Retrieval,
}

impl QueryType {
    pub const ALL: [QueryType; 4] = [
        QueryType::PatternLanguage,
        QueryType::Logic,
        QueryType::Creative,
        QueryType::Retrieval,
    ];
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            QueryType::PatternLanguage => "pattern_language",
            QueryType::Logic => "logic",
            QueryType::Creative => "creative",
            QueryType::Retrieval => "retrieval",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for QueryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "patternlanguage" | "pattern" => Ok(QueryType::PatternLanguage),
            "logic" => Ok(QueryType::Logic),
            "creative" => Ok(QueryType::Creative),
            "retrieval" => Ok(QueryType::Retrieval),
            _ => Err(format!("invalid QueryType: {}", s)),
        }
    }
}

/// The two derived "axes" over the four query types. Only consumed by the
/// policy emitter's compression-target adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Axis {
    LogicCreative,
    PatternLanguage,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Axis::LogicCreative => "logic_creative",
            Axis::PatternLanguage => "pattern_language",
        };
        write!(f, "{}", value)
    }
}

/// Closed vocabulary of span categories that have special meaning to the
/// critical-span bypass and hard-floor logic, extended by a free-form tag
/// for anything else. Span *types* (`SpanType`, used by the allocator's
/// gain tables) are a separate, narrower closed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanCategory {
    CurrentQuery,
    LastUserMessage,
    ActiveError,
    ReasoningSteps,
    Invariants,
    ErrorChains,
    ProofTraces,
    MathematicalDerivations,
    Facts,
    Citations,
    Sources,
    GroundTruth,
    Provenance,
    ConcreteExamples,
    StylePatterns,
    Constraints,
    CreativeIntent,
    Other(String),
}

impl fmt::Display for SpanCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SpanCategory::CurrentQuery => "current_query",
            SpanCategory::LastUserMessage => "last_user_message",
            SpanCategory::ActiveError => "active_error",
            SpanCategory::ReasoningSteps => "reasoning_steps",
            SpanCategory::Invariants => "invariants",
            SpanCategory::ErrorChains => "error_chains",
            SpanCategory::ProofTraces => "proof_traces",
            SpanCategory::MathematicalDerivations => "mathematical_derivations",
            SpanCategory::Facts => "facts",
            SpanCategory::Citations => "citations",
            SpanCategory::Sources => "sources",
            SpanCategory::GroundTruth => "ground_truth",
            SpanCategory::Provenance => "provenance",
            SpanCategory::ConcreteExamples => "concrete_examples",
            SpanCategory::StylePatterns => "style_patterns",
            SpanCategory::Constraints => "constraints",
            SpanCategory::CreativeIntent => "creative_intent",
            SpanCategory::Other(tag) => tag,
        };
        write!(f, "{}", value)
    }
}

impl FromStr for SpanCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "current_query" => SpanCategory::CurrentQuery,
            "last_user_message" => SpanCategory::LastUserMessage,
            "active_error" => SpanCategory::ActiveError,
            "reasoning_steps" => SpanCategory::ReasoningSteps,
            "invariants" => SpanCategory::Invariants,
            "error_chains" => SpanCategory::ErrorChains,
            "proof_traces" => SpanCategory::ProofTraces,
            "mathematical_derivations" => SpanCategory::MathematicalDerivations,
            "facts" => SpanCategory::Facts,
            "citations" => SpanCategory::Citations,
            "sources" => SpanCategory::Sources,
            "ground_truth" => SpanCategory::GroundTruth,
            "provenance" => SpanCategory::Provenance,
            "concrete_examples" => SpanCategory::ConcreteExamples,
            "style_patterns" => SpanCategory::StylePatterns,
            "constraints" => SpanCategory::Constraints,
            "creative_intent" => SpanCategory::CreativeIntent,
            other => SpanCategory::Other(other.to_string()),
        })
    }
}

/// Span type, used only by the knapsack allocator's gain tables. Distinct
/// from `SpanCategory`: a span can carry an `error_epoch` type and a
/// `current_query` category at the same time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpanType {
    ErrorEpoch,
    ToneShift,
    RecentTurn,
    AuxDep,
}

impl fmt::Display for SpanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SpanType::ErrorEpoch => "error_epoch",
            SpanType::ToneShift => "tone_shift",
            SpanType::RecentTurn => "recent_turn",
            SpanType::AuxDep => "aux_dep",
        };
        write!(f, "{}", value)
    }
}

impl FromStr for SpanType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize_token(s).as_str() {
            "errorepoch" => Ok(SpanType::ErrorEpoch),
            "toneshift" => Ok(SpanType::ToneShift),
            "recentturn" => Ok(SpanType::RecentTurn),
            "auxdep" => Ok(SpanType::AuxDep),
            _ => Err(format!("invalid SpanType: {}", s)),
        }
    }
}

/// Lesson storage mode, per `LessonsPolicy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageMode {
    Raw,
    Pattern,
    Superpattern,
    Mixed,
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            StorageMode::Raw => "raw",
            StorageMode::Pattern => "pattern",
            StorageMode::Superpattern => "superpattern",
            StorageMode::Mixed => "mixed",
        };
        write!(f, "{}", value)
    }
}

/// Compression level paired with a `StorageMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for CompressionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            CompressionLevel::Low => "low",
            CompressionLevel::Medium => "medium",
            CompressionLevel::High => "high",
        };
        write!(f, "{}", value)
    }
}

/// The action a retrieval-safety check (or a cross-layer conflict
/// resolution) asks the caller to take.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyAction {
    Proceed,
    UseTemplate,
    AddCitations,
}

impl fmt::Display for SafetyAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            SafetyAction::Proceed => "proceed",
            SafetyAction::UseTemplate => "use_template",
            SafetyAction::AddCitations => "add_citations",
        };
        write!(f, "{}", value)
    }
}

/// Outcome of the memory/token compression-conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionDecision {
    Compress,
    Expand,
}

impl fmt::Display for CompressionDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            CompressionDecision::Compress => "compress",
            CompressionDecision::Expand => "expand",
        };
        write!(f, "{}", value)
    }
}
