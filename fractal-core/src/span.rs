//! Context spans: the candidate payloads the allocator chooses among.

use crate::SpanCategory;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// A candidate piece of context, produced by an upstream collaborator and
/// consumed read-only by the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Span {
    pub span_id: String,
    pub span_type: crate::SpanType,
    pub cost: i64,
    pub text: String,
    pub metadata: Option<SpanMetadata>,
}

/// An as-received span whose `span_type` has not yet been validated against
/// the closed `SpanType` set: the wire shape for spans accepted from an
/// upstream collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSpan {
    pub span_id: String,
    pub span_type: String,
    pub cost: i64,
    pub text: String,
}

impl RawSpan {
    pub fn into_span(self) -> Span {
        Span::from_raw_type(self.span_id, &self.span_type, self.cost, self.text)
    }
}

impl Span {
    pub fn new(span_id: impl Into<String>, span_type: crate::SpanType, cost: i64, text: impl Into<String>) -> Self {
        Span {
            span_id: span_id.into(),
            span_type,
            cost,
            text: text.into(),
            metadata: None,
        }
    }

    /// Build a span from an upstream collaborator's raw type string,
    /// remapping anything outside the closed `SpanType` set to `AuxDep`
    /// (lowest allocator priority) rather than rejecting the span.
    pub fn from_raw_type(span_id: impl Into<String>, raw_type: &str, cost: i64, text: impl Into<String>) -> Self {
        let span_type = crate::SpanType::from_str(raw_type).unwrap_or(crate::SpanType::AuxDep);
        Span::new(span_id, span_type, cost, text)
    }

    pub fn with_category(mut self, category: SpanCategory) -> Self {
        let meta = self.metadata.get_or_insert_with(SpanMetadata::default);
        meta.category = Some(category);
        self
    }

    pub fn with_source(mut self, source_id: impl Into<String>, confidence: f64) -> Self {
        let meta = self.metadata.get_or_insert_with(SpanMetadata::default);
        meta.source_id = Some(source_id.into());
        meta.confidence = Some(confidence);
        self
    }

    pub fn category(&self) -> Option<&SpanCategory> {
        self.metadata.as_ref().and_then(|m| m.category.as_ref())
    }
}

/// Optional metadata carried by a span: its bypass category and its
/// provenance (source id + confidence), used by the retrieval safety rails.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SpanMetadata {
    pub category: Option<SpanCategory>,
    pub source_id: Option<String>,
    pub confidence: Option<f64>,
}

/// A retrieved source, as consumed by `check_safety`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    pub text: String,
    pub confidence: f64,
}

impl Source {
    pub fn new(source_id: impl Into<String>, text: impl Into<String>, confidence: f64) -> Self {
        Source {
            source_id: source_id.into(),
            text: text.into(),
            confidence,
        }
    }
}
