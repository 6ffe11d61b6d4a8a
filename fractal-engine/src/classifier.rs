//! Four-head ensemble classifier: turns a query (plus recent history) into
//! a `TypeMixture`, with a dynamic logic floor and the derived Travis axes.

use fractal_core::{LambdaTable, QueryType, Thresholds, TypeMixture};
use once_cell::sync::Lazy;
use regex::Regex;

static MULTI_CHOICE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[A-D]\)").unwrap());
static TRUE_FALSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(true|false)\?").unwrap());
static CODE_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"```|def |class |import ").unwrap());
static MATH_MARKERS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$|=|\\").unwrap());
static CITATION_MARKERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\[[0-9]+\]|\(.*20[0-9]{2}\)|et al\.").unwrap());
static WORD_OR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bor\b").unwrap());

const LEXICAL_PATTERN_LANGUAGE: &[&str] =
    &["is", "which", "does", "correct", "match", "choose", "select", "pick"];
const LEXICAL_LOGIC: &[&str] = &[
    "what",
    "how",
    "why",
    "ratio",
    "relationship",
    "because",
    "therefore",
    "implies",
];
const LEXICAL_CREATIVE: &[&str] = &["imagine", "design", "create", "invent", "suppose", "what if", "could"];
const LEXICAL_RETRIEVAL: &[&str] = &["find", "lookup", "search", "retrieve", "where is", "show me", "get"];

const PRAGMATIC_QUESTION: &[&str] = &["what", "how", "why", "when", "where", "who"];
const PRAGMATIC_COMMAND: &[&str] = &["do", "make", "create", "build", "show"];
const PRAGMATIC_VERIFICATION: &[&str] = &["is", "does", "can", "will", "should"];
const PRAGMATIC_EXPLORATION: &[&str] = &["might", "could", "would", "imagine"];

/// A 4-vector over `[pattern_language, logic, creative, retrieval]`, the
/// intermediate representation each head and the fusion step work in
/// before it is wrapped as a normalized `TypeMixture`.
#[derive(Debug, Clone, Copy)]
struct Vec4(f64, f64, f64, f64);

impl Vec4 {
    fn zero() -> Self {
        Vec4(0.0, 0.0, 0.0, 0.0)
    }

    fn uniform() -> Self {
        Vec4(0.25, 0.25, 0.25, 0.25)
    }

    fn sum(&self) -> f64 {
        self.0 + self.1 + self.2 + self.3
    }

    fn normalize_or(self, fallback: Vec4) -> Self {
        let s = self.sum();
        if s > 0.0 {
            Vec4(self.0 / s, self.1 / s, self.2 / s, self.3 / s)
        } else {
            fallback
        }
    }

    fn scale(&self, k: f64) -> Vec4 {
        Vec4(self.0 * k, self.1 * k, self.2 * k, self.3 * k)
    }

    fn add(&self, other: Vec4) -> Vec4 {
        Vec4(self.0 + other.0, self.1 + other.1, self.2 + other.2, self.3 + other.3)
    }

    fn to_mixture(self) -> TypeMixture {
        TypeMixture {
            pattern_language: self.0,
            logic: self.1,
            creative: self.2,
            retrieval: self.3,
        }
    }
}

struct Features<'a> {
    text: &'a str,
    text_lower: String,
    has_question_mark: bool,
    has_code_markers: bool,
    has_math_markers: bool,
}

fn extract_features(text: &str) -> Features<'_> {
    Features {
        text,
        text_lower: text.to_lowercase(),
        has_question_mark: text.contains('?'),
        has_code_markers: CODE_MARKERS.is_match(text),
        has_math_markers: MATH_MARKERS.is_match(text),
    }
}

fn lexical_head(feats: &Features) -> Vec4 {
    let mut scores = Vec4::zero();
    for pattern in LEXICAL_PATTERN_LANGUAGE {
        if feats.text_lower.contains(pattern) {
            scores.0 += 1.0;
        }
    }
    for pattern in LEXICAL_LOGIC {
        if feats.text_lower.contains(pattern) {
            scores.1 += 1.0;
        }
    }
    for pattern in LEXICAL_CREATIVE {
        if feats.text_lower.contains(pattern) {
            scores.2 += 1.0;
        }
    }
    for pattern in LEXICAL_RETRIEVAL {
        if feats.text_lower.contains(pattern) {
            scores.3 += 1.0;
        }
    }
    scores.normalize_or(Vec4::uniform())
}

fn structural_head(feats: &Features) -> Vec4 {
    let has_multi_choice = MULTI_CHOICE.is_match(feats.text);
    let has_true_false = TRUE_FALSE.is_match(feats.text);
    let has_options = feats.text_lower.contains("option") || feats.text_lower.contains("choice");
    let has_vs_or = WORD_OR.is_match(feats.text) && feats.text.matches('?').count() == 1;

    if has_multi_choice || has_true_false || has_options || has_vs_or {
        return Vec4(1.0, 0.1, 0.1, 0.1).normalize_or(Vec4::uniform());
    }

    let mut scores = Vec4(0.1, 0.1, 0.1, 0.1);

    let is_open_question = feats.text.trim_end().ends_with('?') && !has_multi_choice;
    let has_ratio = feats.text_lower.contains("ratio");
    let has_why_how = ["why", "how", "explain", "prove", "derive"]
        .iter()
        .any(|w| feats.text_lower.contains(w));
    if is_open_question && (has_ratio || has_why_how) {
        scores.1 += 0.8;
        scores.2 += 0.3;
    }

    if feats.has_code_markers {
        scores.1 += 0.4;
        scores.3 += 0.2;
    }
    if feats.has_math_markers {
        scores.1 += 0.6;
    }
    if CITATION_MARKERS.is_match(feats.text) {
        scores.3 += 0.4;
    }
    if ["design", "create", "imagine", "write", "generate"]
        .iter()
        .any(|w| feats.text_lower.contains(w))
    {
        scores.2 += 0.6;
    }
    if ["find", "search", "document", "locate", "retrieve"]
        .iter()
        .any(|w| feats.text_lower.contains(w))
    {
        scores.3 += 0.6;
    }

    scores.normalize_or(Vec4::uniform())
}

fn pragmatic_head(feats: &Features) -> Vec4 {
    let mut scores = Vec4::zero();
    if PRAGMATIC_QUESTION.iter().any(|v| feats.text_lower.contains(v)) {
        if feats.has_question_mark {
            scores.1 += 0.5;
        } else {
            scores.0 += 0.3;
        }
    }
    if PRAGMATIC_VERIFICATION.iter().any(|v| feats.text_lower.contains(v)) {
        scores.0 += 0.6;
    }
    if PRAGMATIC_COMMAND.iter().any(|v| feats.text_lower.contains(v)) {
        scores.2 += 0.5;
    }
    if PRAGMATIC_EXPLORATION.iter().any(|v| feats.text_lower.contains(v)) {
        scores.2 += 0.6;
    }
    scores.normalize_or(Vec4::uniform())
}

fn uncertainty_head(feats: &Features) -> Vec4 {
    let words: Vec<&str> = feats.text_lower.split_whitespace().collect();
    if words.is_empty() {
        return Vec4::uniform();
    }
    let unique: std::collections::HashSet<&&str> = words.iter().collect();
    let diversity = unique.len() as f64 / words.len() as f64;

    let mut scores = Vec4::zero();
    if diversity > 0.7 {
        scores.1 += 0.4;
        scores.2 += 0.4;
    } else if diversity > 0.5 {
        scores.1 += 0.5;
        scores.0 += 0.3;
    } else {
        scores.0 += 0.5;
        scores.3 += 0.3;
    }
    scores.normalize_or(Vec4::uniform())
}

fn softmax(logits: Vec4) -> Vec4 {
    let max = logits.0.max(logits.1).max(logits.2).max(logits.3);
    let e = Vec4(
        (logits.0 - max).exp(),
        (logits.1 - max).exp(),
        (logits.2 - max).exp(),
        (logits.3 - max).exp(),
    );
    let sum = e.sum();
    Vec4(e.0 / sum, e.1 / sum, e.2 / sum, e.3 / sum)
}

/// Classify a query (with optional recent history, carried for parity with
/// the feature extractor's contract even though no head currently reads
/// it) into a normalized `TypeMixture` with the dynamic logic floor and
/// pattern-override fusion applied.
pub fn classify_mixture(query: &str, _history: &[String], thresholds: &Thresholds, logic_floor_active: f64) -> TypeMixture {
    if query.trim().is_empty() {
        return TypeMixture::uniform().sanitize();
    }

    let feats = extract_features(query);
    let v_lex = lexical_head(&feats);
    let v_struct = structural_head(&feats);
    let v_prag = pragmatic_head(&feats);
    let v_unc = uncertainty_head(&feats);

    let pattern_signal = v_struct.0;
    let fw = &thresholds.fusion_weights;

    let (logits, logic_floor) = if pattern_signal > 0.7 {
        // pattern_override is a per-head scalar weight (not per-class), applied
        // to each head's whole vector before summing.
        let over = fw.pattern_override;
        let fused = v_lex
            .scale(over[0])
            .add(v_struct.scale(over[1]))
            .add(v_prag.scale(over[2]))
            .add(v_unc.scale(over[3]));
        (fused, 0.05)
    } else {
        let lex = Vec4(fw.lexical[0], fw.lexical[1], fw.lexical[2], fw.lexical[3]);
        let st = Vec4(fw.structural[0], fw.structural[1], fw.structural[2], fw.structural[3]);
        let pr = Vec4(fw.pragmatic[0], fw.pragmatic[1], fw.pragmatic[2], fw.pragmatic[3]);
        let un = Vec4(fw.uncertainty[0], fw.uncertainty[1], fw.uncertainty[2], fw.uncertainty[3]);
        let fused = Vec4(
            v_lex.0 * lex.0 + v_struct.0 * st.0 + v_prag.0 * pr.0 + v_unc.0 * un.0,
            v_lex.1 * lex.1 + v_struct.1 * st.1 + v_prag.1 * pr.1 + v_unc.1 * un.1,
            v_lex.2 * lex.2 + v_struct.2 * st.2 + v_prag.2 * pr.2 + v_unc.2 * un.2,
            v_lex.3 * lex.3 + v_struct.3 * st.3 + v_prag.3 * pr.3 + v_unc.3 * un.3,
        );
        (fused, logic_floor_active)
    };

    let w = softmax(logits);
    let floor_vec = Vec4(0.0, 1.0, 0.0, 0.0);
    let w = floor_vec.scale(logic_floor).add(w.scale(1.0 - logic_floor));
    let sum = w.sum();
    let w = Vec4(w.0 / sum, w.1 / sum, w.2 / sum, w.3 / sum);

    w.to_mixture().sanitize()
}

/// Dominant type and its weight, following `get_dominant_type`.
pub fn dominant_type(mixture: &TypeMixture) -> (QueryType, f64) {
    mixture.dominant()
}

/// Mixture-weighted IB lambda, shared between classifier and allocator.
pub fn lambda_for_mixture(mixture: &TypeMixture, table: &LambdaTable) -> f64 {
    mixture
        .iter()
        .into_iter()
        .map(|(t, w)| w * table.get(t))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_query_returns_uniform_with_logic_floor() {
        let thresholds = Thresholds::default();
        let m = classify_mixture("", &[], &thresholds, 0.15);
        assert!((m.sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn logic_floor_is_always_respected() {
        let thresholds = Thresholds::default();
        let queries = [
            "What is the ratio of x and y?",
            "Is this correct? A) Yes B) No",
            "Design a creative solution",
            "Find documents about AI",
        ];
        for q in queries {
            let m = classify_mixture(q, &[], &thresholds, 0.15);
            assert!(m.logic >= 0.15 - 1e-9, "logic floor violated for {q}: {m:?}");
        }
    }

    #[test]
    fn multi_choice_triggers_pattern_override_with_lower_floor() {
        let thresholds = Thresholds::default();
        let m = classify_mixture("Is this correct? A) Yes B) No", &[], &thresholds, 0.15);
        assert!(m.pattern_language > m.logic);
        assert!(m.logic >= 0.05 - 1e-9);
    }

    #[test]
    fn mixture_always_sums_to_one() {
        let thresholds = Thresholds::default();
        for q in ["How does recursion work in Python?", "Which option is best?"] {
            let m = classify_mixture(q, &[], &thresholds, 0.15);
            assert!((m.sum() - 1.0).abs() < 1e-6);
        }
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// For any query text and any logic-floor value in its valid range,
        /// the classified mixture sums to 1.0 and has no negative weight.
        #[test]
        fn prop_mixture_is_a_valid_distribution(query in ".*", logic_floor in 0.0f64..1.0) {
            let thresholds = Thresholds::default();
            let m = classify_mixture(&query, &[], &thresholds, logic_floor);
            prop_assert!((m.sum() - 1.0).abs() < 1e-6, "mixture did not sum to 1: {:?}", m);
            for (_, w) in m.iter() {
                prop_assert!(w >= -1e-9, "negative weight in mixture: {:?}", m);
            }
        }

        /// Classifying the same query twice with the same inputs produces a
        /// bit-identical mixture.
        #[test]
        fn prop_classification_is_deterministic(query in ".*") {
            let thresholds = Thresholds::default();
            let a = classify_mixture(&query, &[], &thresholds, 0.15);
            let b = classify_mixture(&query, &[], &thresholds, 0.15);
            prop_assert_eq!(serde_json::to_string(&a).unwrap(), serde_json::to_string(&b).unwrap());
        }
    }
}
