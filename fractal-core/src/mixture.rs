//! The type mixture and its derived "Travis axes" metadata.

use crate::{Axis, QueryType};
use serde::{Deserialize, Serialize};

/// A probability distribution over the four cognitive query types. Always
/// constructed normalized: the four weights sum to 1.0 within floating
/// point tolerance.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TypeMixture {
    pub pattern_language: f64,
    pub logic: f64,
    pub creative: f64,
    pub retrieval: f64,
}

impl TypeMixture {
    /// A uniform mixture with no floor applied.
    pub fn uniform() -> Self {
        TypeMixture {
            pattern_language: 0.25,
            logic: 0.25,
            creative: 0.25,
            retrieval: 0.25,
        }
    }

    pub fn weight(&self, t: QueryType) -> f64 {
        match t {
            QueryType::PatternLanguage => self.pattern_language,
            QueryType::Logic => self.logic,
            QueryType::Creative => self.creative,
            QueryType::Retrieval => self.retrieval,
        }
    }

    pub fn set_weight(&mut self, t: QueryType, value: f64) {
        match t {
            QueryType::PatternLanguage => self.pattern_language = value,
            QueryType::Logic => self.logic = value,
            QueryType::Creative => self.creative = value,
            QueryType::Retrieval => self.retrieval = value,
        }
    }

    /// Iterate `(type, weight)` pairs in the fixed canonical order.
    pub fn iter(&self) -> [(QueryType, f64); 4] {
        [
            (QueryType::PatternLanguage, self.pattern_language),
            (QueryType::Logic, self.logic),
            (QueryType::Creative, self.creative),
            (QueryType::Retrieval, self.retrieval),
        ]
    }

    pub fn sum(&self) -> f64 {
        self.pattern_language + self.logic + self.creative + self.retrieval
    }

    /// Replace any non-finite weight with 0.0 and re-normalize, per the
    /// input-defect handling rule for non-finite mixture weights.
    pub fn sanitize(mut self) -> Self {
        for t in QueryType::ALL {
            if !self.weight(t).is_finite() {
                self.set_weight(t, 0.0);
            }
        }
        let total = self.sum();
        if total > 0.0 {
            for t in QueryType::ALL {
                self.set_weight(t, self.weight(t) / total);
            }
        } else {
            self = TypeMixture::uniform();
        }
        self
    }

    /// The dominant type (highest weight) and its weight.
    pub fn dominant(&self) -> (QueryType, f64) {
        self.iter()
            .into_iter()
            .fold((QueryType::PatternLanguage, f64::MIN), |best, cur| {
                if cur.1 > best.1 {
                    cur
                } else {
                    best
                }
            })
    }

    /// Shannon entropy of the mixture, in bits.
    pub fn entropy(&self) -> f64 {
        self.iter()
            .into_iter()
            .map(|(_, w)| if w > 0.0 { -w * w.log2() } else { 0.0 })
            .sum()
    }

    /// Derive the two Travis axes from this mixture.
    pub fn travis_axes(&self) -> TravisAxes {
        let logic_creative = self.logic + self.creative;
        let pattern_language = self.pattern_language + self.retrieval;
        let (dominant_axis, dominant_strength) = if logic_creative > pattern_language {
            (Axis::LogicCreative, logic_creative)
        } else {
            (Axis::PatternLanguage, pattern_language)
        };
        TravisAxes {
            logic_creative,
            pattern_language,
            dominant_axis,
            dominant_strength,
        }
    }
}

/// Derived metadata attached to a classifier output. Consumed only by the
/// policy emitter's compression-target adjustment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TravisAxes {
    pub logic_creative: f64,
    pub pattern_language: f64,
    pub dominant_axis: Axis,
    pub dominant_strength: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_mixture_sums_to_one() {
        assert!((TypeMixture::uniform().sum() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn sanitize_zeroes_non_finite_weights_and_renormalizes() {
        let m = TypeMixture {
            pattern_language: f64::NAN,
            logic: 0.5,
            creative: 0.5,
            retrieval: 0.0,
        }
        .sanitize();
        assert!((m.sum() - 1.0).abs() < 1e-9);
        assert_eq!(m.pattern_language, 0.0);
    }

    #[test]
    fn sanitize_falls_back_to_uniform_when_everything_cancels() {
        let m = TypeMixture {
            pattern_language: 0.0,
            logic: 0.0,
            creative: 0.0,
            retrieval: 0.0,
        }
        .sanitize();
        assert_eq!(m, TypeMixture::uniform());
    }

    #[test]
    fn dominant_picks_highest_weight() {
        let m = TypeMixture {
            pattern_language: 0.1,
            logic: 0.6,
            creative: 0.2,
            retrieval: 0.1,
        };
        assert_eq!(m.dominant().0, QueryType::Logic);
    }
}
