//! Expected Calibration Error measurement and drift detection. The sole
//! writer of `CalibrationState::drift_detected`.

use crate::classifier::classify_mixture;
use fractal_core::{CalibrationState, Thresholds};

/// Result of one `calibration_check` call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationCheck {
    pub ece: f64,
    pub drift_detected: bool,
    pub logic_floor: f64,
}

/// Compute Expected Calibration Error over the calibration set, binned by
/// the classifier's top-weight confidence into `thresholds.ece_bin_count`
/// equal-width bins.
fn calculate_ece(state: &CalibrationState, thresholds: &Thresholds) -> f64 {
    if state.calibration_set.is_empty() {
        return 0.0;
    }

    struct Prediction {
        confidence: f64,
        correct: bool,
    }

    let predictions: Vec<Prediction> = state
        .calibration_set
        .iter()
        .map(|example| {
            let mixture = classify_mixture(&example.query, &[], thresholds, state.logic_floor());
            let (predicted_dominant, confidence) = mixture.dominant();
            let (true_dominant, _) = example.ground_truth.dominant();
            Prediction {
                confidence,
                correct: predicted_dominant == true_dominant,
            }
        })
        .collect();

    let bin_count = thresholds.ece_bin_count;
    let mut ece = 0.0;
    for i in 0..bin_count {
        let lo = i as f64 / bin_count as f64;
        let hi = (i + 1) as f64 / bin_count as f64;
        let in_bin: Vec<&Prediction> = predictions
            .iter()
            .filter(|p| p.confidence >= lo && (p.confidence < hi || (i == bin_count - 1 && p.confidence <= hi)))
            .collect();
        if in_bin.is_empty() {
            continue;
        }
        let avg_confidence: f64 = in_bin.iter().map(|p| p.confidence).sum::<f64>() / in_bin.len() as f64;
        let avg_accuracy: f64 =
            in_bin.iter().map(|p| if p.correct { 1.0 } else { 0.0 }).sum::<f64>() / in_bin.len() as f64;
        ece += (avg_confidence - avg_accuracy).abs() * (in_bin.len() as f64 / predictions.len() as f64);
    }
    ece
}

/// Run the calibration monitor once, updating `state` in place. Only this
/// function may set `state.drift_detected`.
pub fn calibration_check(state: &mut CalibrationState, thresholds: &Thresholds) -> CalibrationCheck {
    let ece = calculate_ece(state, thresholds);
    state.last_ece = Some(ece);
    state.history.push(fractal_core::EceReading {
        timestamp: chrono::Utc::now(),
        ece,
    });

    if ece > thresholds.ece_drift_threshold {
        if !state.drift_detected {
            tracing::info!(ece, threshold = thresholds.ece_drift_threshold, "classifier drift detected, raising logic floor to 0.35");
        }
        state.drift_detected = true;
    } else {
        if state.drift_detected {
            tracing::info!(ece, "calibration restored, lowering logic floor to 0.15");
        }
        state.drift_detected = false;
    }

    CalibrationCheck {
        ece,
        drift_detected: state.drift_detected,
        logic_floor: state.logic_floor(),
    }
}
