//! Calibration state: the classifier's only persistent, mutable input
//! besides the telemetry ring.

use crate::TypeMixture;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One calibration example: a query and its hand-labeled ground-truth mixture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationExample {
    pub query: String,
    pub ground_truth: TypeMixture,
}

/// One historical ECE measurement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EceReading {
    pub timestamp: DateTime<Utc>,
    pub ece: f64,
}

/// Persistent calibration state, read every turn (to learn the active
/// logic floor) and written only by the calibration monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    pub calibration_set: Vec<CalibrationExample>,
    pub drift_detected: bool,
    pub last_ece: Option<f64>,
    pub history: Vec<EceReading>,
}

impl CalibrationState {
    pub fn new(calibration_set: Vec<CalibrationExample>) -> Self {
        CalibrationState {
            calibration_set,
            drift_detected: false,
            last_ece: None,
            history: Vec::new(),
        }
    }

    /// The four-item default calibration set recovered from the original
    /// implementation, used when `calibration_set.json` is absent.
    pub fn default_calibration_set() -> Vec<CalibrationExample> {
        vec![
            CalibrationExample {
                query: "What is the ratio of x and y?".to_string(),
                ground_truth: TypeMixture {
                    pattern_language: 0.0,
                    logic: 1.0,
                    creative: 0.0,
                    retrieval: 0.0,
                },
            },
            CalibrationExample {
                query: "Is this correct? A) Yes B) No".to_string(),
                ground_truth: TypeMixture {
                    pattern_language: 1.0,
                    logic: 0.0,
                    creative: 0.0,
                    retrieval: 0.0,
                },
            },
            CalibrationExample {
                query: "Design a creative solution".to_string(),
                ground_truth: TypeMixture {
                    pattern_language: 0.0,
                    logic: 0.0,
                    creative: 1.0,
                    retrieval: 0.0,
                },
            },
            CalibrationExample {
                query: "Find documents about AI".to_string(),
                ground_truth: TypeMixture {
                    pattern_language: 0.0,
                    logic: 0.0,
                    creative: 0.0,
                    retrieval: 1.0,
                },
            },
        ]
    }

    /// The active logic floor implied by the current drift state. 0.15
    /// normally, 0.35 once drift has been detected.
    pub fn logic_floor(&self) -> f64 {
        if self.drift_detected {
            0.35
        } else {
            0.15
        }
    }
}

impl Default for CalibrationState {
    fn default() -> Self {
        CalibrationState::new(CalibrationState::default_calibration_set())
    }
}
