use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

use super::Threshold;
use crate::error::ToolError;
use crate::models::{DigitPrediction, MeterReading, SavedWindow, EXPECTED_WINDOWS};

/// What a tool call reports back to the orchestrator
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Observation {
    WindowsFound {
        threshold: Threshold,
        files: Vec<PathBuf>,
        confidences: Vec<f32>,
    },
    CountMismatch {
        threshold: Threshold,
        found: usize,
        expected: usize,
    },
    Digits {
        predictions: Vec<DigitPrediction>,
    },
    Reading(MeterReading),
    Error {
        kind: String,
        message: String,
        fatal: bool,
    },
}

impl Observation {
    pub fn windows_found(threshold: Threshold, windows: &[SavedWindow]) -> Self {
        Observation::WindowsFound {
            threshold,
            files: windows.iter().map(|w| w.path.clone()).collect(),
            confidences: windows.iter().map(|w| w.confidence).collect(),
        }
    }

    pub fn count_mismatch(threshold: Threshold, found: usize) -> Self {
        Observation::CountMismatch {
            threshold,
            found,
            expected: EXPECTED_WINDOWS,
        }
    }

    pub fn from_error(err: &ToolError) -> Self {
        Observation::Error {
            kind: err.kind().to_string(),
            message: err.to_string(),
            fatal: err.is_fatal(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Observation::CountMismatch { .. } | Observation::Error { .. })
    }

    /// One-line summary for humans and language models
    pub fn message(&self) -> String {
        match self {
            Observation::WindowsFound { threshold, files, .. } => format!(
                "OBSERVATION: SUCCESS. Found {} windows using threshold {}. Files: {}",
                files.len(),
                threshold,
                files.iter().map(|f| f.display().to_string()).collect::<Vec<_>>().join(", ")
            ),
            Observation::CountMismatch { threshold, found, expected } => format!(
                "OBSERVATION: FAILURE. Found {} windows using threshold {}, expected exactly {}. Try a different threshold.",
                found, threshold, expected
            ),
            Observation::Digits { predictions } => {
                let digits: String = predictions.iter().map(|p| p.digit.as_char()).collect();
                format!(
                    "OBSERVATION: SUCCESS. Recognized {} digits: {}",
                    predictions.len(),
                    digits
                )
            }
            Observation::Reading(reading) => format!(
                "OBSERVATION: SUCCESS. Reading {} with reliability score {:.3}.",
                reading.digits, reading.reliability_score
            ),
            Observation::Error { message, .. } => format!("OBSERVATION: ERROR. {}", message),
        }
    }

    /// Serialized form with the summary under "message"
    pub fn to_json(&self) -> Value {
        let mut value = serde_json::to_value(self).unwrap_or_else(|e| {
            serde_json::json!({ "status": "error", "kind": "serialization", "fatal": true, "message": e.to_string() })
        });
        if let Value::Object(map) = &mut value {
            map.entry("message").or_insert_with(|| Value::String(self.message()));
        }
        value
    }
}

impl From<ToolError> for Observation {
    fn from(err: ToolError) -> Self {
        Observation::from_error(&err)
    }
}
