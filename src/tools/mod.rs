//! Tool facade: the three operations an orchestrator can call.

pub mod args;
pub mod observation;

use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::aggregate::aggregate;
use crate::classify::{DigitClassifier, DigitModel};
use crate::detection::{DetectionOutcome, WindowDetector, WindowModel};
use crate::error::ToolError;
use crate::models::{DigitPrediction, MeterReading, SavedWindow};

pub use args::{parse_image_path, parse_path_list, parse_predictions, Threshold};
pub use observation::Observation;

pub const DETECT_WINDOWS: &str = "detect_windows";
pub const RECOGNIZE_DIGITS: &str = "recognize_digits";
pub const AGGREGATE: &str = "aggregate";

/// Threshold used when a detect call does not name one
pub const DEFAULT_THRESHOLD: f64 = 0.5;

const THRESHOLD_KEYS: [&str; 3] = ["min_confidence", "conf_threshold", "min_conf"];

pub struct MeterTools<W, D> {
    detector: WindowDetector<W>,
    classifier: DigitClassifier<D>,
}

impl<W: WindowModel, D: DigitModel> MeterTools<W, D> {
    pub fn new(detector: WindowDetector<W>, classifier: DigitClassifier<D>) -> Self {
        Self { detector, classifier }
    }

    pub fn detector(&self) -> &WindowDetector<W> {
        &self.detector
    }

    pub fn classifier(&self) -> &DigitClassifier<D> {
        &self.classifier
    }

    pub fn detect_windows(
        &self,
        image_path: &Path,
        threshold: Threshold,
    ) -> Result<DetectionOutcome<SavedWindow>, ToolError> {
        self.detector.detect(image_path, threshold)
    }

    pub fn recognize_digits(&self, paths: &[PathBuf]) -> Result<Vec<DigitPrediction>, ToolError> {
        self.classifier.classify_many(paths)
    }

    pub fn aggregate(&self, predictions: &[DigitPrediction]) -> MeterReading {
        aggregate(predictions)
    }

    /// Run a named tool with loosely typed arguments. Never fails; errors
    /// come back as [`Observation::Error`].
    ///
    /// `args` is either an object of named arguments or, for convenience,
    /// the single main argument as a bare string.
    pub fn call(&self, tool: &str, args: &Value) -> Observation {
        info!("Tool call {} {}", tool, args);
        let observation = match self.dispatch(tool, args) {
            Ok(observation) => observation,
            Err(err) => Observation::from_error(&err),
        };
        debug!("{}", observation.message());
        observation
    }

    fn dispatch(&self, tool: &str, args: &Value) -> Result<Observation, ToolError> {
        match tool.trim() {
            DETECT_WINDOWS => {
                let image_path = match main_arg(args, &["image_path", "path"]) {
                    Some(Value::String(s)) => parse_image_path(s)?,
                    _ => return Err(ToolError::FileNotFound(PathBuf::new())),
                };
                let threshold = match args.as_object().and_then(|map| {
                    THRESHOLD_KEYS.iter().find_map(|key| map.get(*key))
                }) {
                    Some(value) => Threshold::from_json(value)?,
                    None => Threshold::new(DEFAULT_THRESHOLD)?,
                };

                Ok(match self.detect_windows(&image_path, threshold)? {
                    DetectionOutcome::Windows(windows) => Observation::windows_found(threshold, &windows),
                    DetectionOutcome::CountMismatch { found, threshold } => {
                        Observation::count_mismatch(threshold, found)
                    }
                })
            }
            RECOGNIZE_DIGITS => {
                let value = main_arg(args, &["file_paths", "paths"])
                    .ok_or_else(|| ToolError::UnparsableList("missing file_paths".to_string()))?;
                let paths = args::path_list_from_json(value)?;
                let predictions = self.recognize_digits(&paths)?;
                Ok(Observation::Digits { predictions })
            }
            AGGREGATE => {
                let value = main_arg(args, &["predictions"])
                    .ok_or_else(|| ToolError::UnparsablePredictions("missing predictions".to_string()))?;
                let predictions = args::predictions_from_json(value)?;
                Ok(Observation::Reading(self.aggregate(&predictions)))
            }
            other => Err(ToolError::UnknownTool(other.to_string())),
        }
    }
}

/// The named argument from an object, or `args` itself when it is not one
fn main_arg<'a>(args: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    match args {
        Value::Object(map) => keys.iter().find_map(|key| map.get(*key)),
        Value::Null => None,
        other => Some(other),
    }
}
