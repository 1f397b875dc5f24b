//! Deterministic orchestrator: detect with falling thresholds until exactly
//! five windows are found, then recognize and aggregate.

use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::classify::DigitModel;
use crate::config::RetryConfig;
use crate::detection::{DetectionOutcome, WindowModel};
use crate::error::ToolError;
use crate::models::{DigitPrediction, MeterReading, SavedWindow};
use crate::tools::{MeterTools, Threshold};

/// One detection try
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetectionAttempt {
    pub threshold: Threshold,
    pub found: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReadOutcome {
    Done {
        reading: MeterReading,
        predictions: Vec<DigitPrediction>,
        windows: Vec<SavedWindow>,
        attempts: Vec<DetectionAttempt>,
    },
    /// Every threshold was tried without finding exactly five windows
    Aborted { attempts: Vec<DetectionAttempt> },
}

impl ReadOutcome {
    pub fn attempts(&self) -> &[DetectionAttempt] {
        match self {
            ReadOutcome::Done { attempts, .. } | ReadOutcome::Aborted { attempts } => attempts,
        }
    }

    pub fn reading(&self) -> Option<&MeterReading> {
        match self {
            ReadOutcome::Done { reading, .. } => Some(reading),
            ReadOutcome::Aborted { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ReadState {
    Start,
    Detecting { attempt: usize },
    Recognizing { windows: Vec<SavedWindow> },
    Aggregating { windows: Vec<SavedWindow>, predictions: Vec<DigitPrediction> },
    Done { windows: Vec<SavedWindow>, predictions: Vec<DigitPrediction>, reading: MeterReading },
    Aborted,
}

impl ReadState {
    fn is_terminal(&self) -> bool {
        matches!(self, ReadState::Done { .. } | ReadState::Aborted)
    }

    fn name(&self) -> &'static str {
        match self {
            ReadState::Start => "start",
            ReadState::Detecting { .. } => "detecting",
            ReadState::Recognizing { .. } => "recognizing",
            ReadState::Aggregating { .. } => "aggregating",
            ReadState::Done { .. } => "done",
            ReadState::Aborted => "aborted",
        }
    }
}

pub struct MeterReader<W, D> {
    tools: MeterTools<W, D>,
    thresholds: Vec<Threshold>,
}

impl<W: WindowModel, D: DigitModel> MeterReader<W, D> {
    /// Thresholds are tried in the given order
    pub fn new(tools: MeterTools<W, D>, thresholds: Vec<Threshold>) -> Self {
        Self { tools, thresholds }
    }

    pub fn from_config(tools: MeterTools<W, D>, retry: &RetryConfig) -> Result<Self, ToolError> {
        let thresholds = retry
            .thresholds
            .iter()
            .map(|t| Threshold::new(*t))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(tools, thresholds))
    }

    pub fn tools(&self) -> &MeterTools<W, D> {
        &self.tools
    }

    pub fn thresholds(&self) -> &[Threshold] {
        &self.thresholds
    }

    /// Read one meter image. Count mismatches are retried at the next
    /// threshold; input and model errors end the read.
    pub fn read(&self, image_path: &Path) -> Result<ReadOutcome, ToolError> {
        let mut attempts = Vec::new();
        let mut state = ReadState::Start;

        while !state.is_terminal() {
            let next = self.step(state, image_path, &mut attempts)?;
            debug!("{} → {}", image_path.display(), next.name());
            state = next;
        }

        Ok(match state {
            ReadState::Done { windows, predictions, reading } => {
                info!(
                    "Read {} as {} (score {:.3}) after {} attempt(s)",
                    image_path.display(),
                    reading.digits,
                    reading.reliability_score,
                    attempts.len()
                );
                ReadOutcome::Done { reading, predictions, windows, attempts }
            }
            _ => {
                warn!(
                    "Gave up on {} after {} detection attempts",
                    image_path.display(),
                    attempts.len()
                );
                ReadOutcome::Aborted { attempts }
            }
        })
    }

    fn step(
        &self,
        state: ReadState,
        image_path: &Path,
        attempts: &mut Vec<DetectionAttempt>,
    ) -> Result<ReadState, ToolError> {
        Ok(match state {
            ReadState::Start => ReadState::Detecting { attempt: 0 },
            ReadState::Detecting { attempt } => {
                let Some(&threshold) = self.thresholds.get(attempt) else {
                    return Ok(ReadState::Aborted);
                };
                let outcome = self.tools.detect_windows(image_path, threshold)?;
                attempts.push(DetectionAttempt {
                    threshold,
                    found: outcome.found(),
                });
                match outcome {
                    DetectionOutcome::Windows(windows) => ReadState::Recognizing { windows },
                    DetectionOutcome::CountMismatch { .. } => ReadState::Detecting { attempt: attempt + 1 },
                }
            }
            ReadState::Recognizing { windows } => {
                let paths: Vec<PathBuf> = windows.iter().map(|w| w.path.clone()).collect();
                let predictions = self.tools.recognize_digits(&paths)?;
                ReadState::Aggregating { windows, predictions }
            }
            ReadState::Aggregating { windows, predictions } => {
                let reading = self.tools.aggregate(&predictions);
                ReadState::Done { windows, predictions, reading }
            }
            terminal => terminal,
        })
    }
}
