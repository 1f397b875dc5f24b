pub mod aggregate;
pub mod classify;
pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod normalize;
pub mod pipeline;
pub mod reader;
pub mod tools;
pub mod workspace;

pub use aggregate::aggregate;
pub use classify::{DigitClassifier, DigitModel, RtenDigitModel};
pub use config::ReaderConfig;
pub use detection::{DetectionOutcome, WindowDetector, WindowModel, YoloWindowModel};
pub use error::ToolError;
pub use models::{Digit, DigitPrediction, MeterReading, NormalizedDigit, SavedWindow, WindowBox};
pub use normalize::DigitNormalizer;
pub use pipeline::{Pipeline, PipelineContext, PipelineData, PipelineStep, MetadataValue, DebugConfig};
pub use reader::{DetectionAttempt, MeterReader, ReadOutcome};
pub use tools::{MeterTools, Observation, Threshold};
pub use workspace::ScratchWorkspace;
