#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from meterread for tests
pub use meterread::{
    Digit, DigitPrediction, MeterReading, Observation, ScratchWorkspace, Threshold, ToolError,
};
