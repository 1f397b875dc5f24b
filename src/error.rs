//! Errors reported across the tool boundary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    /// Image path does not resolve to a file
    #[error("File {} does not exist.", .0.display())]
    FileNotFound(PathBuf),

    /// File exists but cannot be decoded as an image
    #[error("Could not read image {}: {reason}", path.display())]
    UnreadableImage { path: PathBuf, reason: String },

    /// Confidence threshold is not a number in (0, 1]
    #[error("Confidence threshold must be a number in (0, 1], got {0:?}.")]
    BadThreshold(String),

    /// Input is not a list of file paths
    #[error("Input must be a valid list of file paths: {0}")]
    UnparsableList(String),

    /// Input is not a list of {digit, confidence} records
    #[error("Input must be a valid list of digit predictions: {0}")]
    UnparsablePredictions(String),

    #[error("Unknown tool {0:?}.")]
    UnknownTool(String),

    /// Scratch workspace could not be prepared or written
    #[error("Scratch storage failed for {}: {reason}", path.display())]
    Storage { path: PathBuf, reason: String },

    /// A decoded crop could not be turned into a digit bitmap
    #[error("Could not normalize {}: {reason}", path.display())]
    Normalization { path: PathBuf, reason: String },

    /// The detector or classifier itself failed
    #[error("Model invocation failed: {0:#}")]
    Model(#[source] anyhow::Error),
}

impl ToolError {
    /// Stable snake_case name for structured reports
    pub fn kind(&self) -> &'static str {
        match self {
            ToolError::FileNotFound(_) => "file_not_found",
            ToolError::UnreadableImage { .. } => "unreadable_image",
            ToolError::BadThreshold(_) => "bad_threshold",
            ToolError::UnparsableList(_) => "unparsable_list",
            ToolError::UnparsablePredictions(_) => "unparsable_predictions",
            ToolError::UnknownTool(_) => "unknown_tool",
            ToolError::Storage { .. } => "storage",
            ToolError::Normalization { .. } => "normalization",
            ToolError::Model(_) => "model_invocation",
        }
    }

    /// Caller supplied something unusable; retrying with the same input is pointless
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ToolError::FileNotFound(_)
                | ToolError::UnreadableImage { .. }
                | ToolError::BadThreshold(_)
                | ToolError::UnparsableList(_)
                | ToolError::UnparsablePredictions(_)
                | ToolError::UnknownTool(_)
        )
    }

    /// No sentinel exists for a broken model
    pub fn is_fatal(&self) -> bool {
        matches!(self, ToolError::Model(_))
    }
}
