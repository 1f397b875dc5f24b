pub mod yolo;

use image::{DynamicImage, GenericImageView};
use std::path::Path;
use tracing::{debug, info, warn};

use crate::error::ToolError;
use crate::models::{SavedWindow, WindowBox, WindowCrop, EXPECTED_WINDOWS};
use crate::tools::Threshold;
use crate::workspace::{load_image, ScratchWorkspace};

pub use yolo::YoloWindowModel;

/// Black-box window detector: full meter image → boxes with confidences
pub trait WindowModel: Send + Sync {
    /// Boxes at or above `min_confidence`, in the model's own output order
    fn detect(&self, image: &DynamicImage, min_confidence: f32) -> anyhow::Result<Vec<WindowBox>>;
}

/// Result of one detection attempt
#[derive(Debug, Clone, PartialEq)]
pub enum DetectionOutcome<T> {
    /// Exactly [`EXPECTED_WINDOWS`] windows, most significant digit first
    Windows(Vec<T>),
    /// Any other count; nothing was kept
    CountMismatch { found: usize, threshold: Threshold },
}

impl<T> DetectionOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, DetectionOutcome::Windows(_))
    }

    /// Number of windows the detector reported
    pub fn found(&self) -> usize {
        match self {
            DetectionOutcome::Windows(windows) => windows.len(),
            DetectionOutcome::CountMismatch { found, .. } => *found,
        }
    }
}

/// Order crops left to right; the sort is stable so equal x1 keeps detection order
pub fn sort_left_to_right(crops: &mut [WindowCrop]) {
    crops.sort_by_key(|crop| crop.x1());
}

/// Wraps a [`WindowModel`] with cropping, ordering and the five-window contract
pub struct WindowDetector<M> {
    model: M,
    workspace: ScratchWorkspace,
}

impl<M: WindowModel> WindowDetector<M> {
    pub fn new(model: M, workspace: ScratchWorkspace) -> Self {
        Self { model, workspace }
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn workspace(&self) -> &ScratchWorkspace {
        &self.workspace
    }

    /// Run the model once and cut out every box, sorted left to right
    pub fn locate(&self, image: &DynamicImage, threshold: Threshold) -> Result<Vec<WindowCrop>, ToolError> {
        let mut boxes = self
            .model
            .detect(image, threshold.value())
            .map_err(ToolError::Model)?;

        let reported = boxes.len();
        boxes.retain(|b| b.confidence >= threshold.value());
        if boxes.len() < reported {
            debug!("Dropped {} boxes below threshold {}", reported - boxes.len(), threshold);
        }

        let (width, height) = image.dimensions();
        let mut crops = Vec::with_capacity(boxes.len());
        for b in boxes {
            let Some(bounds) = b.clamp_to(width, height) else {
                debug!(
                    "Skipping empty box ({}, {})-({}, {}) in a {}x{} image",
                    b.x1, b.y1, b.x2, b.y2, width, height
                );
                continue;
            };
            let crop = image.crop_imm(bounds.x1, bounds.y1, bounds.width(), bounds.height());
            crops.push(WindowCrop { image: crop, bounds });
        }

        sort_left_to_right(&mut crops);
        Ok(crops)
    }

    /// Detect on an in-memory image and enforce the window count
    pub fn detect_image(
        &self,
        image: &DynamicImage,
        threshold: Threshold,
    ) -> Result<DetectionOutcome<WindowCrop>, ToolError> {
        let crops = self.locate(image, threshold)?;
        if crops.len() != EXPECTED_WINDOWS {
            warn!(
                "Found {} windows using threshold {}, expected exactly {}",
                crops.len(),
                threshold,
                EXPECTED_WINDOWS
            );
            return Ok(DetectionOutcome::CountMismatch {
                found: crops.len(),
                threshold,
            });
        }
        Ok(DetectionOutcome::Windows(crops))
    }

    /// Detect on an image file and persist the crops to the workspace.
    /// Nothing is written unless exactly five windows were found.
    pub fn detect(
        &self,
        image_path: &Path,
        threshold: Threshold,
    ) -> Result<DetectionOutcome<SavedWindow>, ToolError> {
        let image = load_image(image_path)?;

        let crops = match self.detect_image(&image, threshold)? {
            DetectionOutcome::Windows(crops) => crops,
            DetectionOutcome::CountMismatch { found, threshold } => {
                return Ok(DetectionOutcome::CountMismatch { found, threshold });
            }
        };

        let mut saved = Vec::with_capacity(crops.len());
        for (index, crop) in crops.iter().enumerate() {
            let path = self.workspace.crop_path(image_path, threshold, index);
            self.workspace.save_crop(&crop.image, &path)?;
            saved.push(SavedWindow {
                path,
                confidence: crop.confidence(),
            });
        }

        info!(
            "Found {} windows in {} using threshold {}",
            saved.len(),
            image_path.display(),
            threshold
        );
        Ok(DetectionOutcome::Windows(saved))
    }
}
