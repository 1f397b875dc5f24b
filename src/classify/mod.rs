pub mod rten_model;

use anyhow::anyhow;
use image::DynamicImage;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::models::{DigitPrediction, NormalizedDigit};
use crate::normalize::DigitNormalizer;
use crate::workspace::load_image;

pub use rten_model::RtenDigitModel;

/// Number of classes the digit model scores
pub const DIGIT_CLASSES: usize = 10;

/// Black-box digit classifier
pub trait DigitModel: Send + Sync {
    /// `pixels` is a 28x28 row-major bitmap scaled to [0, 1].
    /// Returns one probability per digit class 0-9.
    fn predict(&self, pixels: &[f32]) -> anyhow::Result<Vec<f32>>;
}

/// Index and value of the largest entry; the first one wins ties
pub fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values.iter().copied().enumerate().fold(None, |best, (i, v)| match best {
        Some((_, b)) if b >= v || v.is_nan() => best,
        _ if v.is_nan() => None,
        _ => Some((i, v)),
    })
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Normalizes window crops and runs them through a [`DigitModel`]
pub struct DigitClassifier<M> {
    model: M,
    normalizer: DigitNormalizer,
}

impl<M: DigitModel> DigitClassifier<M> {
    pub fn new(model: M, normalizer: DigitNormalizer) -> Self {
        Self { model, normalizer }
    }

    /// Predicted digit and its probability
    pub fn classify(&self, digit: &NormalizedDigit) -> anyhow::Result<(u8, f32)> {
        let probabilities = self.model.predict(&digit.to_unit_tensor())?;
        if probabilities.len() != DIGIT_CLASSES {
            anyhow::bail!(
                "digit model returned {} scores, expected {}",
                probabilities.len(),
                DIGIT_CLASSES
            );
        }
        let (class, confidence) = argmax(&probabilities)
            .ok_or_else(|| anyhow!("digit model returned NaN scores"))?;
        Ok((class as u8, confidence))
    }

    /// Normalize a raw window crop, then classify it
    pub fn classify_crop(&self, crop: &DynamicImage) -> anyhow::Result<DigitPrediction> {
        self.classify_crop_named(crop, "crop")
    }

    fn classify_crop_named(&self, crop: &DynamicImage, name: &str) -> anyhow::Result<DigitPrediction> {
        let normalized = self.normalizer.normalize_named(crop, name)?;
        let (digit, confidence) = self.classify(&normalized)?;
        Ok(DigitPrediction::new(digit, confidence))
    }

    /// Classify one crop file. An unreadable file becomes the unknown
    /// sentinel; a model failure is returned as an error.
    pub fn classify_path(&self, path: &Path) -> Result<DigitPrediction, ToolError> {
        let crop = match load_image(path) {
            Ok(crop) => crop,
            Err(err) => {
                warn!("Could not read {}: {}", path.display(), err);
                return Ok(DigitPrediction::unknown(format!("Could not read {}", path.display())));
            }
        };

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "crop".to_string());
        let normalized = self
            .normalizer
            .normalize_named(&crop, &name)
            .map_err(|e| ToolError::Normalization {
                path: path.to_path_buf(),
                reason: format!("{:#}", e),
            })?;
        let (digit, confidence) = self.classify(&normalized).map_err(ToolError::Model)?;

        debug!("{} → {} ({:.3})", path.display(), digit, confidence);
        Ok(DigitPrediction::new(digit, confidence))
    }

    /// Classify crop files in order; unreadable items do not stop the batch
    pub fn classify_many<P: AsRef<Path>>(&self, paths: &[P]) -> Result<Vec<DigitPrediction>, ToolError> {
        paths.iter().map(|p| self.classify_path(p.as_ref())).collect()
    }

    /// Same contract as [`Self::classify_many`], one scoped thread per item
    pub fn classify_many_concurrent<P: AsRef<Path> + Sync>(
        &self,
        paths: &[P],
    ) -> Result<Vec<DigitPrediction>, ToolError> {
        std::thread::scope(|scope| {
            let handles: Vec<_> = paths
                .iter()
                .map(|p| scope.spawn(move || self.classify_path(p.as_ref())))
                .collect();

            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(ToolError::Model(anyhow!("classification worker panicked"))))
                })
                .collect()
        })
    }
}
