use anyhow::{anyhow, Result};
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, Tensor};
use std::path::Path;
use tracing::info;

use super::{softmax, DigitModel, DIGIT_CLASSES};
use crate::models::DIGIT_SIZE;

/// MNIST-style classifier loaded from an rten model file
pub struct RtenDigitModel {
    model: Model,
    /// Input is [1, 28, 28, 1] (Keras export) rather than [1, 1, 28, 28]
    channels_last: bool,
    /// Model emits logits instead of probabilities
    apply_softmax: bool,
}

impl RtenDigitModel {
    pub fn load(path: &Path, channels_last: bool, apply_softmax: bool) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Digit classifier model not found: {}", path.display());
        }
        info!("Loading digit classifier from {}", path.display());
        let model = Model::load_file(path)
            .map_err(|e| anyhow!("Failed to load digit classifier {}: {}", path.display(), e))?;

        Ok(Self {
            model,
            channels_last,
            apply_softmax,
        })
    }
}

impl DigitModel for RtenDigitModel {
    fn predict(&self, pixels: &[f32]) -> Result<Vec<f32>> {
        let side = DIGIT_SIZE as usize;
        if pixels.len() != side * side {
            anyhow::bail!("expected {} pixels, got {}", side * side, pixels.len());
        }

        let shape = if self.channels_last { [1, side, side, 1] } else { [1, 1, side, side] };
        let input = NdTensor::from_data(shape, pixels.to_vec());

        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| anyhow!("Digit classifier inference failed: {}", e))?;
        let output: Tensor<f32> = output
            .try_into()
            .map_err(|_| anyhow!("Digit classifier output is not a float tensor"))?;

        let scores = output.to_vec();
        if scores.len() != DIGIT_CLASSES {
            anyhow::bail!(
                "digit classifier output {:?} does not hold {} class scores",
                output.shape(),
                DIGIT_CLASSES
            );
        }

        Ok(if self.apply_softmax { softmax(&scores) } else { scores })
    }
}
