//! Window crop → canonical 28x28 digit bitmap.
//!
//! The work is split into a binarization half (grayscale, blur, inverted
//! adaptive threshold) and a geometry half (largest component, crop,
//! min-size upscale, square pad, area resize). Both halves live in one
//! [`Pipeline`] so debug output numbers the steps consistently.

pub mod preprocessing;
pub mod components;
pub mod steps;

use anyhow::Result;
use image::{DynamicImage, GrayImage};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::NormalizeConfig;
use crate::models::{NormalizedDigit, DIGIT_SIZE};
use crate::pipeline::{Pipeline, PipelineData};
use steps::*;

/// Index of the first geometry step in the normalization pipeline
const GEOMETRY_START: usize = 3;

/// Converts digit window crops into classifier-ready bitmaps
#[derive(Clone)]
pub struct DigitNormalizer {
    pipeline: Pipeline,
}

impl DigitNormalizer {
    pub fn new(config: &NormalizeConfig) -> Self {
        Self {
            pipeline: build_normalization_pipeline(config),
        }
    }

    /// Save every intermediate step image under `output_dir`
    pub fn with_debug(mut self, output_dir: PathBuf) -> Result<Self> {
        self.pipeline = self.pipeline.with_debug(output_dir)?;
        Ok(self)
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Normalize one raw window crop
    pub fn normalize(&self, crop: &DynamicImage) -> Result<NormalizedDigit> {
        self.normalize_named(crop, "crop")
    }

    /// Normalize one raw window crop; `name` labels its debug images
    pub fn normalize_named(&self, crop: &DynamicImage, name: &str) -> Result<NormalizedDigit> {
        if crop.width() == 0 || crop.height() == 0 {
            return Ok(NormalizedDigit::blank());
        }
        let data = self.pipeline.run_range(
            PipelineData::from_image(crop.clone()),
            0..self.pipeline.len(),
            name,
        )?;
        finish(data, name)
    }

    /// Run only the geometry half on an already-binary mask
    pub fn normalize_mask(&self, mask: &GrayImage) -> Result<NormalizedDigit> {
        if mask.width() == 0 || mask.height() == 0 {
            return Ok(NormalizedDigit::blank());
        }
        let data = self.pipeline.run_range(
            PipelineData::from_image(DynamicImage::ImageLuma8(mask.clone())),
            GEOMETRY_START..self.pipeline.len(),
            "mask",
        )?;
        finish(data, "mask")
    }
}

impl Default for DigitNormalizer {
    fn default() -> Self {
        Self::new(&NormalizeConfig::default())
    }
}

fn finish(mut data: Vec<PipelineData>, name: &str) -> Result<NormalizedDigit> {
    if data.len() != 1 {
        anyhow::bail!("normalization of {} produced {} images, expected 1", name, data.len());
    }
    let item = data.remove(0);
    if item.get_bool("blank") == Some(true) {
        debug!("No digit visible in {}", name);
        return Ok(NormalizedDigit::blank());
    }
    debug!(
        "Normalized {}: {} components, kept area {}, upscaled x{:.2}",
        name,
        item.get_int("component_count").unwrap_or(0),
        item.get_int("component_area").unwrap_or(0),
        item.get_float("scale").unwrap_or(1.0)
    );
    NormalizedDigit::new(item.image.to_luma8())
}

/// Build the standard normalization pipeline
pub fn build_normalization_pipeline(config: &NormalizeConfig) -> Pipeline {
    Pipeline::new()
        .add_step(Arc::new(GrayscaleStep))
        .add_step(Arc::new(BlurStep { sigma: config.blur_sigma }))
        .add_step(Arc::new(AdaptiveThresholdStep {
            block_radius: config.block_radius,
            offset: config.threshold_offset,
        }))
        .add_step(Arc::new(LargestComponentStep))
        .add_step(Arc::new(CropToContentStep))
        .add_step(Arc::new(MinSizeUpscaleStep { min_size: config.min_size }))
        .add_step(Arc::new(SquarePadStep))
        .add_step(Arc::new(AreaResizeStep { size: DIGIT_SIZE }))
}
