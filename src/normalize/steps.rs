use crate::pipeline::{PipelineData, PipelineStep, PipelineContext, MetadataValue};
use crate::normalize::{preprocessing, components};
use anyhow::Result;
use image::{DynamicImage, GrayImage};

/// Convert image to grayscale
pub struct GrayscaleStep;

impl PipelineStep for GrayscaleStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let gray = preprocessing::to_grayscale(&item.image);
                item.with_image(DynamicImage::ImageLuma8(gray))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Grayscale Conversion"
    }
}

/// Apply Gaussian blur
pub struct BlurStep {
    pub sigma: f32,
}

impl PipelineStep for BlurStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let blurred = preprocessing::apply_blur(&item.image.to_luma8(), self.sigma);
                item.with_image(DynamicImage::ImageLuma8(blurred))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Gaussian Blur"
    }
}

/// Inverted local-mean threshold; digit strokes become foreground
pub struct AdaptiveThresholdStep {
    pub block_radius: u32,
    pub offset: f32,
}

impl PipelineStep for AdaptiveThresholdStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let binary = preprocessing::adaptive_threshold_inv(
                    &item.image.to_luma8(),
                    self.block_radius,
                    self.offset,
                );
                item.with_image(DynamicImage::ImageLuma8(binary))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Adaptive Threshold"
    }
}

/// Keep only the largest connected component.
/// Items without any foreground are marked "blank" and passed on as all-zero images.
pub struct LargestComponentStep;

impl PipelineStep for LargestComponentStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let binary = item.image.to_luma8();
            match components::isolate_largest(&binary) {
                Some(isolated) => {
                    let mut new_item = item.with_image(DynamicImage::ImageLuma8(isolated.mask));
                    new_item.metadata.insert("component_count".to_string(), MetadataValue::Int(isolated.total_components as i64));
                    new_item.metadata.insert("component_area".to_string(), MetadataValue::Int(isolated.component.area() as i64));
                    new_item.metadata.insert("blank".to_string(), MetadataValue::Bool(false));
                    result.push(new_item);
                }
                None => {
                    let empty = GrayImage::new(binary.width(), binary.height());
                    result.push(
                        item.with_image(DynamicImage::ImageLuma8(empty))
                            .with_metadata("component_count", MetadataValue::Int(0))
                            .with_metadata("blank", MetadataValue::Bool(true)),
                    );
                }
            }
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Largest Component"
    }
}

/// Crop to the bounding rectangle of the remaining foreground
pub struct CropToContentStep;

impl PipelineStep for CropToContentStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        let mut result = Vec::new();

        for item in data {
            let gray = item.image.to_luma8();
            let Some(region) = preprocessing::content_bounds(&gray) else {
                // Nothing to crop; the blank image flows on unchanged
                result.push(item);
                continue;
            };

            let cropped = image::imageops::crop_imm(&gray, region.x, region.y, region.width, region.height).to_image();
            result.push(item.with_image(DynamicImage::ImageLuma8(cropped)));
        }

        Ok(result)
    }

    fn name(&self) -> &str {
        "Crop To Content"
    }
}

/// Upscale so the shorter side is at least `min_size`, keeping the aspect ratio
pub struct MinSizeUpscaleStep {
    pub min_size: u32,
}

impl PipelineStep for MinSizeUpscaleStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let gray = item.image.to_luma8();
                let scale = preprocessing::min_size_scale(gray.width(), gray.height(), self.min_size);
                let scaled = preprocessing::upscale_to_min_size(&gray, self.min_size);
                item.with_image(DynamicImage::ImageLuma8(scaled))
                    .with_metadata("scale", MetadataValue::Float(scale))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Min Size Upscale"
    }
}

/// Pad with background to a centered square
pub struct SquarePadStep;

impl PipelineStep for SquarePadStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let squared = preprocessing::pad_to_square(&item.image.to_luma8());
                item.with_image(DynamicImage::ImageLuma8(squared))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Square Pad"
    }
}

/// Area-averaging resize to a fixed square
pub struct AreaResizeStep {
    pub size: u32,
}

impl PipelineStep for AreaResizeStep {
    fn process(&self, data: Vec<PipelineData>, _context: &PipelineContext) -> Result<Vec<PipelineData>> {
        Ok(data
            .into_iter()
            .map(|item| {
                let resized = preprocessing::resize_area(&item.image.to_luma8(), self.size, self.size);
                item.with_image(DynamicImage::ImageLuma8(resized))
            })
            .collect())
    }

    fn name(&self) -> &str {
        "Area Resize"
    }
}
