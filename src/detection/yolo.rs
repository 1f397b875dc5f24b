//! YOLO window detector running on rten.
//!
//! Expects a single-stage detector export whose output is
//! `[1, 4 + classes, anchors]` (or the transposed `[1, anchors, 4 + classes]`)
//! holding center-x, center-y, width and height in input pixels followed by
//! per-class scores.

use anyhow::{anyhow, Result};
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgb, RgbImage};
use rten::Model;
use rten_tensor::prelude::*;
use rten_tensor::{NdTensor, Tensor};
use std::path::Path;
use tracing::{debug, info};

use super::WindowModel;
use crate::models::WindowBox;

/// Gray used by the letterbox border
const LETTERBOX_FILL: u8 = 114;

/// Candidate box in model input coordinates
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub score: f32,
}

impl Candidate {
    fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    pub fn iou(&self, other: &Candidate) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let inter = ix * iy;
        let union = self.area() + other.area() - inter;
        if union <= 0.0 { 0.0 } else { inter / union }
    }
}

/// How the source image was fitted into the square model input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub gain: f32,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Map a candidate back to integer source pixels, clipped to the image
    pub fn to_source(&self, c: &Candidate, width: u32, height: u32) -> WindowBox {
        let unmap = |v: f32, pad: u32, limit: u32| ((v - pad as f32) / self.gain).clamp(0.0, limit as f32) as u32;
        WindowBox {
            x1: unmap(c.x1, self.pad_x, width),
            y1: unmap(c.y1, self.pad_y, height),
            x2: unmap(c.x2, self.pad_x, width),
            y2: unmap(c.y2, self.pad_y, height),
            confidence: c.score,
        }
    }

    /// Map candidates back to the source image, dropping those left with no area
    pub fn source_boxes(&self, candidates: &[Candidate], width: u32, height: u32) -> Vec<WindowBox> {
        candidates
            .iter()
            .filter_map(|c| self.to_source(c, width, height).clamp_to(width, height))
            .collect()
    }
}

/// Resize into a `size` square keeping the aspect ratio, pad with gray,
/// and return the CHW float tensor data in [0, 1]
pub fn letterbox(image: &DynamicImage, size: u32) -> (Vec<f32>, Letterbox) {
    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let gain = (size as f32 / width as f32).min(size as f32 / height as f32);
    let new_w = ((width as f32 * gain).round() as u32).clamp(1, size);
    let new_h = ((height as f32 * gain).round() as u32).clamp(1, size);
    let resized = imageops::resize(&rgb, new_w, new_h, FilterType::Triangle);

    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([LETTERBOX_FILL; 3]));
    imageops::replace(&mut canvas, &resized, pad_x.into(), pad_y.into());

    let plane = (size * size) as usize;
    let mut data = vec![0.0f32; 3 * plane];
    for (x, y, pixel) in canvas.enumerate_pixels() {
        let offset = (y * size + x) as usize;
        for c in 0..3 {
            data[c * plane + offset] = pixel[c] as f32 / 255.0;
        }
    }

    (data, Letterbox { gain, pad_x, pad_y })
}

/// Turn raw detector output into candidates scoring at least `min_confidence`
pub fn decode_predictions(shape: &[usize], data: &[f32], min_confidence: f32) -> Result<Vec<Candidate>> {
    let [batch, a, b] = shape else {
        anyhow::bail!("expected a rank 3 detector output, got shape {:?}", shape);
    };
    if *batch != 1 {
        anyhow::bail!("expected batch size 1, got {}", batch);
    }
    if data.len() != a * b {
        anyhow::bail!("output has {} values for shape {:?}", data.len(), shape);
    }

    // Anchors outnumber attributes; that tells the layouts apart
    let channels_first = a <= b;
    let (attrs, anchors) = if channels_first { (*a, *b) } else { (*b, *a) };
    if attrs < 5 {
        anyhow::bail!("detector output has {} attributes per box, need at least 5", attrs);
    }
    let value = |attr: usize, anchor: usize| {
        if channels_first { data[attr * anchors + anchor] } else { data[anchor * attrs + attr] }
    };

    let mut candidates = Vec::new();
    for i in 0..anchors {
        let score = (4..attrs).map(|c| value(c, i)).fold(f32::MIN, f32::max);
        if score < min_confidence {
            continue;
        }
        let (cx, cy, w, h) = (value(0, i), value(1, i), value(2, i), value(3, i));
        candidates.push(Candidate {
            x1: cx - w / 2.0,
            y1: cy - h / 2.0,
            x2: cx + w / 2.0,
            y2: cy + h / 2.0,
            score,
        });
    }
    Ok(candidates)
}

/// Greedy NMS; the survivors come out highest score first
pub fn non_max_suppression(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
    candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept: Vec<Candidate> = Vec::new();
    for c in candidates {
        if kept.iter().all(|k| k.iou(&c) <= iou_threshold) {
            kept.push(c);
        }
    }
    kept
}

/// Window detector backed by an rten model file
pub struct YoloWindowModel {
    model: Model,
    input_size: u32,
    iou_threshold: f32,
}

impl YoloWindowModel {
    pub fn load(path: &Path, input_size: u32, iou_threshold: f32) -> Result<Self> {
        if !path.exists() {
            anyhow::bail!("Window detector model not found: {}", path.display());
        }
        info!("Loading window detector from {}", path.display());
        let model = Model::load_file(path)
            .map_err(|e| anyhow!("Failed to load window detector {}: {}", path.display(), e))?;

        Ok(Self {
            model,
            input_size,
            iou_threshold,
        })
    }
}

impl WindowModel for YoloWindowModel {
    fn detect(&self, image: &DynamicImage, min_confidence: f32) -> Result<Vec<WindowBox>> {
        let size = self.input_size as usize;
        let (data, fit) = letterbox(image, self.input_size);
        let input = NdTensor::from_data([1, 3, size, size], data);

        let output = self
            .model
            .run_one(input.view().into(), None)
            .map_err(|e| anyhow!("Window detector inference failed: {}", e))?;
        let output: Tensor<f32> = output
            .try_into()
            .map_err(|_| anyhow!("Window detector output is not a float tensor"))?;

        let shape = output.shape().to_vec();
        let candidates = decode_predictions(&shape, &output.to_vec(), min_confidence)?;
        let total = candidates.len();
        let kept = non_max_suppression(candidates, self.iou_threshold);
        debug!("Detector output {:?}: {} candidates, {} after NMS", shape, total, kept.len());

        Ok(fit.source_boxes(&kept, image.width(), image.height()))
    }
}
