use image::{DynamicImage, GrayImage, ImageBuffer, Luma, Rgb, RgbImage};
use meterread::classify::DIGIT_CLASSES;
use meterread::models::DIGIT_SIZE;
use meterread::{
    DigitClassifier, DigitModel, DigitNormalizer, MeterTools, ScratchWorkspace, WindowBox,
    WindowDetector, WindowModel,
};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const PAPER: u8 = 220;
pub const INK: u8 = 30;

/// Light window with a dark vertical stroke, roughly a "1"
pub fn digit_crop(width: u32, height: u32) -> DynamicImage {
    let stroke = (width / 5).max(2);
    let left = (width - stroke) / 2;
    let top = height / 5;
    let bottom = height - height / 5;
    let img = ImageBuffer::from_fn(width, height, |x, y| {
        if x >= left && x < left + stroke && y >= top && y < bottom {
            Rgb([INK; 3])
        } else {
            Rgb([PAPER; 3])
        }
    });
    DynamicImage::ImageRgb8(img)
}

/// Binary 28x28 mask of a hollow rectangle spanning x 4..24, the full height
pub fn ring_mask() -> GrayImage {
    ImageBuffer::from_fn(DIGIT_SIZE, DIGIT_SIZE, |x, y| {
        let inside = (4..24).contains(&x);
        let border = x < 7 || x >= 21 || y < 3 || y >= 25;
        if inside && border { Luma([255]) } else { Luma([0]) }
    })
}

/// Writes a crop to `dir/name` as PNG
pub fn write_crop(dir: &Path, name: &str, crop: &DynamicImage) -> PathBuf {
    let path = dir.join(name);
    crop.save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test crop");
    path
}

/// Left edges of the five counter windows on the synthetic meter face
pub const WINDOW_XS: [u32; 5] = [20, 70, 120, 170, 220];
pub const WINDOW_WIDTH: u32 = 30;
pub const WINDOW_TOP: u32 = 15;
pub const WINDOW_HEIGHT: u32 = 50;

/// Dark meter face with a light window at each x in `xs`, each holding a stroke
pub fn meter_face(xs: &[u32]) -> DynamicImage {
    let mut img = RgbImage::from_pixel(300, 80, Rgb([90, 90, 90]));
    let digit = digit_crop(WINDOW_WIDTH, WINDOW_HEIGHT).to_rgb8();
    for &x in xs {
        image::imageops::replace(&mut img, &digit, x.into(), WINDOW_TOP.into());
    }
    DynamicImage::ImageRgb8(img)
}

/// Saves a meter face with five windows to `dir/name`
pub fn write_meter(dir: &Path, name: &str) -> PathBuf {
    let path = dir.join(name);
    meter_face(&WINDOW_XS)
        .save_with_format(&path, image::ImageFormat::Png)
        .expect("Failed to save test meter");
    path
}

pub fn window_box(x1: u32, confidence: f32) -> WindowBox {
    WindowBox {
        x1,
        y1: WINDOW_TOP,
        x2: x1 + WINDOW_WIDTH,
        y2: WINDOW_TOP + WINDOW_HEIGHT,
        confidence,
    }
}

/// Boxes for the five windows in a scrambled detection order.
/// Only three of them reach 0.5; all five reach 0.3.
pub fn meter_boxes() -> Vec<WindowBox> {
    vec![
        window_box(120, 0.91),
        window_box(20, 0.42),
        window_box(220, 0.88),
        window_box(70, 0.95),
        window_box(170, 0.35),
    ]
}

/// Window model returning fixed boxes, honoring the confidence floor
pub struct MockWindowModel {
    pub boxes: Vec<WindowBox>,
    pub fail: bool,
    pub calls: Mutex<Vec<f32>>,
}

impl MockWindowModel {
    pub fn new(boxes: Vec<WindowBox>) -> Self {
        Self {
            boxes,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn thresholds_seen(&self) -> Vec<f32> {
        self.calls.lock().expect("poisoned").clone()
    }
}

impl WindowModel for MockWindowModel {
    fn detect(&self, _image: &DynamicImage, min_confidence: f32) -> anyhow::Result<Vec<WindowBox>> {
        self.calls.lock().expect("poisoned").push(min_confidence);
        if self.fail {
            anyhow::bail!("detector session crashed");
        }
        Ok(self
            .boxes
            .iter()
            .filter(|b| b.confidence >= min_confidence)
            .copied()
            .collect())
    }
}

/// Digit model that answers `digit` with `confidence` for any inked bitmap
/// and 0 with the same confidence for a blank one
pub struct MockDigitModel {
    pub digit: usize,
    pub confidence: f32,
    pub fail: bool,
}

impl MockDigitModel {
    pub fn new(digit: usize, confidence: f32) -> Self {
        Self {
            digit,
            confidence,
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(0, 0.0)
        }
    }
}

impl DigitModel for MockDigitModel {
    fn predict(&self, pixels: &[f32]) -> anyhow::Result<Vec<f32>> {
        if self.fail {
            anyhow::bail!("classifier session crashed");
        }
        assert_eq!(pixels.len(), (DIGIT_SIZE * DIGIT_SIZE) as usize);

        let class = if pixels.iter().any(|p| *p > 0.0) { self.digit } else { 0 };
        let rest = (1.0 - self.confidence) / (DIGIT_CLASSES - 1) as f32;
        Ok((0..DIGIT_CLASSES)
            .map(|c| if c == class { self.confidence } else { rest })
            .collect())
    }
}

pub type MockTools = MeterTools<MockWindowModel, MockDigitModel>;

/// Facade over mock models with a fresh workspace under `scratch`
pub fn mock_tools(window_model: MockWindowModel, digit_model: MockDigitModel, scratch: &Path) -> MockTools {
    let workspace = ScratchWorkspace::create(scratch).expect("Failed to create scratch workspace");
    MeterTools::new(
        WindowDetector::new(window_model, workspace),
        DigitClassifier::new(digit_model, DigitNormalizer::default()),
    )
}
