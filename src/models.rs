use image::{DynamicImage, GrayImage};
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;


/// Side length of a normalized digit bitmap
pub const DIGIT_SIZE: u32 = 28;

/// Number of digit windows on a meter face
pub const EXPECTED_WINDOWS: usize = 5;

/// Connected foreground region of a binary image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub label: u32,
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
    pub pixel_count: u32,
}

impl Component {
    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    pub fn area(&self) -> u32 {
        self.pixel_count
    }
}

/// Detector box in source pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowBox {
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub confidence: f32,
}

impl WindowBox {
    pub fn width(&self) -> u32 {
        self.x2.saturating_sub(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.saturating_sub(self.y1)
    }

    /// Clip the box to an image of the given size; None if nothing is left
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<WindowBox> {
        let clamped = WindowBox {
            x1: self.x1.min(width),
            y1: self.y1.min(height),
            x2: self.x2.min(width),
            y2: self.y2.min(height),
            confidence: self.confidence,
        };
        (clamped.width() > 0 && clamped.height() > 0).then_some(clamped)
    }
}

/// One detected digit window cut out of the meter image
#[derive(Debug, Clone)]
pub struct WindowCrop {
    pub image: DynamicImage,
    pub bounds: WindowBox,
}

impl WindowCrop {
    /// Left edge, the reading-order sort key
    pub fn x1(&self) -> u32 {
        self.bounds.x1
    }

    pub fn confidence(&self) -> f32 {
        self.bounds.confidence
    }
}

/// A window crop written to the scratch workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedWindow {
    pub path: PathBuf,
    pub confidence: f32,
}

/// 28x28 single-channel digit bitmap, background 0 and foreground 255
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedDigit {
    image: GrayImage,
}

impl NormalizedDigit {
    /// Wrap a bitmap; fails unless it is exactly DIGIT_SIZE square
    pub fn new(image: GrayImage) -> anyhow::Result<Self> {
        if image.dimensions() != (DIGIT_SIZE, DIGIT_SIZE) {
            anyhow::bail!(
                "normalized digit must be {}x{}, got {}x{}",
                DIGIT_SIZE,
                DIGIT_SIZE,
                image.width(),
                image.height()
            );
        }
        Ok(Self { image })
    }

    /// The "no digit visible" image
    pub fn blank() -> Self {
        Self {
            image: GrayImage::new(DIGIT_SIZE, DIGIT_SIZE),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.image.pixels().all(|p| p[0] == 0)
    }

    pub fn image(&self) -> &GrayImage {
        &self.image
    }

    /// Row-major samples scaled to [0, 1]
    pub fn to_unit_tensor(&self) -> Vec<f32> {
        self.image.as_raw().iter().map(|&v| v as f32 / 255.0).collect()
    }
}

/// A classified digit, or the sentinel for a window that could not be read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Digit {
    Value(u8),
    Unknown,
}

impl Digit {
    pub fn as_char(&self) -> char {
        match self {
            Digit::Value(d) => char::from(b'0' + d),
            Digit::Unknown => '?',
        }
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Digit::Unknown)
    }
}

impl fmt::Display for Digit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

impl Serialize for Digit {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Digit::Value(d) => serializer.serialize_u8(*d),
            Digit::Unknown => serializer.serialize_str("?"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DigitRepr {
    Number(i64),
    Text(String),
}

impl<'de> Deserialize<'de> for Digit {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match DigitRepr::deserialize(deserializer)? {
            DigitRepr::Number(n) if (0..=9).contains(&n) => Ok(Digit::Value(n as u8)),
            DigitRepr::Number(n) => Err(de::Error::custom(format!("digit out of range: {n}"))),
            DigitRepr::Text(s) => match s.trim() {
                "?" | "unknown" => Ok(Digit::Unknown),
                t => t
                    .parse::<u8>()
                    .ok()
                    .filter(|d| *d <= 9)
                    .map(Digit::Value)
                    .ok_or_else(|| de::Error::custom(format!("not a digit: {t:?}"))),
            },
        }
    }
}

/// Classifier output for one window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitPrediction {
    pub digit: Digit,
    pub confidence: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DigitPrediction {
    pub fn new(digit: u8, confidence: f32) -> Self {
        Self {
            digit: Digit::Value(digit),
            confidence,
            error: None,
        }
    }

    /// Sentinel for an item that could not be read
    pub fn unknown(error: impl Into<String>) -> Self {
        Self {
            digit: Digit::Unknown,
            confidence: 0.0,
            error: Some(error.into()),
        }
    }
}

/// Final reading of one meter image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterReading {
    pub digits: String,
    pub reliability_score: f64,
    /// Positions (0 = most significant) of digits that could not be read
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unreadable: Vec<usize>,
}

impl MeterReading {
    pub fn is_complete(&self) -> bool {
        self.unreadable.is_empty()
    }
}
