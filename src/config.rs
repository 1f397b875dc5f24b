use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub models: ModelConfig,
    pub scratch: ScratchConfig,
    pub retry: RetryConfig,
    pub normalize: NormalizeConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Window detector exported to .rten
    pub window_model: PathBuf,
    /// Digit classifier exported to .rten
    pub digit_model: PathBuf,
    /// Square input side of the detector
    pub window_input_size: u32,
    /// IoU above which overlapping window boxes are suppressed
    pub iou_threshold: f32,
    /// Classifier takes [1, 28, 28, 1] instead of [1, 1, 28, 28]
    pub digit_channels_last: bool,
    /// Classifier outputs logits that still need a softmax
    pub digit_softmax: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            window_model: PathBuf::from("water-meter-reading.rten"),
            digit_model: PathBuf::from("mnist-digits.rten"),
            window_input_size: 640,
            iou_threshold: 0.7,
            digit_channels_last: true,
            digit_softmax: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScratchConfig {
    /// Directory for window crops; wiped when a workspace is created
    pub dir: PathBuf,
}

impl Default for ScratchConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("meter_scratchpad"),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Detection thresholds tried in order until exactly five windows are found
    pub thresholds: Vec<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            thresholds: vec![0.5, 0.3, 0.2, 0.1],
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizeConfig {
    /// Gaussian sigma; 1.1 is what a 5x5 kernel implies
    pub blur_sigma: f32,
    /// Adaptive threshold block is (2 * block_radius + 1) pixels square
    pub block_radius: u32,
    /// Subtracted from the local mean before comparing
    pub threshold_offset: f32,
    /// Shorter side of the isolated digit is upscaled to at least this
    pub min_size: u32,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            blur_sigma: 1.1,
            block_radius: 10,
            threshold_offset: 10.0,
            min_size: 20,
        }
    }
}

impl ReaderConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: ReaderConfig = toml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// File config when a path is given, defaults otherwise
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.normalize.blur_sigma > 0.0) {
            anyhow::bail!("normalize.blur_sigma must be positive, got {}", self.normalize.blur_sigma);
        }
        if self.normalize.min_size == 0 {
            anyhow::bail!("normalize.min_size must be at least 1");
        }
        if self.models.window_input_size == 0 || self.models.window_input_size % 32 != 0 {
            anyhow::bail!(
                "models.window_input_size must be a positive multiple of 32, got {}",
                self.models.window_input_size
            );
        }
        if !(self.models.iou_threshold > 0.0 && self.models.iou_threshold <= 1.0) {
            anyhow::bail!("models.iou_threshold must be in (0, 1], got {}", self.models.iou_threshold);
        }

        let thresholds = &self.retry.thresholds;
        if thresholds.is_empty() {
            anyhow::bail!("retry.thresholds must not be empty");
        }
        for (i, t) in thresholds.iter().enumerate() {
            if !(*t > 0.0 && *t <= 1.0) {
                anyhow::bail!("retry.thresholds[{}] must be in (0, 1], got {}", i, t);
            }
            if thresholds[..i].contains(t) {
                anyhow::bail!("retry.thresholds contains {} twice", t);
            }
        }
        Ok(())
    }
}
