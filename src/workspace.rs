//! Scratch storage for window crops shared between detection and recognition.

use image::{DynamicImage, ImageReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::ToolError;
use crate::tools::Threshold;

/// Handle to the crop directory. Created by the caller and injected into
/// the detector; clones share the same directory.
#[derive(Debug, Clone)]
pub struct ScratchWorkspace {
    root: PathBuf,
}

impl ScratchWorkspace {
    /// Wipe `root` if it exists and create it empty
    pub fn create(root: impl Into<PathBuf>) -> Result<Self, ToolError> {
        let root = root.into();
        if root.parent().is_none() {
            return Err(ToolError::Storage {
                path: root,
                reason: "refusing to use a filesystem root as scratch space".to_string(),
            });
        }

        if root.exists() {
            info!("Clearing scratch workspace {}", root.display());
            std::fs::remove_dir_all(&root).map_err(|e| storage_error(&root, e))?;
        }
        std::fs::create_dir_all(&root).map_err(|e| storage_error(&root, e))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `{source_basename}_t{threshold percent}_{index}.png`
    pub fn crop_path(&self, source: &Path, threshold: Threshold, index: usize) -> PathBuf {
        let stem = source
            .file_name()
            .map(|name| name.to_string_lossy().split('.').next().unwrap_or_default().to_string())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "image".to_string());
        self.root.join(format!("{}_t{}_{}.png", stem, threshold.percent(), index))
    }

    /// Write one crop as PNG
    pub fn save_crop(&self, crop: &DynamicImage, path: &Path) -> Result<(), ToolError> {
        crop.save_with_format(path, image::ImageFormat::Png)
            .map_err(|e| ToolError::Storage {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        debug!("Saved crop {}", path.display());
        Ok(())
    }
}

/// Read an image file; a missing file and an undecodable one are distinct errors
pub fn load_image(path: &Path) -> Result<DynamicImage, ToolError> {
    if !path.is_file() {
        return Err(ToolError::FileNotFound(path.to_path_buf()));
    }

    let unreadable = |reason: String| ToolError::UnreadableImage {
        path: path.to_path_buf(),
        reason,
    };
    ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| unreadable(e.to_string()))?
        .decode()
        .map_err(|e| unreadable(e.to_string()))
}

fn storage_error(path: &Path, err: std::io::Error) -> ToolError {
    ToolError::Storage {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
