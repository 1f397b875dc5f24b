//! Integration tests for the digit classifier adapter.
//!
//! Tests cover:
//! - Order-preserving batch classification
//! - Per-item isolation of unreadable files
//! - The concurrent batch variant
//! - Model failures propagating
//! - Normalization failures reported as such

mod common;

use image::{DynamicImage, RgbImage};
use meterread::{DigitClassifier, DigitNormalizer};
use std::path::PathBuf;

use common::*;

fn five_crops(dir: &std::path::Path) -> Vec<PathBuf> {
    (0..5)
        .map(|i| write_crop(dir, &format!("meter_t50_{}.png", i), &digit_crop(30, 50)))
        .collect()
}

#[test]
fn test_classify_crop() -> anyhow::Result<()> {
    let classifier = DigitClassifier::new(MockDigitModel::new(7, 0.93), DigitNormalizer::default());
    let prediction = classifier.classify_crop(&digit_crop(30, 50))?;
    assert_eq!(prediction.digit, Digit::Value(7));
    assert!((prediction.confidence - 0.93).abs() < 1e-6);
    assert!(prediction.error.is_none());
    Ok(())
}

#[test]
fn test_blank_crop_is_still_classified() -> anyhow::Result<()> {
    let classifier = DigitClassifier::new(MockDigitModel::new(7, 0.6), DigitNormalizer::default());
    let black = DynamicImage::ImageRgb8(RgbImage::new(30, 50));
    let prediction = classifier.classify_crop(&black)?;
    assert_eq!(prediction.digit, Digit::Value(0));
    Ok(())
}

#[test]
fn test_one_unreadable_among_five() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let mut paths = five_crops(dir.path());
    paths[2] = dir.path().join("vanished_t50_2.png");

    let classifier = DigitClassifier::new(MockDigitModel::new(4, 0.8), DigitNormalizer::default());
    let predictions = classifier.classify_many(&paths)?;

    assert_eq!(predictions.len(), 5);
    let digits: String = predictions.iter().map(|p| p.digit.as_char()).collect();
    assert_eq!(digits, "44?44");

    let unknown: Vec<&DigitPrediction> = predictions.iter().filter(|p| p.digit.is_unknown()).collect();
    assert_eq!(unknown.len(), 1);
    assert_eq!(unknown[0].confidence, 0.0);
    assert!(unknown[0].error.as_deref().unwrap_or("").contains("vanished_t50_2.png"));
    Ok(())
}

#[test]
fn test_undecodable_file_is_isolated() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let mut paths = five_crops(dir.path());
    let garbage = dir.path().join("garbage.png");
    std::fs::write(&garbage, b"not a png")?;
    paths[0] = garbage;

    let classifier = DigitClassifier::new(MockDigitModel::new(1, 0.9), DigitNormalizer::default());
    let predictions = classifier.classify_many(&paths)?;
    assert_eq!(predictions[0].digit, Digit::Unknown);
    assert!(predictions[1..].iter().all(|p| p.digit == Digit::Value(1)));
    Ok(())
}

#[test]
fn test_concurrent_matches_sequential() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let mut paths = five_crops(dir.path());
    paths[4] = dir.path().join("missing.png");

    let classifier = DigitClassifier::new(MockDigitModel::new(9, 0.77), DigitNormalizer::default());
    let sequential = classifier.classify_many(&paths)?;
    let concurrent = classifier.classify_many_concurrent(&paths)?;
    assert_eq!(sequential, concurrent);
    assert_eq!(concurrent[4].digit, Digit::Unknown);
    Ok(())
}

#[test]
fn test_empty_batch() -> anyhow::Result<()> {
    let classifier = DigitClassifier::new(MockDigitModel::new(9, 0.77), DigitNormalizer::default());
    let paths: Vec<PathBuf> = Vec::new();
    assert!(classifier.classify_many(&paths)?.is_empty());
    assert!(classifier.classify_many_concurrent(&paths)?.is_empty());
    Ok(())
}

#[test]
fn test_model_failure_aborts_batch() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let paths = five_crops(dir.path());

    let classifier = DigitClassifier::new(MockDigitModel::failing(), DigitNormalizer::default());
    let err = classifier.classify_many(&paths).unwrap_err();
    assert!(matches!(err, ToolError::Model(_)));
    assert!(err.to_string().contains("classifier session crashed"));

    let err = classifier.classify_many_concurrent(&paths).unwrap_err();
    assert!(err.is_fatal());
    Ok(())
}

#[test]
fn test_normalization_failure_has_its_own_kind() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let crop = write_crop(dir.path(), "meter_t50_0.png", &digit_crop(30, 50));
    let debug_dir = dir.path().join("debug");
    let normalizer = DigitNormalizer::default().with_debug(debug_dir.clone())?;
    // A file where the first step directory should go
    std::fs::write(debug_dir.join("01_grayscale_conversion"), b"x")?;

    let classifier = DigitClassifier::new(MockDigitModel::new(4, 0.8), normalizer);
    let err = classifier.classify_path(&crop).unwrap_err();
    assert!(matches!(&err, ToolError::Normalization { path, .. } if path == &crop));
    assert_eq!(err.kind(), "normalization");
    assert!(!err.is_fatal());
    Ok(())
}
