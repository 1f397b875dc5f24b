//! Ordered digit predictions → meter reading.

use crate::models::{DigitPrediction, MeterReading};

/// Round to three decimals, the precision readings are reported with
pub fn round_score(score: f64) -> f64 {
    (score * 1000.0).round() / 1000.0
}

/// Concatenate the digits and average the confidences.
///
/// Unknown digits render as `?` and count towards the mean with their zero
/// confidence, so an unreadable window lowers the score. Empty input yields
/// an empty reading with score 0.0.
pub fn aggregate(predictions: &[DigitPrediction]) -> MeterReading {
    let digits: String = predictions.iter().map(|p| p.digit.as_char()).collect();

    let reliability_score = if predictions.is_empty() {
        0.0
    } else {
        let total: f64 = predictions.iter().map(|p| p.confidence as f64).sum();
        round_score(total / predictions.len() as f64)
    };

    let unreadable = predictions
        .iter()
        .enumerate()
        .filter(|(_, p)| p.digit.is_unknown())
        .map(|(i, _)| i)
        .collect();

    MeterReading {
        digits,
        reliability_score,
        unreadable,
    }
}
