//! Regression metrics.

use crate::error::MlError;

fn check_pair(y_true: &[f64], y_pred: &[f64]) -> Result<(), MlError> {
    if y_true.is_empty() {
        return Err(MlError::invalid_input("metrics need at least one sample"));
    }
    if y_true.len() != y_pred.len() {
        return Err(MlError::invalid_input(format!(
            "length mismatch: {} targets vs {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    Ok(())
}

/// Mean of squared residuals.
pub fn mean_squared_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64, MlError> {
    check_pair(y_true, y_pred)?;
    let sum: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    Ok(sum / y_true.len() as f64)
}

/// Coefficient of determination.
///
/// A constant target has zero variance; the score is then 1.0 for a perfect
/// prediction and 0.0 otherwise, so the result is always finite.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64, MlError> {
    check_pair(y_true, y_pred)?;
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).powi(2))
        .sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}
