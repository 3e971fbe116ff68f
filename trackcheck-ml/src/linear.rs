//! Ordinary least squares linear regression.

use crate::error::MlError;
use crate::metrics;
use serde::{Deserialize, Serialize};

/// Smallest pivot magnitude accepted while solving the normal equations.
const PIVOT_EPSILON: f64 = 1e-12;

/// Linear model `y = x · coef + intercept` fitted by ordinary least squares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub fit_intercept: bool,
    pub coef: Option<Vec<f64>>,
    pub intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new()
    }
}

impl LinearRegression {
    pub fn new() -> Self {
        Self::with_fit_intercept(true)
    }

    pub fn with_fit_intercept(fit_intercept: bool) -> Self {
        Self {
            fit_intercept,
            coef: None,
            intercept: 0.0,
        }
    }

    pub fn is_fitted(&self) -> bool {
        self.coef.is_some()
    }

    /// Number of features seen during `fit`.
    pub fn n_features(&self) -> Option<usize> {
        self.coef.as_ref().map(Vec::len)
    }

    pub fn fit(&mut self, x: &[Vec<f64>], y: &[f64]) -> Result<(), MlError> {
        let n_features = validate(x, y)?;
        let n = x.len() as f64;

        let (x_mean, y_mean) = if self.fit_intercept {
            let mut x_mean = vec![0.0; n_features];
            for row in x {
                for (m, v) in x_mean.iter_mut().zip(row) {
                    *m += v / n;
                }
            }
            (x_mean, y.iter().sum::<f64>() / n)
        } else {
            (vec![0.0; n_features], 0.0)
        };

        // Normal equations on the centred data: (XᵀX) w = Xᵀy.
        let mut gram = vec![vec![0.0; n_features]; n_features];
        let mut moment = vec![0.0; n_features];
        for (row, target) in x.iter().zip(y) {
            let centred: Vec<f64> = row.iter().zip(&x_mean).map(|(v, m)| v - m).collect();
            let yc = target - y_mean;
            for i in 0..n_features {
                moment[i] += centred[i] * yc;
                for j in 0..n_features {
                    gram[i][j] += centred[i] * centred[j];
                }
            }
        }

        let coef = solve(gram, moment)?;
        self.intercept = if self.fit_intercept {
            y_mean - coef.iter().zip(&x_mean).map(|(c, m)| c * m).sum::<f64>()
        } else {
            0.0
        };
        tracing::debug!(coef = ?coef, intercept = self.intercept, "Fitted linear regression");
        self.coef = Some(coef);
        Ok(())
    }

    pub fn predict(&self, x: &[Vec<f64>]) -> Result<Vec<f64>, MlError> {
        let coef = self.coef.as_ref().ok_or(MlError::NotFitted("predict"))?;
        x.iter()
            .map(|row| {
                if row.len() != coef.len() {
                    return Err(MlError::invalid_input(format!(
                        "expected {} features, got {}",
                        coef.len(),
                        row.len()
                    )));
                }
                Ok(row.iter().zip(coef).map(|(v, c)| v * c).sum::<f64>() + self.intercept)
            })
            .collect()
    }

    /// R² of the predictions on `x` against `y`.
    pub fn score(&self, x: &[Vec<f64>], y: &[f64]) -> Result<f64, MlError> {
        let preds = self.predict(x)?;
        metrics::r2_score(y, &preds)
    }
}

fn validate(x: &[Vec<f64>], y: &[f64]) -> Result<usize, MlError> {
    let Some(first) = x.first() else {
        return Err(MlError::invalid_input("training set is empty"));
    };
    let n_features = first.len();
    if n_features == 0 {
        return Err(MlError::invalid_input("samples have no features"));
    }
    if x.len() != y.len() {
        return Err(MlError::invalid_input(format!(
            "{} samples but {} targets",
            x.len(),
            y.len()
        )));
    }
    if let Some(pos) = x.iter().position(|row| row.len() != n_features) {
        return Err(MlError::invalid_input(format!(
            "sample {pos} has {} features, expected {n_features}",
            x[pos].len()
        )));
    }
    let finite = x.iter().flatten().chain(y).all(|v| v.is_finite());
    if !finite {
        return Err(MlError::invalid_input("inputs contain NaN or infinity"));
    }
    Ok(n_features)
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, MlError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < PIVOT_EPSILON {
            return Err(MlError::numerical(format!(
                "singular design matrix at column {col}"
            )));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut w = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * w[k]).sum();
        w[row] = (b[row] - tail) / a[row][row];
    }
    Ok(w)
}
