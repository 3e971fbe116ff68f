//! Built-in training data for the smoke test.

/// A feature matrix with one target per row.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub features: Vec<Vec<f64>>,
    pub targets: Vec<f64>,
}

impl Dataset {
    /// Five points on `y = 2x`: inputs 1..=5, targets 2..=10.
    pub fn smoke() -> Self {
        let inputs = [1.0, 2.0, 3.0, 4.0, 5.0];
        Self {
            features: inputs.iter().map(|x| vec![*x]).collect(),
            targets: inputs.iter().map(|x| 2.0 * x).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::LinearRegression;
    use crate::metrics::{mean_squared_error, r2_score};

    #[test]
    fn test_smoke_dataset_is_fixed() {
        let data = Dataset::smoke();
        assert_eq!(
            data.features,
            vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0], vec![5.0]]
        );
        assert_eq!(data.targets, vec![2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(data, Dataset::smoke());
    }

    #[test]
    fn test_smoke_fit_is_exact() {
        let data = Dataset::smoke();
        let mut model = LinearRegression::new();
        assert!(model.fit_intercept);
        model.fit(&data.features, &data.targets).unwrap();

        assert!((model.coef.as_ref().unwrap()[0] - 2.0).abs() < 1e-9);
        assert!(model.intercept.abs() < 1e-9);

        let preds = model.predict(&data.features).unwrap();
        assert!(mean_squared_error(&data.targets, &preds).unwrap() < 1e-9);
        assert!((r2_score(&data.targets, &preds).unwrap() - 1.0).abs() < 1e-9);
    }
}
