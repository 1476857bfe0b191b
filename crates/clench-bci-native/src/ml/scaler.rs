//! Feature standardisation

use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};

/// Scales each feature to zero mean and unit variance.
///
/// Features with zero variance are centred but left unscaled.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardScaler {
    /// Learn per-feature mean and standard deviation
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InsufficientData`] for no rows and
    /// [`PipelineError::InvalidConfig`] for ragged rows.
    pub fn fit(rows: &[Vec<f64>]) -> PipelineResult<Self> {
        let Some(first) = rows.first() else {
            return Err(PipelineError::insufficient("no rows to fit scaler"));
        };
        let width = first.len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(PipelineError::InvalidConfig {
                reason: "feature rows have different lengths".to_string(),
            });
        }

        let n = rows.len() as f64;
        let mean: Vec<f64> = (0..width).map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n).collect();
        let scale = (0..width)
            .map(|j| {
                let var = rows.iter().map(|r| (r[j] - mean[j]).powi(2)).sum::<f64>() / n;
                let std = var.sqrt();
                if std > f64::EPSILON {
                    std
                } else {
                    1.0
                }
            })
            .collect();

        Ok(Self { mean, scale })
    }

    /// Standardise one feature vector
    #[must_use]
    pub fn transform(&self, row: &[f64]) -> Vec<f64> {
        row.iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (m, s))| (x - m) / s)
            .collect()
    }

    /// Number of features seen at fit time
    #[must_use]
    pub fn width(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standardises_columns() {
        let rows = vec![vec![1.0, 10.0], vec![3.0, 10.0], vec![5.0, 10.0]];
        let scaler = StandardScaler::fit(&rows).unwrap();

        let out: Vec<Vec<f64>> = rows.iter().map(|r| scaler.transform(r)).collect();
        let mean0: f64 = out.iter().map(|r| r[0]).sum::<f64>() / 3.0;
        let var0: f64 = out.iter().map(|r| r[0] * r[0]).sum::<f64>() / 3.0;
        assert!(mean0.abs() < 1e-12);
        assert!((var0 - 1.0).abs() < 1e-12);
        // Constant column is centred, not blown up
        assert!(out.iter().all(|r| r[1] == 0.0));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(
            StandardScaler::fit(&[]),
            Err(PipelineError::InsufficientData { .. })
        ));
    }
}
