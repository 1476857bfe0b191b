//! Linear classifiers

use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};

/// Multiclass classifier over fixed-length feature vectors.
pub trait Classifier {
    /// Fit on `rows` with class indices `targets` in `0..n_classes`
    ///
    /// # Errors
    ///
    /// Returns an error for empty, ragged or mislabelled input.
    fn fit(&mut self, rows: &[Vec<f64>], targets: &[usize], n_classes: usize) -> PipelineResult<()>;

    /// Class probabilities, summing to one
    fn predict_proba(&self, row: &[f64]) -> Vec<f64>;

    /// Most probable class index
    fn predict(&self, row: &[f64]) -> usize {
        argmax(&self.predict_proba(row))
    }
}

/// Gradient descent settings
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Step size
    pub learning_rate: f64,
    /// Full-batch iterations
    pub epochs: usize,
    /// L2 penalty on weights (not biases)
    pub l2_penalty: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.1,
            epochs: 500,
            l2_penalty: 1e-3,
        }
    }
}

impl ClassifierConfig {
    /// Check parameter ranges
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] for a non-positive learning
    /// rate, zero epochs or a negative penalty.
    pub fn validate(&self) -> PipelineResult<()> {
        if !(self.learning_rate > 0.0) || self.epochs == 0 || !(self.l2_penalty >= 0.0) {
            return Err(PipelineError::InvalidConfig {
                reason: "classifier needs learning_rate > 0, epochs > 0, l2_penalty >= 0".to_string(),
            });
        }
        Ok(())
    }
}

/// Multinomial logistic regression
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SoftmaxRegression {
    config: ClassifierConfig,
    /// classes × features
    weights: DMatrix<f64>,
    bias: DVector<f64>,
}

impl SoftmaxRegression {
    /// Unfitted model
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self {
            config,
            weights: DMatrix::zeros(0, 0),
            bias: DVector::zeros(0),
        }
    }

    /// Number of classes
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.bias.len()
    }
}

impl Classifier for SoftmaxRegression {
    fn fit(&mut self, rows: &[Vec<f64>], targets: &[usize], n_classes: usize) -> PipelineResult<()> {
        self.config.validate()?;
        let n = rows.len();
        let Some(first) = rows.first() else {
            return Err(PipelineError::insufficient("no rows to fit classifier"));
        };
        let d = first.len();
        if targets.len() != n || rows.iter().any(|r| r.len() != d) {
            return Err(PipelineError::InvalidConfig {
                reason: "classifier input is ragged".to_string(),
            });
        }
        if targets.iter().any(|&t| t >= n_classes) {
            return Err(PipelineError::InvalidConfig {
                reason: format!("target out of range for {n_classes} classes"),
            });
        }

        let x = DMatrix::from_fn(n, d, |i, j| rows[i][j]);
        let y = DMatrix::from_fn(n, n_classes, |i, k| if targets[i] == k { 1.0 } else { 0.0 });
        let inv_n = 1.0 / n as f64;

        let mut w = DMatrix::<f64>::zeros(n_classes, d);
        let mut b = DVector::<f64>::zeros(n_classes);

        for _ in 0..self.config.epochs {
            let mut logits = &x * w.transpose();
            for mut row in logits.row_iter_mut() {
                for (k, v) in row.iter_mut().enumerate() {
                    *v += b[k];
                }
            }
            let probs = softmax_rows(&logits);
            let err = probs - &y;

            let grad_w = err.transpose() * &x * inv_n + &w * self.config.l2_penalty;
            let grad_b = DVector::from_fn(n_classes, |k, _| err.column(k).sum() * inv_n);

            w -= grad_w * self.config.learning_rate;
            b -= grad_b * self.config.learning_rate;
        }

        if w.iter().chain(b.iter()).any(|v| !v.is_finite()) {
            return Err(PipelineError::numerical("classifier diverged; lower learning_rate"));
        }

        self.weights = w;
        self.bias = b;
        Ok(())
    }

    /// Returns an empty vector if unfitted or `row` has the wrong width.
    fn predict_proba(&self, row: &[f64]) -> Vec<f64> {
        if self.class_count() == 0 || row.len() != self.weights.ncols() {
            return Vec::new();
        }
        let x = DVector::from_column_slice(row);
        let logits = &self.weights * x + &self.bias;
        softmax(logits.as_slice())
    }
}

/// Index of the largest value; ties resolve to the lowest index
#[must_use]
pub fn argmax(values: &[f64]) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f64::NEG_INFINITY), |best, (i, &v)| if v > best.1 { (i, v) } else { best })
        .0
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / sum).collect()
}

fn softmax_rows(logits: &DMatrix<f64>) -> DMatrix<f64> {
    let mut out = logits.clone();
    for mut row in out.row_iter_mut() {
        let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        row.iter_mut().for_each(|v| *v = (*v - max).exp());
        let sum = row.sum();
        row.iter_mut().for_each(|v| *v /= sum);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> (Vec<Vec<f64>>, Vec<usize>) {
        let centres = [(-2.0, 0.0), (2.0, 0.0), (0.0, 3.0)];
        let mut rows = Vec::new();
        let mut targets = Vec::new();
        for (k, &(cx, cy)) in centres.iter().enumerate() {
            for i in 0..20 {
                let jitter = (i as f64 / 20.0 - 0.5) * 0.8;
                rows.push(vec![cx + jitter, cy - jitter]);
                targets.push(k);
            }
        }
        (rows, targets)
    }

    #[test]
    fn test_separates_blobs() {
        let (rows, targets) = blobs();
        let mut clf = SoftmaxRegression::new(ClassifierConfig::default());
        clf.fit(&rows, &targets, 3).unwrap();

        let correct = rows.iter().zip(&targets).filter(|(r, &t)| clf.predict(r) == t).count();
        assert_eq!(correct, rows.len());
        assert_eq!(clf.class_count(), 3);
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let (rows, targets) = blobs();
        let mut clf = SoftmaxRegression::new(ClassifierConfig::default());
        clf.fit(&rows, &targets, 3).unwrap();

        let p = clf.predict_proba(&[0.3, -0.2]);
        assert_eq!(p.len(), 3);
        assert!((p.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        assert!(p.iter().all(|&v| v > 0.0));
    }

    #[test]
    fn test_argmax_prefers_first_on_tie() {
        assert_eq!(argmax(&[0.2, 0.5, 0.5]), 1);
        assert_eq!(argmax(&[1.0]), 0);
    }

    #[test]
    fn test_target_out_of_range_rejected() {
        let mut clf = SoftmaxRegression::new(ClassifierConfig::default());
        let result = clf.fit(&[vec![0.0], vec![1.0]], &[0, 2], 2);
        assert!(matches!(result, Err(PipelineError::InvalidConfig { .. })));
    }

    #[test]
    fn test_softmax_is_shift_invariant() {
        let a = softmax(&[1.0, 2.0, 3.0]);
        let b = softmax(&[1001.0, 1002.0, 1003.0]);
        for (x, y) in a.iter().zip(&b) {
            assert!((x - y).abs() < 1e-12);
        }
    }
}
