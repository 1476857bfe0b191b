//! Common spatial patterns
//!
//! [`Csp`] learns spatial filters for one frequency band whose output
//! variance differs most between classes. Two classes use the classic
//! generalised eigenproblem; more classes use one-vs-rest. Features are
//! log-normalised variances of the filtered signals.
//!
//! [`FilterBankCsp`] runs one [`Csp`] per band and concatenates features.

use nalgebra::{DMatrix, SymmetricEigen};
use serde::{Deserialize, Serialize};

use super::error::{PipelineError, PipelineResult};

/// Smallest eigenvalue accepted when whitening
const EIGEN_FLOOR: f64 = 1e-12;
/// Added to variances before taking logs
const VARIANCE_EPS: f64 = 1e-12;

/// Learns a fixed-size feature vector from band-filtered epochs.
///
/// Each epoch is given as one channels × samples matrix per band.
pub trait SpatialFilter {
    /// Fit on epochs with class indices `targets` in `0..n_classes`
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InsufficientData`] if a class has no epochs
    /// and [`PipelineError::Numerical`] for degenerate covariances.
    fn fit(&mut self, epochs: &[Vec<DMatrix<f64>>], targets: &[usize], n_classes: usize) -> PipelineResult<()>;

    /// Feature vector for one epoch
    ///
    /// # Errors
    ///
    /// Returns an error if called before `fit` or with the wrong band count
    /// or channel count.
    fn transform(&self, bands: &[DMatrix<f64>]) -> PipelineResult<Vec<f64>>;

    /// Length of the vectors produced by `transform`
    fn feature_count(&self) -> usize;
}

/// Spatial filters for one band
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Csp {
    /// One filter per row, channels wide
    filters: DMatrix<f64>,
}

impl Csp {
    /// Fit filters for one band.
    ///
    /// `components` is the total filter count for two classes and is
    /// spread as `ceil(components / n_classes)` per class otherwise.
    ///
    /// # Errors
    ///
    /// See [`SpatialFilter::fit`].
    pub fn fit(
        trials: &[&DMatrix<f64>],
        targets: &[usize],
        n_classes: usize,
        components: usize,
        regularization: f64,
    ) -> PipelineResult<Self> {
        let Some(first) = trials.first() else {
            return Err(PipelineError::insufficient("no trials to fit CSP"));
        };
        let channels = first.nrows();

        let class_covs = (0..n_classes)
            .map(|k| {
                let members: Vec<DMatrix<f64>> = trials
                    .iter()
                    .zip(targets)
                    .filter(|(_, &t)| t == k)
                    .map(|(x, _)| covariance(x))
                    .collect();
                if members.is_empty() {
                    return Err(PipelineError::insufficient(format!("class {k} has no epochs")));
                }
                let n = members.len() as f64;
                Ok(members.into_iter().fold(DMatrix::zeros(channels, channels), |acc, c| acc + c) / n)
            })
            .collect::<PipelineResult<Vec<_>>>()?;

        let filters = if n_classes == 2 {
            let (values, vectors) = contrast(&class_covs[0], &class_covs[1], regularization)?;
            // Eigenvalues near 0 or 1 separate best
            let mut order: Vec<usize> = (0..values.len()).collect();
            order.sort_by(|&a, &b| (values[b] - 0.5).abs().total_cmp(&(values[a] - 0.5).abs()));
            order.truncate(components.min(channels));
            select_rows(&vectors, &order)
        } else {
            let per_class = components.div_ceil(n_classes).min(channels);
            let mut rows = Vec::new();
            for (k, target) in class_covs.iter().enumerate() {
                let rest = class_covs
                    .iter()
                    .enumerate()
                    .filter(|&(j, _)| j != k)
                    .fold(DMatrix::zeros(channels, channels), |acc, (_, c)| acc + c)
                    / (n_classes - 1) as f64;
                let (values, vectors) = contrast(target, &rest, regularization)?;
                let mut order: Vec<usize> = (0..values.len()).collect();
                order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
                order.truncate(per_class);
                rows.extend(order.iter().map(|&i| vectors.row(i).iter().copied().collect::<Vec<f64>>()));
            }
            DMatrix::from_fn(rows.len(), channels, |r, c| rows[r][c])
        };

        Ok(Self { filters })
    }

    /// Log-normalised variance of each filtered component
    #[must_use]
    pub fn features(&self, x: &DMatrix<f64>) -> Vec<f64> {
        let z = &self.filters * x;
        let len = z.ncols().max(1) as f64;
        let vars: Vec<f64> = z
            .row_iter()
            .map(|r| {
                let mean = r.sum() / len;
                r.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / len
            })
            .collect();
        let total: f64 = vars.iter().sum::<f64>() + VARIANCE_EPS * vars.len() as f64;
        vars.iter().map(|v| ((v + VARIANCE_EPS) / total).ln()).collect()
    }

    /// Number of filters
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.filters.nrows()
    }

    /// Channels each filter expects
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.filters.ncols()
    }
}

/// One CSP per frequency band
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FilterBankCsp {
    components: usize,
    regularization: f64,
    bands: Vec<Csp>,
}

impl FilterBankCsp {
    /// Unfitted filter bank CSP
    #[must_use]
    pub fn new(components: usize, regularization: f64) -> Self {
        Self {
            components,
            regularization,
            bands: Vec::new(),
        }
    }

    /// Fitted per-band filters
    #[must_use]
    pub fn band_filters(&self) -> &[Csp] {
        &self.bands
    }
}

impl SpatialFilter for FilterBankCsp {
    fn fit(&mut self, epochs: &[Vec<DMatrix<f64>>], targets: &[usize], n_classes: usize) -> PipelineResult<()> {
        let n_bands = epochs.first().map_or(0, Vec::len);
        if n_bands == 0 {
            return Err(PipelineError::insufficient("no band-filtered epochs"));
        }

        self.bands = (0..n_bands)
            .map(|b| {
                let trials: Vec<&DMatrix<f64>> = epochs.iter().map(|e| &e[b]).collect();
                Csp::fit(&trials, targets, n_classes, self.components, self.regularization)
            })
            .collect::<PipelineResult<_>>()?;

        tracing::debug!(
            "Fitted filter bank CSP: {} bands, {} features",
            self.bands.len(),
            self.feature_count()
        );
        Ok(())
    }

    fn transform(&self, bands: &[DMatrix<f64>]) -> PipelineResult<Vec<f64>> {
        if self.bands.is_empty() {
            return Err(PipelineError::InvalidConfig {
                reason: "CSP used before fit".to_string(),
            });
        }
        if bands.len() != self.bands.len() {
            return Err(PipelineError::InvalidConfig {
                reason: format!("expected {} bands, got {}", self.bands.len(), bands.len()),
            });
        }

        let mut out = Vec::with_capacity(self.feature_count());
        for (csp, x) in self.bands.iter().zip(bands) {
            if x.nrows() != csp.channel_count() {
                return Err(PipelineError::IncompatibleShape {
                    expected_channels: csp.channel_count(),
                    expected_length: x.ncols(),
                    got_channels: x.nrows(),
                    got_length: x.ncols(),
                });
            }
            out.extend(csp.features(x));
        }
        Ok(out)
    }

    fn feature_count(&self) -> usize {
        self.bands.iter().map(Csp::component_count).sum()
    }
}

/// Trace-normalised spatial covariance of a channels × samples trial
fn covariance(x: &DMatrix<f64>) -> DMatrix<f64> {
    let (c, l) = x.shape();
    let means: Vec<f64> = (0..c).map(|i| x.row(i).sum() / l.max(1) as f64).collect();
    let centered = DMatrix::from_fn(c, l, |i, j| x[(i, j)] - means[i]);
    let cov = &centered * centered.transpose();
    let trace = cov.trace();
    if trace > 0.0 {
        cov / trace
    } else {
        cov
    }
}

/// Solve `target w = λ (target + other) w` via whitening.
///
/// Returns eigenvalues in `[0, 1]` and the matching spatial filters as rows.
fn contrast(
    target: &DMatrix<f64>,
    other: &DMatrix<f64>,
    regularization: f64,
) -> PipelineResult<(Vec<f64>, DMatrix<f64>)> {
    let n = target.nrows();
    let mut composite = target + other;
    let mean_diag = composite.trace() / n as f64;
    let ridge = if mean_diag > 0.0 { regularization * mean_diag } else { regularization };
    composite += DMatrix::identity(n, n) * ridge;

    let eig = SymmetricEigen::new(composite);
    if eig.eigenvalues.iter().any(|&v| !v.is_finite() || v <= EIGEN_FLOOR) {
        return Err(PipelineError::numerical(
            "composite covariance is singular; increase csp_regularization",
        ));
    }
    let inv_sqrt = DMatrix::from_diagonal(&eig.eigenvalues.map(|v| 1.0 / v.sqrt()));
    let whitening = inv_sqrt * eig.eigenvectors.transpose();

    let s = &whitening * target * whitening.transpose();
    let s = (&s + s.transpose()) * 0.5;
    let rotation = SymmetricEigen::new(s);
    if rotation.eigenvalues.iter().any(|v| !v.is_finite()) {
        return Err(PipelineError::numerical("CSP eigendecomposition did not converge"));
    }

    let filters = rotation.eigenvectors.transpose() * whitening;
    Ok((rotation.eigenvalues.iter().copied().collect(), filters))
}

fn select_rows(m: &DMatrix<f64>, rows: &[usize]) -> DMatrix<f64> {
    DMatrix::from_fn(rows.len(), m.ncols(), |r, c| m[(rows[r], c)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    /// Trials with extra variance on `loud` channel
    fn trial(rng: &mut StdRng, channels: usize, len: usize, loud: usize) -> DMatrix<f64> {
        DMatrix::from_fn(channels, len, |r, _| {
            let gain = if r == loud { 5.0 } else { 1.0 };
            gain * rng.gen_range(-1.0..1.0)
        })
    }

    #[test]
    fn test_binary_features_separate_classes() {
        let mut rng = StdRng::seed_from_u64(7);
        let trials: Vec<DMatrix<f64>> = (0..40).map(|i| trial(&mut rng, 4, 200, i % 2)).collect();
        let targets: Vec<usize> = (0..40).map(|i| i % 2).collect();
        let refs: Vec<&DMatrix<f64>> = trials.iter().collect();

        let csp = Csp::fit(&refs, &targets, 2, 2, 1e-3).unwrap();
        assert_eq!(csp.component_count(), 2);

        let f0 = csp.features(&trial(&mut rng, 4, 200, 0));
        let f1 = csp.features(&trial(&mut rng, 4, 200, 1));
        // The two extreme filters swap dominance between classes
        assert!((f0[0] - f0[1]) * (f1[0] - f1[1]) < 0.0);
    }

    #[test]
    fn test_multiclass_component_count() {
        let mut rng = StdRng::seed_from_u64(3);
        let trials: Vec<DMatrix<f64>> = (0..30).map(|i| trial(&mut rng, 6, 100, i % 3)).collect();
        let targets: Vec<usize> = (0..30).map(|i| i % 3).collect();
        let refs: Vec<&DMatrix<f64>> = trials.iter().collect();

        let csp = Csp::fit(&refs, &targets, 3, 4, 1e-3).unwrap();
        // ceil(4 / 3) = 2 filters per class
        assert_eq!(csp.component_count(), 6);
    }

    #[test]
    fn test_features_are_log_proportions() {
        let mut rng = StdRng::seed_from_u64(11);
        let trials: Vec<DMatrix<f64>> = (0..20).map(|i| trial(&mut rng, 3, 100, i % 2)).collect();
        let targets: Vec<usize> = (0..20).map(|i| i % 2).collect();
        let refs: Vec<&DMatrix<f64>> = trials.iter().collect();

        let csp = Csp::fit(&refs, &targets, 2, 3, 1e-3).unwrap();
        let f = csp.features(&trials[0]);
        let sum: f64 = f.iter().map(|v| v.exp()).sum();
        assert!((sum - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_unregularised_rank_deficient_covariance_is_numerical_error() {
        // Channel 1 duplicates channel 0, so the composite is singular
        let mut rng = StdRng::seed_from_u64(5);
        let trials: Vec<DMatrix<f64>> = (0..10)
            .map(|_| {
                let base: Vec<f64> = (0..50).map(|_| rng.gen_range(-1.0..1.0)).collect();
                DMatrix::from_fn(2, 50, |_, c| base[c])
            })
            .collect();
        let targets: Vec<usize> = (0..10).map(|i| i % 2).collect();
        let refs: Vec<&DMatrix<f64>> = trials.iter().collect();

        let result = Csp::fit(&refs, &targets, 2, 2, 0.0);
        assert!(matches!(result, Err(PipelineError::Numerical { .. })));
    }

    #[test]
    fn test_filter_bank_transform_before_fit_fails() {
        let fb = FilterBankCsp::new(4, 1e-3);
        assert!(fb.transform(&[DMatrix::zeros(2, 10)]).is_err());
    }
}
