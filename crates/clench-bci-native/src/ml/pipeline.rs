//! Epoch classification pipeline
//!
//! Fitting runs, in order:
//! 1. band-pass filter bank over every epoch
//! 2. filter-bank CSP fitted on all epochs
//! 3. stratified train/test split
//! 4. standard scaler and softmax regression on the training part
//! 5. evaluation on the test part
//!
//! The result is a [`TrainedModel`] that applies the same frozen steps to
//! new epochs and round-trips through versioned JSON.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use clench_bci_core::segment::Epoch;
use clench_bci_core::types::{FrequencyBand, Marker};

use super::classifier::{argmax, Classifier, ClassifierConfig, SoftmaxRegression};
use super::csp::{FilterBankCsp, SpatialFilter};
use super::error::{PipelineError, PipelineResult};
use super::metrics::ClassificationReport;
use super::relevance::mutual_information;
use super::scaler::StandardScaler;
use super::split::stratified_split;
use crate::processing::filters::BandFilterBank;
use crate::processing::spectrum::BandPowerAnalyzer;

/// Model file format written by this build
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Pipeline parameters
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Sample rate of the recorded epochs (Hz)
    pub sample_rate_hz: f64,
    /// Bands in the filter bank
    pub bands: Vec<FrequencyBand>,
    /// Second-order sections per filter side
    pub filter_order: usize,
    /// CSP components per band
    pub csp_components: usize,
    /// Ridge added to the composite covariance, relative to its mean diagonal
    pub csp_regularization: f64,
    /// Share of each class held out for testing
    pub test_fraction: f64,
    /// Split seed
    pub seed: u64,
    /// Classifier training settings
    pub classifier: ClassifierConfig,
    /// Bins per feature for mutual information
    pub relevance_bins: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: 125.0,
            bands: FrequencyBand::ALL.to_vec(),
            filter_order: 2,
            csp_components: 4,
            csp_regularization: 1e-3,
            test_fraction: 0.2,
            seed: 42,
            classifier: ClassifierConfig::default(),
            relevance_bins: 8,
        }
    }
}

impl PipelineConfig {
    /// Check parameter ranges
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] describing the first bad
    /// parameter.
    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |reason: &str| {
            Err(PipelineError::InvalidConfig {
                reason: reason.to_string(),
            })
        };
        if self.csp_components == 0 {
            return invalid("csp_components must be at least 1");
        }
        if !(self.csp_regularization >= 0.0) {
            return invalid("csp_regularization must be non-negative");
        }
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return invalid("test_fraction must be in (0, 1)");
        }
        self.classifier.validate()?;
        BandFilterBank::new(self.sample_rate_hz, self.bands.clone(), self.filter_order).map(|_| ())
    }
}

/// Evaluation results from [`ClassificationPipeline::fit`]
#[derive(Clone, Debug, Serialize)]
pub struct TrainingMetrics {
    /// Accuracy on the training partition
    pub train_accuracy: f64,
    /// Accuracy on the held-out partition
    pub test_accuracy: f64,
    /// Held-out per-class report
    pub report: ClassificationReport,
    /// Epochs used for training
    pub train_size: usize,
    /// Epochs held out
    pub test_size: usize,
    /// Mutual information of each CSP feature with the labels
    pub feature_relevance: Vec<f64>,
    /// Mean relative band power per class, bands in config order
    pub class_band_power: Vec<(Marker, Vec<f64>)>,
}

/// Fitted, frozen pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainedModel {
    format_version: u32,
    channel_count: usize,
    epoch_length: usize,
    classes: Vec<Marker>,
    filter_bank: BandFilterBank,
    spatial: FilterBankCsp,
    scaler: StandardScaler,
    classifier: SoftmaxRegression,
}

#[derive(Deserialize)]
struct VersionProbe {
    format_version: u32,
}

impl TrainedModel {
    /// Labels the model can output, ascending
    #[must_use]
    pub fn classes(&self) -> &[Marker] {
        &self.classes
    }

    /// Channels per epoch expected at predict time
    #[must_use]
    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Samples per epoch expected at predict time
    #[must_use]
    pub fn epoch_length(&self) -> usize {
        self.epoch_length
    }

    /// Predict a label for each epoch
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IncompatibleShape`] if any epoch differs in
    /// shape from the training epochs.
    pub fn predict(&self, epochs: &[Epoch]) -> PipelineResult<Vec<Marker>> {
        Ok(self
            .predict_proba(epochs)?
            .iter()
            .map(|p| self.classes[argmax(p)])
            .collect())
    }

    /// Class probabilities for each epoch, columns in [`Self::classes`] order
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::IncompatibleShape`] if any epoch differs in
    /// shape from the training epochs.
    pub fn predict_proba(&self, epochs: &[Epoch]) -> PipelineResult<Vec<Vec<f64>>> {
        epochs
            .iter()
            .map(|e| {
                let features = self.features(e)?;
                let proba = self.classifier.predict_proba(&features);
                if proba.len() != self.classes.len() {
                    return Err(PipelineError::InvalidConfig {
                        reason: "model classifier does not match its class list".to_string(),
                    });
                }
                Ok(proba)
            })
            .collect()
    }

    /// Write as pretty JSON
    ///
    /// # Errors
    ///
    /// Returns I/O or serialization errors.
    pub fn save(&self, path: impl AsRef<Path>) -> PipelineResult<()> {
        let mut writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        tracing::info!("Saved model to {}", path.as_ref().display());
        Ok(())
    }

    /// Read a model written by [`Self::save`]
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::UnsupportedVersion`] for other format
    /// versions, or I/O and serialization errors.
    pub fn load(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    /// Parse a model from JSON text
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn from_json(text: &str) -> PipelineResult<Self> {
        let probe: VersionProbe = serde_json::from_str(text)?;
        if probe.format_version != MODEL_FORMAT_VERSION {
            return Err(PipelineError::UnsupportedVersion {
                found: probe.format_version,
                expected: MODEL_FORMAT_VERSION,
            });
        }
        Ok(serde_json::from_str(text)?)
    }

    fn check_shape(&self, epoch: &Epoch) -> PipelineResult<()> {
        if !has_shape(epoch, self.channel_count, self.epoch_length) {
            return Err(PipelineError::IncompatibleShape {
                expected_channels: self.channel_count,
                expected_length: self.epoch_length,
                got_channels: epoch.channel_count(),
                got_length: epoch.len(),
            });
        }
        Ok(())
    }

    fn features(&self, epoch: &Epoch) -> PipelineResult<Vec<f64>> {
        self.check_shape(epoch)?;
        let csp = self.spatial.transform(&self.filter_bank.apply(epoch))?;
        Ok(self.scaler.transform(&csp))
    }
}

/// Every channel of `epoch` has `length` samples
fn has_shape(epoch: &Epoch, channels: usize, length: usize) -> bool {
    epoch.channel_count() == channels && epoch.data.iter().all(|ch| ch.len() == length)
}

/// Offline training entry point
#[derive(Clone, Debug)]
pub struct ClassificationPipeline {
    config: PipelineConfig,
}

impl ClassificationPipeline {
    /// Create a pipeline
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidConfig`] if the config is invalid.
    pub fn new(config: PipelineConfig) -> PipelineResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Pipeline parameters
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fit the full pipeline and evaluate it on a held-out split.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::InsufficientData`] for no epochs, fewer than two
    ///   labels, or a label with too few epochs to stratify
    /// - [`PipelineError::IncompatibleShape`] for a ragged epoch set
    /// - [`PipelineError::Numerical`] for degenerate covariances
    pub fn fit(&self, epochs: &[Epoch]) -> PipelineResult<(TrainedModel, TrainingMetrics)> {
        let Some(first) = epochs.first() else {
            return Err(PipelineError::insufficient("no epochs to train on"));
        };
        let (channel_count, epoch_length) = (first.channel_count(), first.len());
        if let Some(bad) = epochs.iter().find(|e| !has_shape(e, channel_count, epoch_length)) {
            return Err(PipelineError::IncompatibleShape {
                expected_channels: channel_count,
                expected_length: epoch_length,
                got_channels: bad.channel_count(),
                got_length: bad.len(),
            });
        }

        let mut classes: Vec<Marker> = epochs.iter().map(|e| e.label).collect();
        classes.sort_unstable();
        classes.dedup();
        let targets: Vec<usize> = epochs
            .iter()
            .map(|e| classes.partition_point(|&c| c < e.label))
            .collect();

        // Split first so label problems surface before the expensive steps
        let split = stratified_split(&targets, self.config.test_fraction, self.config.seed)?;
        tracing::info!(
            "Training on {} epochs ({} train / {} test), classes {:?}",
            epochs.len(),
            split.train.len(),
            split.test.len(),
            classes.iter().map(|m| m.value()).collect::<Vec<_>>()
        );

        let filter_bank = BandFilterBank::new(
            self.config.sample_rate_hz,
            self.config.bands.clone(),
            self.config.filter_order,
        )?;
        let banded: Vec<Vec<DMatrix<f64>>> = epochs.iter().map(|e| filter_bank.apply(e)).collect();

        let mut spatial = FilterBankCsp::new(self.config.csp_components, self.config.csp_regularization);
        spatial.fit(&banded, &targets, classes.len())?;
        let features = banded
            .iter()
            .map(|b| spatial.transform(b))
            .collect::<PipelineResult<Vec<_>>>()?;

        let feature_relevance = mutual_information(&features, &targets, self.config.relevance_bins);
        let class_band_power = self.class_band_power(epochs, &classes, epoch_length);

        let pick = |idx: &[usize]| -> (Vec<Vec<f64>>, Vec<usize>) {
            idx.iter().map(|&i| (features[i].clone(), targets[i])).unzip()
        };
        let (train_x, train_y) = pick(&split.train);
        let (test_x, test_y) = pick(&split.test);

        let scaler = StandardScaler::fit(&train_x)?;
        let train_x: Vec<Vec<f64>> = train_x.iter().map(|r| scaler.transform(r)).collect();
        let test_x: Vec<Vec<f64>> = test_x.iter().map(|r| scaler.transform(r)).collect();

        let mut classifier = SoftmaxRegression::new(self.config.classifier.clone());
        classifier.fit(&train_x, &train_y, classes.len())?;

        let train_pred: Vec<usize> = train_x.iter().map(|r| classifier.predict(r)).collect();
        let test_pred: Vec<usize> = test_x.iter().map(|r| classifier.predict(r)).collect();
        let train_accuracy = ClassificationReport::from_predictions(&classes, &train_y, &train_pred).accuracy;
        let report = ClassificationReport::from_predictions(&classes, &test_y, &test_pred);

        tracing::info!(
            "Train accuracy {:.3}, test accuracy {:.3}",
            train_accuracy,
            report.accuracy
        );

        let metrics = TrainingMetrics {
            train_accuracy,
            test_accuracy: report.accuracy,
            report,
            train_size: split.train.len(),
            test_size: split.test.len(),
            feature_relevance,
            class_band_power,
        };
        let model = TrainedModel {
            format_version: MODEL_FORMAT_VERSION,
            channel_count,
            epoch_length,
            classes,
            filter_bank,
            spatial,
            scaler,
            classifier,
        };
        Ok((model, metrics))
    }

    /// Predict labels with a fitted model
    ///
    /// # Errors
    ///
    /// See [`TrainedModel::predict`].
    pub fn predict(&self, model: &TrainedModel, epochs: &[Epoch]) -> PipelineResult<Vec<Marker>> {
        model.predict(epochs)
    }

    /// Predict class probabilities with a fitted model
    ///
    /// # Errors
    ///
    /// See [`TrainedModel::predict_proba`].
    pub fn predict_proba(&self, model: &TrainedModel, epochs: &[Epoch]) -> PipelineResult<Vec<Vec<f64>>> {
        model.predict_proba(epochs)
    }

    fn class_band_power(&self, epochs: &[Epoch], classes: &[Marker], epoch_length: usize) -> Vec<(Marker, Vec<f64>)> {
        let bands = &self.config.bands;
        let mut analyzer = BandPowerAnalyzer::new(epoch_length, self.config.sample_rate_hz);

        classes
            .iter()
            .map(|&class| {
                let mut acc = vec![0.0; bands.len()];
                let mut count = 0usize;
                for epoch in epochs.iter().filter(|e| e.label == class) {
                    for (a, p) in acc.iter_mut().zip(analyzer.epoch_profile(epoch, bands)) {
                        *a += p;
                    }
                    count += 1;
                }
                if count > 0 {
                    acc.iter_mut().for_each(|a| *a /= count as f64);
                }
                (class, acc)
            })
            .collect()
    }
}
