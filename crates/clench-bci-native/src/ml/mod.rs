//! Offline epoch classification
//!
//! - [`pipeline`]: Fit/predict entry point and the persisted [`TrainedModel`]
//! - [`csp`]: Filter-bank common spatial patterns
//! - [`scaler`]: Feature standardisation
//! - [`classifier`]: Softmax regression
//! - [`split`]: Stratified train/test split
//! - [`metrics`]: Classification report
//! - [`relevance`]: Mutual-information feature relevance

pub mod classifier;
pub mod csp;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod relevance;
pub mod scaler;
pub mod split;

pub use classifier::{Classifier, ClassifierConfig, SoftmaxRegression};
pub use csp::{Csp, FilterBankCsp, SpatialFilter};
pub use error::{PipelineError, PipelineResult};
pub use metrics::{ClassMetrics, ClassificationReport};
pub use pipeline::{ClassificationPipeline, PipelineConfig, TrainedModel, TrainingMetrics, MODEL_FORMAT_VERSION};
pub use relevance::mutual_information;
pub use scaler::StandardScaler;
pub use split::{stratified_split, Split};
