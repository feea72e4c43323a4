//! Eye-state classification: train, tune, evaluate, predict.
//!
//! Provides a [`Classifier`] abstraction with two implementations (an RBF
//! kernel support vector machine and a k-nearest-neighbor vote), exhaustive
//! k-fold cross-validated grid search over hyperparameters, confusion-matrix
//! evaluation, and the [`Pipeline`] that wires splitting, scaling, tuning,
//! validation, and test-set prediction together.

mod classifier;
mod confusion;
mod error;
mod grid;
mod kernel;
mod neighbors;
mod pipeline;
mod smo;

pub use classifier::Classifier;
pub use confusion::{ClassMetrics, ConfusionMatrix, error_rate};
pub use error::ClassifyError;
pub use grid::{CandidateOutcome, CandidateScore, GridSearch, ModelResult, ParamGrid};
pub use kernel::{KernelClassifier, KernelModel, KernelParams};
pub use neighbors::{NeighborClassifier, NeighborModel, NeighborParams};
pub use pipeline::{Pipeline, PipelineReport, Stage};
