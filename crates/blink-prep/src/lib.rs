//! Datasets, feature scaling, and seeded partitioning.
//!
//! Pure math library with zero I/O. Provides the labeled/unlabeled
//! [`Dataset`] container, per-feature standardization whose statistics are
//! fitted on a reference dataset and reused everywhere else, and seeded
//! train/validation and k-fold splitting.
//!
//! A [`ScaledDataset`] can only be produced by [`ScalingParameters::transform`],
//! so downstream classifiers never see unscaled features.

mod dataset;
mod error;
mod label;
mod scaler;
mod split;

pub use dataset::{Dataset, Subset};
pub use error::PrepError;
pub use label::{Label, LabelCounts};
pub use scaler::{FeatureStats, ScaledDataset, ScalingParameters};
pub use split::{FoldIndices, KFold, TrainValidationSplit};
