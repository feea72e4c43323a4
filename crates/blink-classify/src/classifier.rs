//! The pluggable classifier interface searched over by [`GridSearch`](crate::GridSearch).

use std::fmt;

use blink_prep::{Label, ScaledDataset};
use serde::Serialize;

use crate::error::ClassifyError;

/// A binary classifier family with its own hyperparameter type.
///
/// Implementations are stateless strategies: everything learned from data
/// lives in [`Classifier::Model`]. Fitting and prediction accept only
/// [`ScaledDataset`], so raw features never reach a classifier.
///
/// `Sync` is required because grid search fits many (hyperparameter, fold)
/// pairs concurrently against one shared strategy.
pub trait Classifier: Sync {
    /// One point of the hyperparameter grid.
    type Params: Clone + fmt::Debug + Serialize + Send + Sync;

    /// A fitted model.
    type Model: fmt::Debug + Send + Sync;

    /// Short identifier used in logs and output file names.
    fn name(&self) -> &'static str;

    /// Check the parts of `params` that hold regardless of the training data.
    ///
    /// Runs before the data is split or scaled.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidHyperparameter`] for malformed entries.
    fn check_params(&self, params: &Self::Params) -> Result<(), ClassifyError> {
        let _ = params;
        Ok(())
    }

    /// Check `params` before any fitting, given the smallest training set it will see.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::InvalidHyperparameter`] for malformed entries.
    fn validate(&self, params: &Self::Params, n_train: usize) -> Result<(), ClassifyError>;

    /// Fit a model on labeled, scaled training data.
    ///
    /// # Errors
    ///
    /// Implementation specific; see each classifier.
    fn fit(&self, train: &ScaledDataset, params: &Self::Params)
    -> Result<Self::Model, ClassifyError>;

    /// Predict one label per record of `data`, in record order.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::DimensionMismatch`] if `data` has a different
    /// width than the training data.
    fn predict(&self, model: &Self::Model, data: &ScaledDataset)
    -> Result<Vec<Label>, ClassifyError>;
}

/// Borrow the labels of a dataset that must be labeled.
pub(crate) fn required_labels(data: &ScaledDataset) -> Result<&[Label], ClassifyError> {
    data.labels().ok_or(ClassifyError::UnlabeledData)
}
