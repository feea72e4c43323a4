//! End-to-end run: split, scale, tune, validate, predict.

use std::fmt;

use blink_prep::{Dataset, Label, LabelCounts, ScalingParameters, TrainValidationSplit};
use serde::Serialize;
use tracing::{info, instrument};

use crate::classifier::{Classifier, required_labels};
use crate::confusion::ConfusionMatrix;
use crate::error::ClassifyError;
use crate::grid::{GridSearch, ModelResult, ParamGrid};

/// Pipeline stages, in execution order.
///
/// The labeled data is partitioned before scaling so that scaling statistics
/// come from the training partition alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Input datasets accepted.
    Loaded,
    /// Labeled data partitioned into training and validation sets.
    Split,
    /// Scaler fitted on the training partition and applied to every set.
    Scaled,
    /// Hyperparameters selected and the winner refitted.
    Tuned,
    /// Validation predictions scored.
    Evaluated,
    /// Test-set labels predicted.
    Predicted,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 6] = [
        Stage::Loaded,
        Stage::Split,
        Stage::Scaled,
        Stage::Tuned,
        Stage::Evaluated,
        Stage::Predicted,
    ];
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Loaded => "loaded",
            Self::Split => "split",
            Self::Scaled => "scaled",
            Self::Tuned => "tuned",
            Self::Evaluated => "evaluated",
            Self::Predicted => "predicted",
        };
        f.write_str(name)
    }
}

/// Everything a finished run produces.
#[derive(Debug, Clone)]
pub struct PipelineReport<P, M> {
    /// Selected hyperparameters, refitted model, and the candidate table.
    pub model: ModelResult<P, M>,
    /// Scaling statistics fitted on the training partition.
    pub scaling: ScalingParameters,
    /// Records in the training partition.
    pub n_train: usize,
    /// Records in the validation partition.
    pub n_validation: usize,
    /// Validation confusion matrix.
    pub validation_confusion: ConfusionMatrix,
    /// Validation error rate.
    pub validation_error: f64,
    /// One predicted label per test record, in input order.
    pub test_predictions: Vec<Label>,
    /// Distribution of `test_predictions`.
    pub prediction_counts: LabelCounts,
}

/// The model-selection and evaluation pipeline.
///
/// Construct via [`Pipeline::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter | Default |
/// |-----------|---------|
/// | `seed`    | 42      |
#[derive(Debug, Clone)]
pub struct Pipeline {
    split: TrainValidationSplit,
    search: GridSearch,
}

impl Pipeline {
    /// Create a pipeline holding out `1 - train_fraction` of the labeled data
    /// for validation and tuning with `n_folds`-fold cross-validation.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ClassifyError::Prep`] | `train_fraction` outside `(0, 1)` or `n_folds < 2` |
    pub fn new(train_fraction: f64, n_folds: usize) -> Result<Self, ClassifyError> {
        Ok(Self {
            split: TrainValidationSplit::new(train_fraction)?,
            search: GridSearch::new(n_folds)?,
        })
    }

    /// Seed both the train/validation split and the fold permutation.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.split = self.split.with_seed(seed);
        self.search = self.search.with_seed(seed);
        self
    }

    /// Return the training fraction.
    #[must_use]
    pub fn train_fraction(&self) -> f64 {
        self.split.train_fraction()
    }

    /// Return the fold count.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.search.n_folds()
    }

    /// Return the seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.split.seed()
    }

    /// Run every stage for one classifier.
    ///
    /// `labeled` supplies training and validation records; `test` is scaled
    /// with the training statistics and labeled by the tuned model. Any
    /// failure aborts the run.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ClassifyError::UnlabeledData`] | `labeled` has no labels |
    /// | [`ClassifyError::InvalidHyperparameter`] | a grid point is malformed on its own; checked before splitting |
    /// | [`ClassifyError::Prep`] | empty partition, degenerate feature, or `test` width differs |
    /// | [`ClassifyError::InvalidHyperparameter`] | a grid point does not fit the fold size |
    /// | [`ClassifyError::NoViableCandidate`] | every grid point failed |
    /// | any fit error | refitting the winner failed |
    #[instrument(skip_all, fields(classifier = classifier.name(), seed = self.seed()))]
    pub fn run<C: Classifier>(
        &self,
        classifier: &C,
        grid: &ParamGrid<C::Params>,
        labeled: &Dataset,
        test: &Dataset,
    ) -> Result<PipelineReport<C::Params, C::Model>, ClassifyError> {
        if !labeled.is_labeled() {
            return Err(ClassifyError::UnlabeledData);
        }
        for params in grid.iter() {
            classifier.check_params(params)?;
        }
        info!(
            stage = %Stage::Loaded,
            n_labeled = labeled.n_records(),
            n_test = test.n_records(),
            n_features = labeled.n_features(),
            "inputs accepted"
        );

        let (train, validation) = self.split.split(labeled)?;
        info!(
            stage = %Stage::Split,
            n_train = train.n_records(),
            n_validation = validation.n_records(),
            "labeled data partitioned"
        );

        let scaling = ScalingParameters::fit(&train)?;
        let train = scaling.transform(&train)?;
        let validation = scaling.transform(&validation)?;
        let test = scaling.transform(&test.without_labels())?;
        info!(stage = %Stage::Scaled, n_features = scaling.n_features(), "features standardized");

        let model = self.search.search(classifier, grid, &train)?;
        info!(
            stage = %Stage::Tuned,
            best_index = model.best_index,
            cv_error = model.mean_error,
            "hyperparameters tuned"
        );

        let predicted = classifier.predict(&model.model, &validation)?;
        let validation_confusion =
            ConfusionMatrix::from_labels(required_labels(&validation)?, &predicted)?;
        let validation_error = validation_confusion.error_rate()?;
        info!(stage = %Stage::Evaluated, validation_error, "validation scored");

        let test_predictions = classifier.predict(&model.model, &test)?;
        let prediction_counts = LabelCounts::from_labels(&test_predictions);
        info!(
            stage = %Stage::Predicted,
            open = prediction_counts.open,
            closed = prediction_counts.closed,
            "test labels predicted"
        );

        Ok(PipelineReport {
            model,
            scaling,
            n_train: train.n_records(),
            n_validation: validation.n_records(),
            validation_confusion,
            validation_error,
            test_predictions,
            prediction_counts,
        })
    }
}
