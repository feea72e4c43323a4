use blink_prep::{Label, PrepError};

/// Errors from classifier fitting, grid search, evaluation, and the pipeline.
#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    /// Returned when a grid entry is malformed (non-positive cost or bandwidth,
    /// neighbor count of zero or larger than the training set).
    #[error("invalid hyperparameters {params}: {reason}")]
    InvalidHyperparameter {
        /// Debug rendering of the rejected hyperparameter tuple.
        params: String,
        /// Why the tuple was rejected.
        reason: String,
    },

    /// Returned when a hyperparameter grid has no entries.
    #[error("hyperparameter grid is empty")]
    EmptyGrid,

    /// Returned when true and predicted label sequences differ in length.
    #[error("label sequences differ in length: {expected} true labels, {got} predictions")]
    LengthMismatch {
        /// Number of true labels.
        expected: usize,
        /// Number of predicted labels.
        got: usize,
    },

    /// Returned when an error rate is requested for zero labels.
    #[error("cannot compute an error rate over zero labels")]
    EmptyInput,

    /// Returned when a dataset used for fitting or scoring carries no labels.
    #[error("dataset has no labels")]
    UnlabeledData,

    /// Returned when every training record carries the same label.
    #[error("training data contains only label {label}; need both classes")]
    SingleClassTraining {
        /// The only label present.
        label: Label,
    },

    /// Returned when the kernel solver exhausts its iteration budget.
    #[error("solver did not converge within {iterations} iterations")]
    SolverNotConverged {
        /// Iterations performed before giving up.
        iterations: usize,
    },

    /// Returned when prediction input width differs from the fitted width.
    #[error("prediction input has {got} features, model expects {expected}")]
    DimensionMismatch {
        /// Number of features the model was fitted on.
        expected: usize,
        /// Number of features in the prediction input.
        got: usize,
    },

    /// Returned when every grid point failed during cross-validation.
    #[error("all {n_candidates} grid points failed during cross-validation")]
    NoViableCandidate {
        /// Number of grid points evaluated.
        n_candidates: usize,
    },

    /// Wraps a dataset, scaling, or splitting error.
    #[error(transparent)]
    Prep(#[from] PrepError),
}
