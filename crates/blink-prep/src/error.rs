//! Error types for dataset validation, scaling, and splitting.

/// Errors from dataset construction, feature scaling, and partitioning.
#[derive(Debug, thiserror::Error)]
pub enum PrepError {
    /// Returned when a dataset has zero records.
    #[error("dataset has zero records")]
    EmptyDataset,

    /// Returned when records have zero feature columns.
    #[error("dataset has zero feature columns")]
    ZeroFeatures,

    /// Returned when a record has a different number of features than the first record.
    #[error("record {record_index} has {got} features, expected {expected}")]
    FeatureCountMismatch {
        /// The expected number of features.
        expected: usize,
        /// The actual number of features in the record.
        got: usize,
        /// The zero-based index of the offending record.
        record_index: usize,
    },

    /// Returned when a feature value is NaN or infinite.
    #[error("non-finite value at record {record_index}, feature {feature_index}")]
    NonFiniteValue {
        /// The zero-based index of the offending record.
        record_index: usize,
        /// The zero-based index of the offending feature column.
        feature_index: usize,
    },

    /// Returned when the label vector and the feature rows differ in length.
    #[error("dataset has {n_records} records but {n_labels} labels")]
    LabelCountMismatch {
        /// Number of feature rows.
        n_records: usize,
        /// Number of labels supplied.
        n_labels: usize,
    },

    /// Returned when a label value is outside {0, 1}.
    #[error("label must be 0 or 1, got {value}")]
    InvalidLabel {
        /// The rejected label value.
        value: u64,
    },

    /// Returned when fewer records are available than an operation needs.
    #[error("need at least {required} records, got {n_records}")]
    TooFewRecords {
        /// Number of records available.
        n_records: usize,
        /// Minimum number of records required.
        required: usize,
    },

    /// Returned when a feature has zero spread, so standardization would divide by zero.
    #[error("feature {feature_index} is constant (every value is {value}); cannot scale")]
    DegenerateFeature {
        /// The zero-based index of the constant feature column.
        feature_index: usize,
        /// The value shared by every record.
        value: f64,
    },

    /// Returned when a feature's mean or spread does not fit in an `f64`.
    #[error("feature {feature_index} cannot be scaled: mean {mean}, std_dev {std_dev}")]
    UnscalableFeature {
        /// The zero-based index of the feature column.
        feature_index: usize,
        /// The computed mean.
        mean: f64,
        /// The computed sample standard deviation.
        std_dev: f64,
    },

    /// Returned when a dataset's width differs from the width the scaler was fitted on.
    #[error("scaling parameters cover {expected} features, dataset has {got}")]
    DimensionMismatch {
        /// Number of features the parameters were fitted on.
        expected: usize,
        /// Number of features in the dataset being transformed.
        got: usize,
    },

    /// Returned when the train fraction is not strictly between 0 and 1.
    #[error("train_fraction must be in (0.0, 1.0), got {fraction}")]
    InvalidTrainFraction {
        /// The invalid fraction provided.
        fraction: f64,
    },

    /// Returned when a train/validation split would leave one side empty.
    #[error("train_fraction {fraction} leaves an empty partition for {n_records} records")]
    EmptyPartition {
        /// Number of records being split.
        n_records: usize,
        /// The train fraction in effect.
        fraction: f64,
    },

    /// Returned when n_folds is less than 2.
    #[error("n_folds must be at least 2, got {n_folds}")]
    InvalidFoldCount {
        /// The invalid n_folds value provided.
        n_folds: usize,
    },

    /// Returned when there are fewer records than folds.
    #[error("cannot form {n_folds} folds from {n_records} records")]
    TooFewRecordsForFolds {
        /// Number of records available.
        n_records: usize,
        /// The requested number of folds.
        n_folds: usize,
    },
}
