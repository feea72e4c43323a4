//! Labeled and unlabeled record collections.

use crate::error::PrepError;
use crate::label::Label;

/// An ordered collection of fixed-width numeric records with optional labels.
///
/// `features[record][feature]` is row-major. When present, `labels[i]`
/// belongs to `features[i]`. Construction guarantees at least one record,
/// at least one feature column, a consistent width, and finite values.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    features: Vec<Vec<f64>>,
    labels: Option<Vec<Label>>,
    n_features: usize,
}

/// Row selection shared by raw and scaled datasets, used by the splitters.
pub trait Subset: Sized {
    /// Return the number of records.
    fn n_records(&self) -> usize;

    /// Build a new collection from the records at `indices`, in that order.
    ///
    /// # Panics
    ///
    /// Panics if any index is out of bounds or `indices` is empty.
    #[must_use]
    fn select(&self, indices: &[usize]) -> Self;
}

impl Dataset {
    /// Build a labeled dataset.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`PrepError::EmptyDataset`] | `features` is empty |
    /// | [`PrepError::ZeroFeatures`] | records have zero columns |
    /// | [`PrepError::FeatureCountMismatch`] | records have inconsistent widths |
    /// | [`PrepError::NonFiniteValue`] | any value is NaN or infinite |
    /// | [`PrepError::LabelCountMismatch`] | `labels.len() != features.len()` |
    pub fn labeled(features: Vec<Vec<f64>>, labels: Vec<Label>) -> Result<Self, PrepError> {
        let n_features = validate_features(&features)?;
        if labels.len() != features.len() {
            return Err(PrepError::LabelCountMismatch {
                n_records: features.len(),
                n_labels: labels.len(),
            });
        }
        Ok(Self {
            features,
            labels: Some(labels),
            n_features,
        })
    }

    /// Build an unlabeled dataset.
    ///
    /// # Errors
    ///
    /// Same feature checks as [`Dataset::labeled`].
    pub fn unlabeled(features: Vec<Vec<f64>>) -> Result<Self, PrepError> {
        let n_features = validate_features(&features)?;
        Ok(Self {
            features,
            labels: None,
            n_features,
        })
    }

    /// Assemble a dataset whose invariants the caller already guarantees.
    pub(crate) fn from_parts(
        features: Vec<Vec<f64>>,
        labels: Option<Vec<Label>>,
        n_features: usize,
    ) -> Self {
        debug_assert!(features.iter().all(|row| row.len() == n_features));
        Self {
            features,
            labels,
            n_features,
        }
    }

    /// Return the feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        &self.features
    }

    /// Return the labels, or `None` for an unlabeled dataset.
    #[must_use]
    pub fn labels(&self) -> Option<&[Label]> {
        self.labels.as_deref()
    }

    /// Return true if every record carries a label.
    #[must_use]
    pub fn is_labeled(&self) -> bool {
        self.labels.is_some()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Return the number of records.
    #[must_use]
    pub fn n_records(&self) -> usize {
        self.features.len()
    }

    /// Drop the labels, keeping the features.
    #[must_use]
    pub fn without_labels(&self) -> Self {
        Self {
            features: self.features.clone(),
            labels: None,
            n_features: self.n_features,
        }
    }

    /// Iterate over the values of one feature column.
    pub(crate) fn column(&self, feature_index: usize) -> impl Iterator<Item = f64> + '_ {
        self.features.iter().map(move |row| row[feature_index])
    }
}

impl Subset for Dataset {
    fn n_records(&self) -> usize {
        self.features.len()
    }

    fn select(&self, indices: &[usize]) -> Self {
        assert!(!indices.is_empty(), "cannot select an empty subset");
        let features = indices.iter().map(|&i| self.features[i].clone()).collect();
        let labels = self
            .labels
            .as_ref()
            .map(|labels| indices.iter().map(|&i| labels[i]).collect());
        Self {
            features,
            labels,
            n_features: self.n_features,
        }
    }
}

/// Check shape and finiteness; return the feature count.
fn validate_features(features: &[Vec<f64>]) -> Result<usize, PrepError> {
    let first = features.first().ok_or(PrepError::EmptyDataset)?;
    let n_features = first.len();
    if n_features == 0 {
        return Err(PrepError::ZeroFeatures);
    }
    for (record_index, row) in features.iter().enumerate() {
        if row.len() != n_features {
            return Err(PrepError::FeatureCountMismatch {
                expected: n_features,
                got: row.len(),
                record_index,
            });
        }
        if let Some(feature_index) = row.iter().position(|v| !v.is_finite()) {
            return Err(PrepError::NonFiniteValue {
                record_index,
                feature_index,
            });
        }
    }
    Ok(n_features)
}
