//! Domain types for blink-io.

use blink_prep::Dataset;

use crate::IoError;

/// A validated experiment name for output file naming.
///
/// Must match `[a-zA-Z0-9_-]+`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExperimentName(String);

impl ExperimentName {
    /// Parse and validate an experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::InvalidExperimentName`] if the name is empty or
    /// contains characters outside `[a-zA-Z0-9_-]`.
    pub fn new(name: String) -> Result<Self, IoError> {
        if name.is_empty()
            || !name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(IoError::InvalidExperimentName { name });
        }
        Ok(Self(name))
    }

    /// Return the experiment name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ExperimentName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dataset read from a CSV file together with its feature column names.
///
/// Produced by [`DatasetReader`](crate::DatasetReader). `feature_names[j]`
/// names column `j` of every feature row.
#[derive(Debug, Clone)]
pub struct TabularData {
    feature_names: Vec<String>,
    dataset: Dataset,
}

impl TabularData {
    pub(crate) fn new(feature_names: Vec<String>, dataset: Dataset) -> Self {
        Self {
            feature_names,
            dataset,
        }
    }

    /// Return the feature column names, in file order.
    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Return the parsed records.
    #[must_use]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    /// Consume and return the parsed records.
    #[must_use]
    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }

    /// Return the number of records.
    #[must_use]
    pub fn n_records(&self) -> usize {
        self.dataset.n_records()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }
}
