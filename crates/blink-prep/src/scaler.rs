//! Per-feature standardization fitted on a reference dataset.
//!
//! Statistics come from one dataset (the training partition) and are then
//! applied unchanged to every other dataset, so validation and test records
//! never influence the transform.

use serde::Serialize;
use tracing::{debug, instrument};

use crate::dataset::{Dataset, Subset};
use crate::error::PrepError;
use crate::label::Label;

/// Center and spread of one feature column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FeatureStats {
    /// Arithmetic mean.
    pub mean: f64,
    /// Sample standard deviation (divides by `n - 1`). Always positive.
    pub std_dev: f64,
}

/// Fitted per-feature scaling statistics. Immutable once fitted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScalingParameters {
    stats: Vec<FeatureStats>,
}

/// A dataset whose features have been standardized.
///
/// Only constructible through [`ScalingParameters::transform`].
#[derive(Debug, Clone, PartialEq)]
pub struct ScaledDataset(Dataset);

impl ScalingParameters {
    /// Compute mean and sample standard deviation for every feature of `dataset`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`PrepError::TooFewRecords`] | fewer than 2 records (sample deviation undefined) |
    /// | [`PrepError::DegenerateFeature`] | a feature has the same value in every record |
    /// | [`PrepError::UnscalableFeature`] | a feature's spread exceeds the `f64` range |
    #[instrument(skip_all, fields(n_records = dataset.n_records(), n_features = dataset.n_features()))]
    pub fn fit(dataset: &Dataset) -> Result<Self, PrepError> {
        let n = dataset.n_records();
        if n < 2 {
            return Err(PrepError::TooFewRecords {
                n_records: n,
                required: 2,
            });
        }

        let mut stats = Vec::with_capacity(dataset.n_features());
        for feature_index in 0..dataset.n_features() {
            let first = dataset.features()[0][feature_index];
            // Constant columns can yield a tiny non-zero deviation from rounding
            // in the mean, so test for spread directly.
            if dataset.column(feature_index).all(|v| v == first) {
                return Err(PrepError::DegenerateFeature {
                    feature_index,
                    value: first,
                });
            }

            // Moments are taken on values divided by the column's largest
            // magnitude so squared deviations stay finite for huge inputs.
            let magnitude = dataset
                .column(feature_index)
                .fold(0.0f64, |acc, v| acc.max(v.abs()));
            let unit_mean = dataset
                .column(feature_index)
                .map(|v| v / magnitude)
                .sum::<f64>()
                / n as f64;
            let unit_variance = dataset
                .column(feature_index)
                .map(|v| (v / magnitude - unit_mean).powi(2))
                .sum::<f64>()
                / (n - 1) as f64;
            let mean = unit_mean * magnitude;
            let std_dev = unit_variance.sqrt() * magnitude;
            if std_dev == 0.0 {
                return Err(PrepError::DegenerateFeature {
                    feature_index,
                    value: first,
                });
            }
            if !mean.is_finite() || !std_dev.is_finite() {
                return Err(PrepError::UnscalableFeature {
                    feature_index,
                    mean,
                    std_dev,
                });
            }
            stats.push(FeatureStats { mean, std_dev });
        }

        debug!(n_features = stats.len(), "scaling parameters fitted");
        Ok(Self { stats })
    }

    /// Standardize `dataset`: `(x - mean) / std_dev` per feature.
    ///
    /// Record order and labels are preserved.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::DimensionMismatch`] if the dataset width differs
    /// from the width these parameters were fitted on.
    pub fn transform(&self, dataset: &Dataset) -> Result<ScaledDataset, PrepError> {
        self.check_width(dataset.n_features())?;
        let features = dataset
            .features()
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.stats)
                    .map(|(&x, s)| (x - s.mean) / s.std_dev)
                    .collect()
            })
            .collect();
        Ok(ScaledDataset(Dataset::from_parts(
            features,
            dataset.labels().map(<[Label]>::to_vec),
            self.stats.len(),
        )))
    }

    /// Undo [`ScalingParameters::transform`]: `z * std_dev + mean` per feature.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::DimensionMismatch`] if the scaled dataset was
    /// produced by parameters of a different width.
    pub fn inverse_transform(&self, scaled: &ScaledDataset) -> Result<Dataset, PrepError> {
        self.check_width(scaled.n_features())?;
        let features = scaled
            .features()
            .iter()
            .map(|row| {
                row.iter()
                    .zip(&self.stats)
                    .map(|(&z, s)| z * s.std_dev + s.mean)
                    .collect()
            })
            .collect();
        Ok(Dataset::from_parts(
            features,
            scaled.labels().map(<[Label]>::to_vec),
            self.stats.len(),
        ))
    }

    /// Return the per-feature statistics, in column order.
    #[must_use]
    pub fn stats(&self) -> &[FeatureStats] {
        &self.stats
    }

    /// Return the number of features covered.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.stats.len()
    }

    fn check_width(&self, got: usize) -> Result<(), PrepError> {
        if got != self.stats.len() {
            return Err(PrepError::DimensionMismatch {
                expected: self.stats.len(),
                got,
            });
        }
        Ok(())
    }
}

impl ScaledDataset {
    /// Return the standardized feature matrix (row-major).
    #[must_use]
    pub fn features(&self) -> &[Vec<f64>] {
        self.0.features()
    }

    /// Return the labels, or `None` for an unlabeled dataset.
    #[must_use]
    pub fn labels(&self) -> Option<&[Label]> {
        self.0.labels()
    }

    /// Return the number of records.
    #[must_use]
    pub fn n_records(&self) -> usize {
        self.0.n_records()
    }

    /// Return the number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.0.n_features()
    }
}

impl Subset for ScaledDataset {
    fn n_records(&self) -> usize {
        self.0.n_records()
    }

    fn select(&self, indices: &[usize]) -> Self {
        Self(self.0.select(indices))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(rows: Vec<Vec<f64>>) -> Dataset {
        Dataset::unlabeled(rows).unwrap()
    }

    #[test]
    fn fit_uses_sample_standard_deviation() {
        let ds = dataset(vec![vec![1.0], vec![2.0], vec![3.0], vec![4.0]]);
        let params = ScalingParameters::fit(&ds).unwrap();
        let s = params.stats()[0];
        assert!((s.mean - 2.5).abs() < 1e-12);
        // sum of squares = 5.0, n - 1 = 3
        assert!((s.std_dev - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
    }

    #[test]
    fn transform_centers_and_scales() {
        let ds = dataset(vec![vec![1.0, 10.0], vec![2.0, 20.0], vec![3.0, 30.0]]);
        let params = ScalingParameters::fit(&ds).unwrap();
        let scaled = params.transform(&ds).unwrap();
        assert!((scaled.features()[0][0] + 1.0).abs() < 1e-12);
        assert!(scaled.features()[1][0].abs() < 1e-12);
        assert!((scaled.features()[2][1] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn transform_preserves_labels() {
        let ds = Dataset::labeled(
            vec![vec![1.0], vec![2.0], vec![4.0]],
            vec![Label::Closed, Label::Open, Label::Closed],
        )
        .unwrap();
        let params = ScalingParameters::fit(&ds).unwrap();
        let scaled = params.transform(&ds).unwrap();
        assert_eq!(scaled.labels(), ds.labels());
    }

    #[test]
    fn constant_feature_is_degenerate() {
        let ds = dataset(vec![vec![1.0, 0.1], vec![2.0, 0.1], vec![3.0, 0.1]]);
        let err = ScalingParameters::fit(&ds).unwrap_err();
        assert!(matches!(
            err,
            PrepError::DegenerateFeature {
                feature_index: 1,
                ..
            }
        ));
    }

    #[test]
    fn huge_magnitudes_keep_their_spread() {
        let ds = dataset(vec![vec![1e160, 0.0], vec![-1e160, 1.0], vec![5e159, 2.0]]);
        let params = ScalingParameters::fit(&ds).unwrap();
        let s = params.stats()[0];
        assert!(s.std_dev.is_finite());
        assert!((s.mean - 5e159 / 3.0).abs() < 1e147);

        let scaled = params.transform(&ds).unwrap();
        let column: Vec<f64> = scaled.features().iter().map(|row| row[0]).collect();
        assert!(column.iter().all(|z| z.is_finite()));
        assert!(column[0] > 0.5);
        assert!(column[1] < -0.5);
        // standardized column has unit sample variance
        let var = column.iter().map(|z| z * z).sum::<f64>() / 2.0;
        assert!((var - 1.0).abs() < 1e-9);
    }

    #[test]
    fn spread_beyond_f64_range_is_rejected() {
        let ds = dataset(vec![vec![f64::MAX], vec![-f64::MAX]]);
        let err = ScalingParameters::fit(&ds).unwrap_err();
        assert!(matches!(
            err,
            PrepError::UnscalableFeature {
                feature_index: 0,
                ..
            }
        ));
    }

    #[test]
    fn single_record_is_rejected() {
        let ds = dataset(vec![vec![1.0]]);
        let err = ScalingParameters::fit(&ds).unwrap_err();
        assert!(matches!(
            err,
            PrepError::TooFewRecords {
                n_records: 1,
                required: 2
            }
        ));
    }

    #[test]
    fn width_mismatch_rejected() {
        let params = ScalingParameters::fit(&dataset(vec![vec![1.0, 2.0], vec![2.0, 3.0]])).unwrap();
        let err = params.transform(&dataset(vec![vec![1.0]])).unwrap_err();
        assert!(matches!(
            err,
            PrepError::DimensionMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn other_datasets_use_reference_statistics() {
        let train = dataset(vec![vec![0.0], vec![2.0]]);
        let params = ScalingParameters::fit(&train).unwrap();
        let test = dataset(vec![vec![1.0], vec![5.0]]);
        let scaled = params.transform(&test).unwrap();
        // mean 1.0, std sqrt(2)
        assert!(scaled.features()[0][0].abs() < 1e-12);
        assert!((scaled.features()[1][0] - 4.0 / 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn inverse_transform_reconstructs() {
        let ds = dataset(vec![vec![3.5, -1.0], vec![7.25, 4.0], vec![-2.0, 0.5]]);
        let params = ScalingParameters::fit(&ds).unwrap();
        let restored = params.inverse_transform(&params.transform(&ds).unwrap()).unwrap();
        for (a, b) in restored.features().iter().flatten().zip(ds.features().iter().flatten()) {
            assert!((a - b).abs() < 1e-10, "{a} != {b}");
        }
    }
}
