//! Soft-margin support vector machine with a Gaussian RBF kernel.

use blink_prep::{Label, LabelCounts, ScaledDataset};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::classifier::{Classifier, required_labels};
use crate::error::ClassifyError;
use crate::grid::ParamGrid;
use crate::smo::{self, SolverConfig};

/// Kernel machine hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct KernelParams {
    /// Misclassification penalty `C`. Must be positive.
    pub cost: f64,
    /// RBF bandwidth `γ`. Must be positive.
    pub gamma: f64,
}

impl KernelParams {
    /// Create a hyperparameter tuple.
    #[must_use]
    pub fn new(cost: f64, gamma: f64) -> Self {
        Self { cost, gamma }
    }

    /// Cartesian product of `costs` and `gammas`, cost-major.
    ///
    /// Values are not checked here; malformed tuples are rejected by
    /// [`Classifier::validate`] before any fitting.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::EmptyGrid`] if either list is empty.
    pub fn grid(costs: &[f64], gammas: &[f64]) -> Result<ParamGrid<Self>, ClassifyError> {
        ParamGrid::new(
            costs
                .iter()
                .flat_map(|&cost| gammas.iter().map(move |&gamma| Self::new(cost, gamma)))
                .collect(),
        )
    }
}

/// The RBF kernel classifier strategy.
///
/// # Defaults
///
/// | Parameter   | Default     |
/// |-------------|-------------|
/// | `tolerance` | 1e-3        |
/// | `max_iter`  | 1_000_000   |
#[derive(Debug, Clone)]
pub struct KernelClassifier {
    tolerance: f64,
    max_iter: usize,
}

impl Default for KernelClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl KernelClassifier {
    /// Create a classifier with default solver settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tolerance: 1e-3,
            max_iter: 1_000_000,
        }
    }

    /// Set the solver stopping tolerance on the maximal KKT violation.
    #[must_use]
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the solver iteration budget.
    #[must_use]
    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    /// Return the stopping tolerance.
    #[must_use]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// Return the iteration budget.
    #[must_use]
    pub fn max_iter(&self) -> usize {
        self.max_iter
    }
}

/// A fitted kernel machine: the support vectors and their signed weights.
#[derive(Debug, Clone)]
pub struct KernelModel {
    support_vectors: Vec<Vec<f64>>,
    coefficients: Vec<f64>,
    rho: f64,
    gamma: f64,
    n_features: usize,
    n_support: usize,
    iterations: usize,
}

impl KernelModel {
    /// Signed distance-like score for one scaled sample. Positive means [`Label::Closed`].
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::DimensionMismatch`] when `sample.len() != n_features`.
    pub fn decision_value(&self, sample: &[f64]) -> Result<f64, ClassifyError> {
        if sample.len() != self.n_features {
            return Err(ClassifyError::DimensionMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(self.score(sample))
    }

    fn score(&self, sample: &[f64]) -> f64 {
        self.support_vectors
            .iter()
            .zip(&self.coefficients)
            .map(|(sv, coef)| coef * smo::rbf(sv, sample, self.gamma))
            .sum::<f64>()
            - self.rho
    }

    /// Number of support vectors.
    #[must_use]
    pub fn n_support(&self) -> usize {
        self.n_support
    }

    /// Bias term subtracted from the kernel expansion.
    #[must_use]
    pub fn rho(&self) -> f64 {
        self.rho
    }

    /// Solver iterations used to fit this model.
    #[must_use]
    pub fn iterations(&self) -> usize {
        self.iterations
    }
}

impl Classifier for KernelClassifier {
    type Params = KernelParams;
    type Model = KernelModel;

    fn name(&self) -> &'static str {
        "svm"
    }

    fn check_params(&self, params: &KernelParams) -> Result<(), ClassifyError> {
        let reject = |reason: &str| ClassifyError::InvalidHyperparameter {
            params: format!("{params:?}"),
            reason: reason.to_owned(),
        };
        if !(params.cost.is_finite() && params.cost > 0.0) {
            return Err(reject("cost must be a positive finite number"));
        }
        if !(params.gamma.is_finite() && params.gamma > 0.0) {
            return Err(reject("gamma must be a positive finite number"));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(reject("solver tolerance must be positive"));
        }
        Ok(())
    }

    fn validate(&self, params: &KernelParams, _n_train: usize) -> Result<(), ClassifyError> {
        self.check_params(params)
    }

    /// Solve the dual problem on `train`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ClassifyError::InvalidHyperparameter`] | non-positive cost or gamma |
    /// | [`ClassifyError::UnlabeledData`] | `train` has no labels |
    /// | [`ClassifyError::SingleClassTraining`] | only one label present |
    /// | [`ClassifyError::SolverNotConverged`] | iteration budget exhausted |
    #[instrument(skip_all, fields(cost = params.cost, gamma = params.gamma, n_records = train.n_records()))]
    fn fit(&self, train: &ScaledDataset, params: &KernelParams) -> Result<KernelModel, ClassifyError> {
        self.validate(params, train.n_records())?;
        let labels = required_labels(train)?;
        let counts = LabelCounts::from_labels(labels);
        for label in Label::ALL {
            if counts.get(label) == counts.total() {
                return Err(ClassifyError::SingleClassTraining { label });
            }
        }

        let y: Vec<f64> = labels
            .iter()
            .map(|&l| if l == Label::Closed { 1.0 } else { -1.0 })
            .collect();
        let config = SolverConfig {
            cost: params.cost,
            gamma: params.gamma,
            tolerance: self.tolerance,
            max_iter: self.max_iter,
        };
        let solution = smo::solve(train.features(), &y, &config)?;

        let (support_vectors, coefficients): (Vec<Vec<f64>>, Vec<f64>) = solution
            .alpha
            .iter()
            .zip(&y)
            .zip(train.features())
            .filter(|((a, _), _)| **a > 0.0)
            .map(|((a, yt), x)| (x.clone(), a * yt))
            .unzip();
        let n_support = support_vectors.len();
        debug!(n_support, iterations = solution.iterations, "kernel model fitted");

        Ok(KernelModel {
            support_vectors,
            coefficients,
            rho: solution.rho,
            gamma: params.gamma,
            n_features: train.n_features(),
            n_support,
            iterations: solution.iterations,
        })
    }

    /// A strictly positive decision value predicts [`Label::Closed`]; zero or
    /// negative predicts [`Label::Open`].
    fn predict(&self, model: &KernelModel, data: &ScaledDataset) -> Result<Vec<Label>, ClassifyError> {
        if data.n_features() != model.n_features {
            return Err(ClassifyError::DimensionMismatch {
                expected: model.n_features,
                got: data.n_features(),
            });
        }
        Ok(data
            .features()
            .par_iter()
            .map(|x| {
                if model.score(x) > 0.0 {
                    Label::Closed
                } else {
                    Label::Open
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use blink_prep::{Dataset, ScalingParameters};

    use super::*;

    fn scaled(features: Vec<Vec<f64>>, labels: Vec<Label>) -> ScaledDataset {
        let data = Dataset::labeled(features, labels).unwrap();
        ScalingParameters::fit(&data).unwrap().transform(&data).unwrap()
    }

    fn blobs() -> ScaledDataset {
        let mut features = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let offset = f64::from(i % 5) * 0.1;
            if i < 10 {
                features.push(vec![-2.0 - offset, offset]);
                labels.push(Label::Open);
            } else {
                features.push(vec![2.0 + offset, -offset]);
                labels.push(Label::Closed);
            }
        }
        scaled(features, labels)
    }

    #[test]
    fn grid_is_cost_major() {
        let grid = KernelParams::grid(&[1.0, 10.0], &[0.1, 0.5, 1.0]).unwrap();
        let points = grid.points();
        assert_eq!(points.len(), 6);
        assert_eq!(points[0], KernelParams::new(1.0, 0.1));
        assert_eq!(points[2], KernelParams::new(1.0, 1.0));
        assert_eq!(points[3], KernelParams::new(10.0, 0.1));
    }

    #[test]
    fn empty_grid_rejected() {
        assert!(matches!(
            KernelParams::grid(&[], &[1.0]).unwrap_err(),
            ClassifyError::EmptyGrid
        ));
    }

    #[test]
    fn invalid_hyperparameters() {
        let clf = KernelClassifier::new();
        for params in [
            KernelParams::new(0.0, 1.0),
            KernelParams::new(-1.0, 1.0),
            KernelParams::new(1.0, 0.0),
            KernelParams::new(1.0, f64::NAN),
        ] {
            assert!(matches!(
                clf.fit(&blobs(), &params).unwrap_err(),
                ClassifyError::InvalidHyperparameter { .. }
            ));
        }
    }

    #[test]
    fn fits_separable_blobs() {
        let data = blobs();
        let clf = KernelClassifier::new();
        let model = clf.fit(&data, &KernelParams::new(10.0, 0.5)).unwrap();
        assert!(model.n_support() > 0);
        let predicted = clf.predict(&model, &data).unwrap();
        assert_eq!(predicted.as_slice(), data.labels().unwrap());
    }

    #[test]
    fn decision_sign_matches_prediction() {
        let data = blobs();
        let clf = KernelClassifier::new();
        let model = clf.fit(&data, &KernelParams::new(1.0, 1.0)).unwrap();
        let predicted = clf.predict(&model, &data).unwrap();
        for (x, label) in data.features().iter().zip(&predicted) {
            let value = model.decision_value(x).unwrap();
            assert_eq!(*label == Label::Closed, value > 0.0);
        }
    }

    #[test]
    fn single_class_rejected() {
        let data = scaled(
            vec![vec![1.0, 2.0], vec![2.0, 1.0], vec![3.0, 0.0]],
            vec![Label::Open; 3],
        );
        let err = KernelClassifier::new()
            .fit(&data, &KernelParams::new(1.0, 1.0))
            .unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::SingleClassTraining { label: Label::Open }
        ));
    }

    #[test]
    fn dimension_mismatch_on_predict() {
        let clf = KernelClassifier::new();
        let model = clf.fit(&blobs(), &KernelParams::new(1.0, 1.0)).unwrap();
        assert!(matches!(
            model.decision_value(&[0.0]).unwrap_err(),
            ClassifyError::DimensionMismatch {
                expected: 2,
                got: 1
            }
        ));
    }

    #[test]
    fn deterministic_fit() {
        let data = blobs();
        let clf = KernelClassifier::new();
        let params = KernelParams::new(10.0, 0.1);
        let a = clf.fit(&data, &params).unwrap();
        let b = clf.fit(&data, &params).unwrap();
        assert_eq!(a.rho().to_bits(), b.rho().to_bits());
        assert_eq!(a.n_support(), b.n_support());
    }
}
