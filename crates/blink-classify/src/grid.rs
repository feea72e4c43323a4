//! Exhaustive k-fold cross-validated hyperparameter search.

use blink_prep::{KFold, ScaledDataset};
use rayon::iter::{IntoParallelIterator, ParallelIterator};
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::classifier::{Classifier, required_labels};
use crate::confusion::error_rate;
use crate::error::ClassifyError;

/// An ordered, non-empty list of hyperparameter tuples.
///
/// Order matters: when two tuples tie on mean cross-validation error, the
/// one appearing first wins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamGrid<P> {
    points: Vec<P>,
}

impl<P> ParamGrid<P> {
    /// Wrap an ordered list of tuples.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::EmptyGrid`] if `points` is empty.
    pub fn new(points: Vec<P>) -> Result<Self, ClassifyError> {
        if points.is_empty() {
            return Err(ClassifyError::EmptyGrid);
        }
        Ok(Self { points })
    }

    /// Return the tuples in search order.
    #[must_use]
    pub fn points(&self) -> &[P] {
        &self.points
    }

    /// Number of tuples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Always `false`; an empty grid cannot be constructed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over the tuples in search order.
    pub fn iter(&self) -> std::slice::Iter<'_, P> {
        self.points.iter()
    }
}

/// Cross-validation outcome of one grid point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateOutcome {
    /// Every fold was fitted and scored.
    Scored {
        /// Mean held-out error rate across folds.
        mean_error: f64,
        /// Population standard deviation of the fold error rates.
        std_error: f64,
        /// Held-out error rate per fold, in fold order.
        fold_errors: Vec<f64>,
    },
    /// Some fold failed to fit or predict; the tuple is excluded from selection.
    Failed {
        /// Rendered error of the first failing fold.
        reason: String,
    },
}

/// A grid point together with its cross-validation outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CandidateScore<P> {
    /// The hyperparameter tuple.
    pub params: P,
    /// How it fared.
    pub outcome: CandidateOutcome,
}

impl<P> CandidateScore<P> {
    /// Mean cross-validation error, or `None` if the candidate failed.
    #[must_use]
    pub fn mean_error(&self) -> Option<f64> {
        match &self.outcome {
            CandidateOutcome::Scored { mean_error, .. } => Some(*mean_error),
            CandidateOutcome::Failed { .. } => None,
        }
    }
}

/// The selected hyperparameters and the model refitted on the full training set.
#[derive(Debug, Clone)]
pub struct ModelResult<P, M> {
    /// Winning hyperparameter tuple.
    pub params: P,
    /// Model fitted with `params` on the whole training partition.
    pub model: M,
    /// Mean cross-validation error of the winner.
    pub mean_error: f64,
    /// Per-fold errors of the winner.
    pub fold_errors: Vec<f64>,
    /// Position of the winner in the grid.
    pub best_index: usize,
    /// Outcome of every grid point, in grid order.
    pub candidates: Vec<CandidateScore<P>>,
}

/// Configuration for cross-validated grid search.
///
/// Construct via [`GridSearch::new`], then chain `with_*` methods.
///
/// # Defaults
///
/// | Parameter | Default |
/// |-----------|---------|
/// | `seed`    | 42      |
#[derive(Debug, Clone)]
pub struct GridSearch {
    folds: KFold,
}

impl GridSearch {
    /// Create a search using `n_folds`-fold cross-validation.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::Prep`] wrapping `InvalidFoldCount` if
    /// `n_folds < 2`; single-fold cross-validation has no held-out data.
    pub fn new(n_folds: usize) -> Result<Self, ClassifyError> {
        Ok(Self {
            folds: KFold::new(n_folds)?,
        })
    }

    /// Set the seed for the fold permutation.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.folds = self.folds.with_seed(seed);
        self
    }

    /// Return the number of folds.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.folds.n_folds()
    }

    /// Return the fold seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.folds.seed()
    }

    /// Evaluate every grid point with k-fold cross-validation on `train`,
    /// pick the lowest mean error (first in grid order on ties), and refit it
    /// on all of `train`.
    ///
    /// Folds are drawn once, so every grid point sees identical partitions.
    /// All (grid point, fold) pairs are independent and run in parallel; each
    /// pair is fitted exactly once.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ClassifyError::UnlabeledData`] | `train` has no labels |
    /// | [`ClassifyError::Prep`] | fewer records than folds |
    /// | [`ClassifyError::InvalidHyperparameter`] | a grid point is malformed (checked before fitting) |
    /// | [`ClassifyError::NoViableCandidate`] | every grid point failed on some fold |
    /// | any fit error | refitting the winner on the full set failed |
    #[instrument(skip_all, fields(classifier = classifier.name(), n_candidates = grid.len(), n_folds = self.n_folds()))]
    pub fn search<C: Classifier>(
        &self,
        classifier: &C,
        grid: &ParamGrid<C::Params>,
        train: &ScaledDataset,
    ) -> Result<ModelResult<C::Params, C::Model>, ClassifyError> {
        required_labels(train)?;
        let folds = self.folds.split(train)?;
        let min_train = folds
            .iter()
            .map(|(fold_train, _)| fold_train.n_records())
            .min()
            .unwrap_or(0);
        for params in grid.iter() {
            classifier.validate(params, min_train)?;
        }

        let n_folds = folds.len();
        let n_candidates = grid.len();
        let points = grid.points();
        let fold_results: Vec<Result<f64, ClassifyError>> = (0..n_candidates * n_folds)
            .into_par_iter()
            .map(|task| {
                let (candidate, fold) = (task / n_folds, task % n_folds);
                let (fold_train, held_out) = &folds[fold];
                let model = classifier.fit(fold_train, &points[candidate])?;
                let predicted = classifier.predict(&model, held_out)?;
                error_rate(required_labels(held_out)?, &predicted)
            })
            .collect();

        let mut candidates = Vec::with_capacity(n_candidates);
        let mut results = fold_results.into_iter();
        for (index, params) in points.iter().enumerate() {
            let chunk: Vec<_> = results.by_ref().take(n_folds).collect();
            let outcome = match chunk.into_iter().collect::<Result<Vec<f64>, ClassifyError>>() {
                Ok(fold_errors) => {
                    let (mean_error, std_error) = mean_std(&fold_errors);
                    debug!(index, ?params, mean_error, std_error, "candidate scored");
                    CandidateOutcome::Scored {
                        mean_error,
                        std_error,
                        fold_errors,
                    }
                }
                Err(e) => {
                    warn!(index, ?params, reason = %e, "candidate failed");
                    CandidateOutcome::Failed {
                        reason: e.to_string(),
                    }
                }
            };
            candidates.push(CandidateScore {
                params: params.clone(),
                outcome,
            });
        }

        let mut best: Option<(usize, f64)> = None;
        for (index, candidate) in candidates.iter().enumerate() {
            if let Some(err) = candidate.mean_error() {
                if best.is_none_or(|(_, best_err)| err < best_err) {
                    best = Some((index, err));
                }
            }
        }
        let Some((best_index, mean_error)) = best else {
            return Err(ClassifyError::NoViableCandidate { n_candidates });
        };

        let params = points[best_index].clone();
        let fold_errors = match &candidates[best_index].outcome {
            CandidateOutcome::Scored { fold_errors, .. } => fold_errors.clone(),
            CandidateOutcome::Failed { .. } => Vec::new(),
        };
        info!(best_index, ?params, mean_error, "selected hyperparameters");

        let model = classifier.fit(train, &params)?;

        Ok(ModelResult {
            params,
            model,
            mean_error,
            fold_errors,
            best_index,
            candidates,
        })
    }
}

/// Mean and population standard deviation.
fn mean_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / n;
    (mean, var.sqrt())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;

    use blink_prep::{Dataset, Label, ScalingParameters};

    use super::*;

    /// How a mock candidate predicts held-out labels.
    #[derive(Debug, Clone, Copy, PartialEq, Serialize)]
    enum Behavior {
        Perfect,
        Inverted,
        AlwaysOpen,
        FailFit,
        Invalid,
    }

    #[derive(Debug, Clone, Copy, Serialize)]
    struct MockParams {
        id: usize,
        behavior: Behavior,
    }

    /// Records every fit as (candidate id, first-feature bit patterns of the training rows).
    #[derive(Default)]
    struct MockClassifier {
        fits: Mutex<Vec<(usize, Vec<u64>)>>,
    }

    impl Classifier for MockClassifier {
        type Params = MockParams;
        type Model = Behavior;

        fn name(&self) -> &'static str {
            "mock"
        }

        fn validate(&self, params: &MockParams, _n_train: usize) -> Result<(), ClassifyError> {
            if params.behavior == Behavior::Invalid {
                return Err(ClassifyError::InvalidHyperparameter {
                    params: format!("{params:?}"),
                    reason: "invalid".into(),
                });
            }
            Ok(())
        }

        fn fit(&self, train: &ScaledDataset, params: &MockParams) -> Result<Behavior, ClassifyError> {
            let key = train.features().iter().map(|r| r[0].to_bits()).collect();
            self.fits.lock().unwrap().push((params.id, key));
            if params.behavior == Behavior::FailFit {
                return Err(ClassifyError::SolverNotConverged { iterations: 7 });
            }
            Ok(params.behavior)
        }

        fn predict(&self, model: &Behavior, data: &ScaledDataset) -> Result<Vec<Label>, ClassifyError> {
            let truth = required_labels(data)?;
            Ok(truth
                .iter()
                .map(|&l| match model {
                    Behavior::Perfect => l,
                    Behavior::Inverted => {
                        if l == Label::Open {
                            Label::Closed
                        } else {
                            Label::Open
                        }
                    }
                    _ => Label::Open,
                })
                .collect())
        }
    }

    fn train_set(n: usize) -> ScaledDataset {
        let features = (0..n).map(|i| vec![i as f64, (i * 7 % 11) as f64]).collect();
        let labels = (0..n)
            .map(|i| if i % 2 == 0 { Label::Open } else { Label::Closed })
            .collect();
        let data = Dataset::labeled(features, labels).unwrap();
        ScalingParameters::fit(&data).unwrap().transform(&data).unwrap()
    }

    fn params(behaviors: &[Behavior]) -> ParamGrid<MockParams> {
        ParamGrid::new(
            behaviors
                .iter()
                .enumerate()
                .map(|(id, &behavior)| MockParams { id, behavior })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn empty_grid_rejected() {
        assert!(matches!(
            ParamGrid::<MockParams>::new(Vec::new()).unwrap_err(),
            ClassifyError::EmptyGrid
        ));
    }

    #[test]
    fn single_fold_rejected() {
        assert!(matches!(
            GridSearch::new(1).unwrap_err(),
            ClassifyError::Prep(blink_prep::PrepError::InvalidFoldCount { n_folds: 1 })
        ));
    }

    #[test]
    fn each_candidate_fold_pair_fitted_once() {
        let mock = MockClassifier::default();
        let grid = params(&[Behavior::AlwaysOpen, Behavior::Perfect, Behavior::Inverted]);
        let train = train_set(25);
        let result = GridSearch::new(5).unwrap().search(&mock, &grid, &train).unwrap();
        assert_eq!(result.best_index, 1);

        let fits = mock.fits.into_inner().unwrap();
        // 3 candidates x 5 folds, plus the refit.
        assert_eq!(fits.len(), 3 * 5 + 1);
        let unique: HashSet<_> = fits.iter().cloned().collect();
        assert_eq!(unique.len(), fits.len());
        let refits = fits.iter().filter(|(_, key)| key.len() == 25).count();
        assert_eq!(refits, 1);
    }

    #[test]
    fn selects_lowest_mean_error() {
        let mock = MockClassifier::default();
        let grid = params(&[Behavior::Inverted, Behavior::AlwaysOpen, Behavior::Perfect]);
        let result = GridSearch::new(4)
            .unwrap()
            .search(&mock, &grid, &train_set(40))
            .unwrap();
        assert_eq!(result.best_index, 2);
        assert_eq!(result.mean_error, 0.0);
        assert_eq!(result.fold_errors, vec![0.0; 4]);
        assert_eq!(result.model, Behavior::Perfect);
        assert_eq!(result.candidates[0].mean_error(), Some(1.0));
    }

    #[test]
    fn ties_prefer_first_grid_entry() {
        let mock = MockClassifier::default();
        let grid = params(&[Behavior::Inverted, Behavior::Perfect, Behavior::Perfect]);
        let result = GridSearch::new(3)
            .unwrap()
            .search(&mock, &grid, &train_set(30))
            .unwrap();
        assert_eq!(result.best_index, 1);
        assert_eq!(result.params.id, 1);
    }

    #[test]
    fn failed_candidates_are_excluded() {
        let mock = MockClassifier::default();
        let grid = params(&[Behavior::FailFit, Behavior::AlwaysOpen]);
        let result = GridSearch::new(3)
            .unwrap()
            .search(&mock, &grid, &train_set(30))
            .unwrap();
        assert_eq!(result.best_index, 1);
        assert!(matches!(
            result.candidates[0].outcome,
            CandidateOutcome::Failed { .. }
        ));
        assert_eq!(result.candidates[0].mean_error(), None);
    }

    #[test]
    fn all_failed_is_an_error() {
        let mock = MockClassifier::default();
        let grid = params(&[Behavior::FailFit, Behavior::FailFit]);
        let err = GridSearch::new(3)
            .unwrap()
            .search(&mock, &grid, &train_set(30))
            .unwrap_err();
        assert!(matches!(err, ClassifyError::NoViableCandidate { n_candidates: 2 }));
    }

    #[test]
    fn invalid_entry_aborts_before_fitting() {
        let mock = MockClassifier::default();
        let grid = params(&[Behavior::Perfect, Behavior::Invalid]);
        let err = GridSearch::new(3)
            .unwrap()
            .search(&mock, &grid, &train_set(30))
            .unwrap_err();
        assert!(matches!(err, ClassifyError::InvalidHyperparameter { .. }));
        assert!(mock.fits.lock().unwrap().is_empty());
    }

    #[test]
    fn same_seed_same_fold_errors() {
        let grid = params(&[Behavior::AlwaysOpen]);
        let train = train_set(33);
        let search = GridSearch::new(5).unwrap().with_seed(9);
        let a = search.search(&MockClassifier::default(), &grid, &train).unwrap();
        let b = search.search(&MockClassifier::default(), &grid, &train).unwrap();
        assert_eq!(a.fold_errors, b.fold_errors);
    }

    #[test]
    fn mean_std_population() {
        let (mean, std) = mean_std(&[0.0, 0.5, 1.0, 0.5]);
        assert!((mean - 0.5).abs() < 1e-12);
        assert!((std - (0.125_f64).sqrt()).abs() < 1e-12);
    }
}
