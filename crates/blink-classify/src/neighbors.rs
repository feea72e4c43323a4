//! k-nearest-neighbor majority vote over Euclidean distance.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use blink_prep::{Label, ScaledDataset};
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use serde::Serialize;
use tracing::{debug, instrument};

use crate::classifier::{Classifier, required_labels};
use crate::error::ClassifyError;
use crate::grid::ParamGrid;

/// Neighbor count hyperparameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NeighborParams {
    /// Number of neighbors consulted. Must be in `1..=n_train`.
    pub k: usize,
}

impl NeighborParams {
    /// Create a hyperparameter tuple.
    #[must_use]
    pub fn new(k: usize) -> Self {
        Self { k }
    }

    /// One grid entry per neighbor count, in the given order.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::EmptyGrid`] if `ks` is empty.
    pub fn grid(ks: &[usize]) -> Result<ParamGrid<Self>, ClassifyError> {
        ParamGrid::new(ks.iter().map(|&k| Self::new(k)).collect())
    }
}

/// The k-nearest-neighbor classifier strategy.
///
/// Ties in the vote (possible for even `k`) go to the label of the single
/// nearest neighbor. Neighbors at equal distance are ordered by training
/// record index, so predictions are fully deterministic.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighborClassifier;

impl NeighborClassifier {
    /// Create the strategy.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// A fitted neighbor model: the memorized training records.
#[derive(Debug, Clone)]
pub struct NeighborModel {
    features: Vec<Vec<f64>>,
    labels: Vec<Label>,
    k: usize,
    n_features: usize,
}

impl NeighborModel {
    /// The `k` nearest training records to `sample`, nearest first, as
    /// `(squared distance, training index)`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::DimensionMismatch`] when `sample.len() != n_features`.
    pub fn neighbors(&self, sample: &[f64]) -> Result<Vec<(f64, usize)>, ClassifyError> {
        if sample.len() != self.n_features {
            return Err(ClassifyError::DimensionMismatch {
                expected: self.n_features,
                got: sample.len(),
            });
        }
        Ok(self
            .nearest(sample)
            .into_iter()
            .map(|n| (n.distance, n.index))
            .collect())
    }

    /// Number of memorized training records.
    #[must_use]
    pub fn n_records(&self) -> usize {
        self.features.len()
    }

    fn nearest(&self, sample: &[f64]) -> Vec<Neighbor> {
        // Max-heap on (distance, index) holding the k best seen so far.
        let mut heap = BinaryHeap::with_capacity(self.k + 1);
        for (index, row) in self.features.iter().enumerate() {
            let candidate = Neighbor {
                distance: squared_distance(sample, row),
                index,
            };
            if heap.len() < self.k {
                heap.push(candidate);
            } else if let Some(top) = heap.peek() {
                if candidate < *top {
                    heap.pop();
                    heap.push(candidate);
                }
            }
        }
        heap.into_sorted_vec()
    }

    fn vote(&self, sample: &[f64]) -> Label {
        let nearest = self.nearest(sample);
        let mut votes = [0usize; 2];
        for n in &nearest {
            votes[self.labels[n.index].index()] += 1;
        }
        match votes[0].cmp(&votes[1]) {
            Ordering::Greater => Label::Open,
            Ordering::Less => Label::Closed,
            Ordering::Equal => self.labels[nearest[0].index],
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Neighbor {
    distance: f64,
    index: usize,
}

impl PartialEq for Neighbor {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Neighbor {}

impl PartialOrd for Neighbor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Neighbor {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.index.cmp(&other.index))
    }
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl Classifier for NeighborClassifier {
    type Params = NeighborParams;
    type Model = NeighborModel;

    fn name(&self) -> &'static str {
        "knn"
    }

    fn check_params(&self, params: &NeighborParams) -> Result<(), ClassifyError> {
        if params.k == 0 {
            return Err(ClassifyError::InvalidHyperparameter {
                params: format!("{params:?}"),
                reason: "k must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    fn validate(&self, params: &NeighborParams, n_train: usize) -> Result<(), ClassifyError> {
        self.check_params(params)?;
        if params.k > n_train {
            return Err(ClassifyError::InvalidHyperparameter {
                params: format!("{params:?}"),
                reason: format!("k must be between 1 and the training size {n_train}"),
            });
        }
        Ok(())
    }

    /// Memorize the training records.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ClassifyError::InvalidHyperparameter`] | `k` is zero or exceeds the training size |
    /// | [`ClassifyError::UnlabeledData`] | `train` has no labels |
    #[instrument(skip_all, fields(k = params.k, n_records = train.n_records()))]
    fn fit(&self, train: &ScaledDataset, params: &NeighborParams) -> Result<NeighborModel, ClassifyError> {
        self.validate(params, train.n_records())?;
        let labels = required_labels(train)?.to_vec();
        debug!("neighbor model fitted");
        Ok(NeighborModel {
            features: train.features().to_vec(),
            labels,
            k: params.k,
            n_features: train.n_features(),
        })
    }

    fn predict(&self, model: &NeighborModel, data: &ScaledDataset) -> Result<Vec<Label>, ClassifyError> {
        if data.n_features() != model.n_features {
            return Err(ClassifyError::DimensionMismatch {
                expected: model.n_features,
                got: data.n_features(),
            });
        }
        Ok(data.features().par_iter().map(|x| model.vote(x)).collect())
    }
}
