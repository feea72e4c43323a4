//! Seeded train/validation and k-fold partitioning.
//!
//! Both splitters draw one uniform permutation of record indices from a
//! [`ChaCha8Rng`] seeded with the configured seed, so the same seed and
//! input size always produce the same partitions. Indices inside each
//! partition are returned in ascending order, which keeps records in their
//! original relative order.

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;

use crate::dataset::Subset;
use crate::error::PrepError;

/// Train/validation splitter.
///
/// Construct via [`TrainValidationSplit::new`], then chain `with_seed` if desired.
/// The seed defaults to 42.
#[derive(Debug, Clone)]
pub struct TrainValidationSplit {
    train_fraction: f64,
    seed: u64,
}

/// Record indices of one cross-validation fold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoldIndices {
    /// Records used for fitting (every other block).
    pub train: Vec<usize>,
    /// Records held out for scoring (this fold's block).
    pub held_out: Vec<usize>,
}

/// K-fold splitter over contiguous blocks of a seeded permutation.
///
/// Construct via [`KFold::new`], then chain `with_seed` if desired.
/// The seed defaults to 42.
#[derive(Debug, Clone)]
pub struct KFold {
    n_folds: usize,
    seed: u64,
}

fn permutation(n_records: usize, seed: u64) -> Vec<usize> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut order: Vec<usize> = (0..n_records).collect();
    order.shuffle(&mut rng);
    order
}

impl TrainValidationSplit {
    /// Create a splitter that keeps `floor(n * train_fraction)` records for training.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::InvalidTrainFraction`] unless `0.0 < train_fraction < 1.0`.
    pub fn new(train_fraction: f64) -> Result<Self, PrepError> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(PrepError::InvalidTrainFraction {
                fraction: train_fraction,
            });
        }
        Ok(Self {
            train_fraction,
            seed: 42,
        })
    }

    /// Set the random seed for the permutation.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the train fraction.
    #[must_use]
    pub fn train_fraction(&self) -> f64 {
        self.train_fraction
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Partition `0..n_records` into `(train, validation)` index sets.
    ///
    /// The first `floor(n_records * train_fraction)` positions of the
    /// permutation go to training, the rest to validation.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::EmptyPartition`] if either side would be empty.
    pub fn partition(&self, n_records: usize) -> Result<(Vec<usize>, Vec<usize>), PrepError> {
        let n_train = (n_records as f64 * self.train_fraction).floor() as usize;
        if n_train == 0 || n_train >= n_records {
            return Err(PrepError::EmptyPartition {
                n_records,
                fraction: self.train_fraction,
            });
        }

        let order = permutation(n_records, self.seed);
        let mut train = order[..n_train].to_vec();
        let mut validation = order[n_train..].to_vec();
        train.sort_unstable();
        validation.sort_unstable();
        Ok((train, validation))
    }

    /// Split `data` into `(train, validation)` subsets.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::EmptyPartition`] if either side would be empty.
    pub fn split<D: Subset>(&self, data: &D) -> Result<(D, D), PrepError> {
        let (train, validation) = self.partition(data.n_records())?;
        Ok((data.select(&train), data.select(&validation)))
    }
}

impl KFold {
    /// Create a k-fold splitter.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::InvalidFoldCount`] if `n_folds` < 2. A single fold
    /// would leave nothing to train on.
    pub fn new(n_folds: usize) -> Result<Self, PrepError> {
        if n_folds < 2 {
            return Err(PrepError::InvalidFoldCount { n_folds });
        }
        Ok(Self { n_folds, seed: 42 })
    }

    /// Set the random seed for the permutation.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Return the number of folds.
    #[must_use]
    pub fn n_folds(&self) -> usize {
        self.n_folds
    }

    /// Return the random seed.
    #[must_use]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Map every record index to its fold id in `0..n_folds`.
    ///
    /// The permutation is cut into `n_folds` contiguous blocks; the first
    /// `n_records % n_folds` blocks hold one extra record, so fold sizes
    /// differ by at most one.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::TooFewRecordsForFolds`] if `n_records < n_folds`.
    pub fn fold_assignments(&self, n_records: usize) -> Result<Vec<usize>, PrepError> {
        if n_records < self.n_folds {
            return Err(PrepError::TooFewRecordsForFolds {
                n_records,
                n_folds: self.n_folds,
            });
        }

        let base = n_records / self.n_folds;
        let extra = n_records % self.n_folds;
        let order = permutation(n_records, self.seed);

        let mut assignments = vec![0usize; n_records];
        let mut position = 0;
        for fold in 0..self.n_folds {
            let size = base + usize::from(fold < extra);
            for &record in &order[position..position + size] {
                assignments[record] = fold;
            }
            position += size;
        }
        Ok(assignments)
    }

    /// Return the train/held-out indices of every fold, in fold order.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::TooFewRecordsForFolds`] if `n_records < n_folds`.
    pub fn folds(&self, n_records: usize) -> Result<Vec<FoldIndices>, PrepError> {
        let assignments = self.fold_assignments(n_records)?;
        Ok((0..self.n_folds)
            .map(|fold| {
                let (held_out, train): (Vec<usize>, Vec<usize>) =
                    (0..n_records).partition(|&i| assignments[i] == fold);
                FoldIndices { train, held_out }
            })
            .collect())
    }

    /// Split `data` into `(train, held_out)` pairs, one per fold.
    ///
    /// # Errors
    ///
    /// Returns [`PrepError::TooFewRecordsForFolds`] if `data` has fewer records than folds.
    pub fn split<D: Subset>(&self, data: &D) -> Result<Vec<(D, D)>, PrepError> {
        Ok(self
            .folds(data.n_records())?
            .iter()
            .map(|fold| (data.select(&fold.train), data.select(&fold.held_out)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn invalid_train_fraction() {
        for fraction in [0.0, 1.0, -0.5, 1.5, f64::NAN] {
            assert!(TrainValidationSplit::new(fraction).is_err(), "{fraction}");
        }
    }

    #[test]
    fn train_size_rounds_down() {
        let (train, validation) = TrainValidationSplit::new(0.75).unwrap().partition(10).unwrap();
        assert_eq!(train.len(), 7);
        assert_eq!(validation.len(), 3);
    }

    #[test]
    fn partitions_are_disjoint_and_cover() {
        let (train, validation) = TrainValidationSplit::new(0.6)
            .unwrap()
            .with_seed(7)
            .partition(25)
            .unwrap();
        let train_set: HashSet<usize> = train.iter().copied().collect();
        assert!(validation.iter().all(|i| !train_set.contains(i)));
        let mut all: Vec<usize> = train.iter().chain(&validation).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..25).collect::<Vec<_>>());
    }

    #[test]
    fn same_seed_same_partition() {
        let splitter = TrainValidationSplit::new(0.5).unwrap().with_seed(3);
        assert_eq!(splitter.partition(40).unwrap(), splitter.partition(40).unwrap());
    }

    #[test]
    fn empty_partition_error() {
        let err = TrainValidationSplit::new(0.4).unwrap().partition(2).unwrap_err();
        assert!(matches!(err, PrepError::EmptyPartition { n_records: 2, .. }));
    }

    #[test]
    fn invalid_fold_count() {
        assert!(KFold::new(0).is_err());
        assert!(matches!(
            KFold::new(1).unwrap_err(),
            PrepError::InvalidFoldCount { n_folds: 1 }
        ));
    }

    #[test]
    fn fold_sizes_differ_by_at_most_one() {
        let assignments = KFold::new(4).unwrap().fold_assignments(23).unwrap();
        let mut sizes = [0usize; 4];
        for &fold in &assignments {
            sizes[fold] += 1;
        }
        assert_eq!(sizes.iter().sum::<usize>(), 23);
        let max = sizes.iter().max().unwrap();
        let min = sizes.iter().min().unwrap();
        assert!(max - min <= 1, "sizes = {sizes:?}");
    }

    #[test]
    fn each_record_held_out_exactly_once() {
        let folds = KFold::new(5).unwrap().with_seed(11).folds(32).unwrap();
        let mut seen = vec![0usize; 32];
        for fold in &folds {
            assert_eq!(fold.train.len() + fold.held_out.len(), 32);
            for &i in &fold.held_out {
                seen[i] += 1;
            }
        }
        assert!(seen.iter().all(|&count| count == 1));
    }

    #[test]
    fn too_few_records_for_folds() {
        let err = KFold::new(5).unwrap().folds(3).unwrap_err();
        assert!(matches!(
            err,
            PrepError::TooFewRecordsForFolds {
                n_records: 3,
                n_folds: 5
            }
        ));
    }

    #[test]
    fn different_seeds_shuffle_differently() {
        let a = KFold::new(3).unwrap().with_seed(1).fold_assignments(60).unwrap();
        let b = KFold::new(3).unwrap().with_seed(2).fold_assignments(60).unwrap();
        assert_ne!(a, b);
    }
}
