//! Confusion matrix and error-rate evaluation for binary labels.

use std::fmt;

use blink_prep::Label;
use serde::Serialize;

use crate::error::ClassifyError;

/// A 2×2 confusion matrix over {true label × predicted label}.
///
/// Entry `counts[t][p]` counts records with true label index `t` that were
/// predicted as label index `p` ([`Label::Open`] = 0, [`Label::Closed`] = 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    counts: [[usize; 2]; 2],
}

/// Per-class precision, recall, and F1 score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    /// The class.
    pub label: Label,
    /// Precision: TP / (TP + FP). 0.0 if the class was never predicted.
    pub precision: f64,
    /// Recall: TP / (TP + FN). 0.0 if the class has no true records.
    pub recall: f64,
    /// F1: 2 * precision * recall / (precision + recall). 0.0 if both are zero.
    pub f1: f64,
    /// Number of true records in this class.
    pub support: usize,
}

impl ConfusionMatrix {
    /// Build a confusion matrix from true and predicted labels.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`ClassifyError::LengthMismatch`] | sequences differ in length |
    pub fn from_labels(truth: &[Label], predicted: &[Label]) -> Result<Self, ClassifyError> {
        check_lengths(truth, predicted)?;
        let mut counts = [[0usize; 2]; 2];
        for (t, p) in truth.iter().zip(predicted) {
            counts[t.index()][p.index()] += 1;
        }
        Ok(Self { counts })
    }

    /// Return the count of records with true label `truth` predicted as `predicted`.
    #[must_use]
    pub fn count(&self, truth: Label, predicted: Label) -> usize {
        self.counts[truth.index()][predicted.index()]
    }

    /// Total number of records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Number of correctly classified records (the diagonal).
    #[must_use]
    pub fn trace(&self) -> usize {
        self.counts[0][0] + self.counts[1][1]
    }

    /// Proportion of correct predictions. 0.0 for an empty matrix.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            0.0
        } else {
            self.trace() as f64 / total as f64
        }
    }

    /// Proportion of wrong predictions: `1 - trace / total`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::EmptyInput`] if the matrix counts no records.
    pub fn error_rate(&self) -> Result<f64, ClassifyError> {
        let total = self.total();
        if total == 0 {
            return Err(ClassifyError::EmptyInput);
        }
        Ok((total - self.trace()) as f64 / total as f64)
    }

    /// Per-class precision, recall, F1, and support, in label order.
    #[must_use]
    pub fn class_metrics(&self) -> Vec<ClassMetrics> {
        Label::ALL
            .iter()
            .map(|&label| {
                let c = label.index();
                let other = 1 - c;
                let tp = self.counts[c][c];
                let fp = self.counts[other][c];
                let fn_ = self.counts[c][other];
                let support = tp + fn_;
                let precision = if tp + fp == 0 {
                    0.0
                } else {
                    tp as f64 / (tp + fp) as f64
                };
                let recall = if support == 0 {
                    0.0
                } else {
                    tp as f64 / support as f64
                };
                let f1 = if precision + recall == 0.0 {
                    0.0
                } else {
                    2.0 * precision * recall / (precision + recall)
                };
                ClassMetrics {
                    label,
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect()
    }

    /// Return the underlying rows, indexed `[true][predicted]`.
    #[must_use]
    pub fn as_rows(&self) -> &[[usize; 2]; 2] {
        &self.counts
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:>8}", "")?;
        for label in Label::ALL {
            write!(f, " pred_{label:>3}")?;
        }
        writeln!(f)?;

        for label in Label::ALL {
            write!(f, "true_{label:>3}")?;
            for val in self.counts[label.index()] {
                write!(f, " {val:>8}")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

/// Fraction of predictions that disagree with the true labels.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`ClassifyError::LengthMismatch`] | sequences differ in length |
/// | [`ClassifyError::EmptyInput`] | zero labels |
pub fn error_rate(truth: &[Label], predicted: &[Label]) -> Result<f64, ClassifyError> {
    check_lengths(truth, predicted)?;
    if truth.is_empty() {
        return Err(ClassifyError::EmptyInput);
    }
    let wrong = truth.iter().zip(predicted).filter(|(t, p)| t != p).count();
    Ok(wrong as f64 / truth.len() as f64)
}

fn check_lengths(truth: &[Label], predicted: &[Label]) -> Result<(), ClassifyError> {
    if truth.len() != predicted.len() {
        return Err(ClassifyError::LengthMismatch {
            expected: truth.len(),
            got: predicted.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use Label::{Closed, Open};

    #[test]
    fn perfect_predictions() {
        let truth = [Open, Open, Closed, Closed];
        let cm = ConfusionMatrix::from_labels(&truth, &truth).unwrap();
        assert!((cm.accuracy() - 1.0).abs() < f64::EPSILON);
        assert_eq!(cm.error_rate().unwrap(), 0.0);
        assert_eq!(error_rate(&truth, &truth).unwrap(), 0.0);
        for m in cm.class_metrics() {
            assert!((m.f1 - 1.0).abs() < f64::EPSILON);
        }
    }

    #[test]
    fn all_wrong_predictions() {
        let truth = [Open, Closed, Closed];
        let predicted = [Closed, Open, Open];
        assert_eq!(error_rate(&truth, &predicted).unwrap(), 1.0);
        let cm = ConfusionMatrix::from_labels(&truth, &predicted).unwrap();
        assert_eq!(cm.trace(), 0);
    }

    #[test]
    fn known_confusion_matrix() {
        let truth = [Open, Open, Open, Closed, Closed];
        let predicted = [Open, Closed, Open, Closed, Open];
        let cm = ConfusionMatrix::from_labels(&truth, &predicted).unwrap();
        assert_eq!(cm.count(Open, Open), 2);
        assert_eq!(cm.count(Open, Closed), 1);
        assert_eq!(cm.count(Closed, Open), 1);
        assert_eq!(cm.count(Closed, Closed), 1);
        assert_eq!(cm.total(), 5);

        let metrics = cm.class_metrics();
        // Open: TP=2, FP=1, FN=1
        assert!((metrics[0].precision - 2.0 / 3.0).abs() < 1e-12);
        assert!((metrics[0].recall - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(metrics[0].support, 3);
        // Closed: TP=1, FP=1, FN=1
        assert!((metrics[1].precision - 0.5).abs() < 1e-12);
        assert_eq!(metrics[1].support, 2);
    }

    #[test]
    fn error_rate_matches_trace() {
        let truth = [Open, Closed, Closed, Open, Closed, Open, Open];
        let predicted = [Open, Open, Closed, Closed, Closed, Open, Closed];
        let cm = ConfusionMatrix::from_labels(&truth, &predicted).unwrap();
        let expected = 1.0 - cm.trace() as f64 / cm.total() as f64;
        let rate = error_rate(&truth, &predicted).unwrap();
        assert!((rate - expected).abs() < 1e-12);
        assert!((cm.error_rate().unwrap() - rate).abs() < 1e-12);
    }

    #[test]
    fn length_mismatch_error() {
        let err = ConfusionMatrix::from_labels(&[Open, Closed], &[Open]).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::LengthMismatch {
                expected: 2,
                got: 1
            }
        ));
        assert!(matches!(
            error_rate(&[Open], &[]).unwrap_err(),
            ClassifyError::LengthMismatch { .. }
        ));
    }

    #[test]
    fn empty_input_error() {
        assert!(matches!(
            error_rate(&[], &[]).unwrap_err(),
            ClassifyError::EmptyInput
        ));
        let cm = ConfusionMatrix::from_labels(&[], &[]).unwrap();
        assert!(matches!(cm.error_rate().unwrap_err(), ClassifyError::EmptyInput));
    }

    #[test]
    fn zero_support_class_metrics() {
        let truth = [Open, Open];
        let cm = ConfusionMatrix::from_labels(&truth, &truth).unwrap();
        let metrics = cm.class_metrics();
        assert_eq!(metrics[1].support, 0);
        assert_eq!(metrics[1].recall, 0.0);
        assert_eq!(metrics[1].f1, 0.0);
    }

    #[test]
    fn display_formatting() {
        let cm = ConfusionMatrix::from_labels(&[Open, Closed], &[Open, Closed]).unwrap();
        let output = format!("{cm}");
        assert!(output.contains("pred_"));
        assert!(output.contains("true_"));
    }

    #[test]
    fn display_columns_align() {
        let cm = ConfusionMatrix::from_labels(&[Open, Closed, Closed], &[Open, Closed, Open]).unwrap();
        let output = format!("{cm}");
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "         pred_  0 pred_  1");
        assert_eq!(lines[1], "true_  0        1        0");
        assert!(lines.iter().all(|line| line.len() == lines[0].len()));
    }
}
