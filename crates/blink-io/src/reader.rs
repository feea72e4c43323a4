//! CSV dataset reader with full input validation.

use std::path::{Path, PathBuf};

use blink_prep::{Dataset, Label};
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::TabularData;

/// Reads channel recordings from a CSV file.
///
/// Expected CSV format:
/// - Header row required, naming every column
/// - Labeled files: `channel1,...,channelN,label` with the label `0` (open)
///   or `1` (closed) in the last column
/// - Unlabeled files: `channel1,...,channelN`
/// - All rows must have the same number of columns as the header
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::FileNotFound`] | File doesn't exist or is unreadable |
/// | [`IoError::CsvParse`] | Malformed CSV record |
/// | [`IoError::NoFeatureColumns`] | Header leaves no feature column |
/// | [`IoError::FeatureCountMismatch`] | Feature column count differs from `expected_features` |
/// | [`IoError::EmptyDataset`] | Zero data rows after header |
/// | [`IoError::InconsistentRowLength`] | Row has different column count than header |
/// | [`IoError::NonFiniteValue`] | Feature cell is NaN, Inf, or unparseable float |
/// | [`IoError::InvalidLabel`] | Label cell is not `0` or `1` |
#[derive(Debug, Clone)]
pub struct DatasetReader {
    path: PathBuf,
    expected_features: Option<usize>,
}

impl DatasetReader {
    /// Create a new reader for the given CSV file path. Any feature count is accepted.
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            expected_features: None,
        }
    }

    /// Require exactly `n` feature columns.
    #[must_use]
    pub fn with_expected_features(mut self, n: usize) -> Self {
        self.expected_features = Some(n);
        self
    }

    /// Read a file whose last column is the label.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read_labeled(&self) -> Result<TabularData, IoError> {
        let (feature_names, features, labels) = self.read_rows(true)?;
        let dataset = Dataset::labeled(features, labels)?;
        info!(
            n_records = dataset.n_records(),
            n_features = feature_names.len(),
            "labeled dataset loaded"
        );
        Ok(TabularData::new(feature_names, dataset))
    }

    /// Read a file with feature columns only.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub fn read_unlabeled(&self) -> Result<TabularData, IoError> {
        let (feature_names, features, _) = self.read_rows(false)?;
        let dataset = Dataset::unlabeled(features)?;
        info!(
            n_records = dataset.n_records(),
            n_features = feature_names.len(),
            "unlabeled dataset loaded"
        );
        Ok(TabularData::new(feature_names, dataset))
    }

    fn read_rows(
        &self,
        labeled: bool,
    ) -> Result<(Vec<String>, Vec<Vec<f64>>, Vec<Label>), IoError> {
        let file = std::fs::File::open(&self.path).map_err(|e| IoError::FileNotFound {
            path: self.path.clone(),
            source: e,
        })?;

        // flexible(true) so that ragged rows surface as InconsistentRowLength
        // rather than a low-level CsvParse error.
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(file);

        let header = rdr.headers().map_err(|e| self.parse_error(e))?;
        let expected_cols = header.len();
        let n_features = if labeled {
            expected_cols.saturating_sub(1)
        } else {
            expected_cols
        };
        debug!(expected_cols, n_features, "read CSV header");

        if n_features == 0 {
            return Err(IoError::NoFeatureColumns {
                path: self.path.clone(),
            });
        }
        if let Some(expected) = self.expected_features {
            if n_features != expected {
                return Err(IoError::FeatureCountMismatch {
                    path: self.path.clone(),
                    expected,
                    got: n_features,
                });
            }
        }
        let feature_names: Vec<String> = header.iter().take(n_features).map(String::from).collect();

        let mut features = Vec::new();
        let mut labels = Vec::new();
        for (row_index, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| self.parse_error(e))?;

            if record.len() != expected_cols {
                return Err(IoError::InconsistentRowLength {
                    path: self.path.clone(),
                    row_index,
                    expected: expected_cols,
                    got: record.len(),
                });
            }

            let mut row = Vec::with_capacity(n_features);
            for (col_index, raw) in record.iter().take(n_features).enumerate() {
                let value = raw
                    .parse::<f64>()
                    .ok()
                    .filter(|v| v.is_finite())
                    .ok_or_else(|| IoError::NonFiniteValue {
                        path: self.path.clone(),
                        row_index,
                        col_index,
                        raw: raw.to_string(),
                    })?;
                row.push(value);
            }
            features.push(row);

            if labeled {
                let raw = record.get(n_features).unwrap_or("");
                let label = parse_label(raw).ok_or_else(|| IoError::InvalidLabel {
                    path: self.path.clone(),
                    row_index,
                    raw: raw.to_string(),
                })?;
                labels.push(label);
            }
        }

        if features.is_empty() {
            return Err(IoError::EmptyDataset {
                path: self.path.clone(),
            });
        }

        Ok((feature_names, features, labels))
    }

    fn parse_error(&self, e: csv::Error) -> IoError {
        IoError::CsvParse {
            path: self.path.clone(),
            offset: e.position().map_or(0, |p| p.byte()),
            source: e,
        }
    }
}

/// Accept `0`/`1`, and also `0.0`/`1.0` as written by numeric exporters.
fn parse_label(raw: &str) -> Option<Label> {
    if let Ok(value) = raw.parse::<u64>() {
        return Label::from_value(value).ok();
    }
    match raw.parse::<f64>() {
        Ok(v) if v == 0.0 => Some(Label::Open),
        Ok(v) if v == 1.0 => Some(Label::Closed),
        _ => None,
    }
}

/// Check that the unlabeled file lists the same feature columns, in the same
/// order, as the labeled file.
///
/// # Errors
///
/// | Variant | Condition |
/// |---|---|
/// | [`IoError::ColumnCountMismatch`] | different number of feature columns |
/// | [`IoError::ColumnMismatch`] | a column name differs at the same position |
pub fn ensure_same_columns(labeled: &TabularData, unlabeled: &TabularData) -> Result<(), IoError> {
    if labeled.n_features() != unlabeled.n_features() {
        return Err(IoError::ColumnCountMismatch {
            labeled: labeled.n_features(),
            unlabeled: unlabeled.n_features(),
        });
    }
    let mismatch = labeled
        .feature_names()
        .iter()
        .zip(unlabeled.feature_names())
        .position(|(a, b)| a != b);
    if let Some(column_index) = mismatch {
        return Err(IoError::ColumnMismatch {
            column_index,
            labeled: labeled.feature_names()[column_index].clone(),
            unlabeled: unlabeled.feature_names()[column_index].clone(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_csv(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f.flush().unwrap();
        f
    }

    const LABELED: &str = "AF3,F7,eyeDetection\n4329.2,4009.2,0\n4324.6,4004.6,1\n4327.7,4006.7,0\n";

    #[test]
    fn read_valid_labeled() {
        let f = write_csv(LABELED);
        let data = DatasetReader::new(f.path()).read_labeled().unwrap();
        assert_eq!(data.n_records(), 3);
        assert_eq!(data.n_features(), 2);
        assert_eq!(data.feature_names(), &["AF3", "F7"]);
        assert_eq!(
            data.dataset().labels().unwrap(),
            &[Label::Open, Label::Closed, Label::Open]
        );
        assert!((data.dataset().features()[1][0] - 4324.6).abs() < f64::EPSILON);
    }

    #[test]
    fn read_valid_unlabeled() {
        let f = write_csv("AF3,F7\n4329.2,4009.2\n4324.6,4004.6\n");
        let data = DatasetReader::new(f.path())
            .with_expected_features(2)
            .read_unlabeled()
            .unwrap();
        assert_eq!(data.n_records(), 2);
        assert!(!data.dataset().is_labeled());
    }

    #[test]
    fn float_labels_accepted() {
        let f = write_csv("a,label\n1.0,1.0\n2.0,0.0\n");
        let data = DatasetReader::new(f.path()).read_labeled().unwrap();
        assert_eq!(data.dataset().labels().unwrap(), &[Label::Closed, Label::Open]);
    }

    #[test]
    fn error_file_not_found() {
        let err = DatasetReader::new(Path::new("/nonexistent/eeg.csv"))
            .read_labeled()
            .unwrap_err();
        assert!(matches!(err, IoError::FileNotFound { .. }));
    }

    #[test]
    fn error_empty_dataset() {
        let f = write_csv("AF3,F7,eyeDetection\n");
        let err = DatasetReader::new(f.path()).read_labeled().unwrap_err();
        assert!(matches!(err, IoError::EmptyDataset { .. }));
    }

    #[test]
    fn error_no_feature_columns() {
        let f = write_csv("eyeDetection\n0\n1\n");
        let err = DatasetReader::new(f.path()).read_labeled().unwrap_err();
        assert!(matches!(err, IoError::NoFeatureColumns { .. }));
    }

    #[test]
    fn error_feature_count_mismatch() {
        let f = write_csv(LABELED);
        let err = DatasetReader::new(f.path())
            .with_expected_features(14)
            .read_labeled()
            .unwrap_err();
        assert!(matches!(
            err,
            IoError::FeatureCountMismatch {
                expected: 14,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn error_inconsistent_row_length() {
        let f = write_csv("AF3,F7,eyeDetection\n1.0,2.0,0\n1.0,1\n");
        let err = DatasetReader::new(f.path()).read_labeled().unwrap_err();
        assert!(matches!(
            err,
            IoError::InconsistentRowLength {
                row_index: 1,
                expected: 3,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn error_non_finite_value() {
        for bad in ["NaN", "inf", "abc", ""] {
            let f = write_csv(&format!("AF3,F7,eyeDetection\n1.0,{bad},0\n"));
            let err = DatasetReader::new(f.path()).read_labeled().unwrap_err();
            assert!(
                matches!(err, IoError::NonFiniteValue { col_index: 1, .. }),
                "{bad} accepted"
            );
        }
    }

    #[test]
    fn error_invalid_label() {
        for bad in ["2", "-1", "0.5", "yes"] {
            let f = write_csv(&format!("AF3,eyeDetection\n1.0,{bad}\n"));
            let err = DatasetReader::new(f.path()).read_labeled().unwrap_err();
            assert!(matches!(err, IoError::InvalidLabel { .. }), "{bad} accepted");
        }
    }

    #[test]
    fn column_contract() {
        let labeled = write_csv(LABELED);
        let same = write_csv("AF3,F7\n1.0,2.0\n");
        let swapped = write_csv("F7,AF3\n1.0,2.0\n");
        let narrow = write_csv("AF3\n1.0\n");

        let labeled = DatasetReader::new(labeled.path()).read_labeled().unwrap();
        let read = |f: &NamedTempFile| DatasetReader::new(f.path()).read_unlabeled().unwrap();

        assert!(ensure_same_columns(&labeled, &read(&same)).is_ok());
        assert!(matches!(
            ensure_same_columns(&labeled, &read(&swapped)).unwrap_err(),
            IoError::ColumnMismatch { column_index: 0, .. }
        ));
        assert!(matches!(
            ensure_same_columns(&labeled, &read(&narrow)).unwrap_err(),
            IoError::ColumnCountMismatch {
                labeled: 2,
                unlabeled: 1
            }
        ));
    }
}
