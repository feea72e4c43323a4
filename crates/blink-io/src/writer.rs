//! JSON result writer for evaluation reports and test-set predictions.

use std::fs;
use std::path::{Path, PathBuf};

use blink_classify::{CandidateScore, ClassMetrics, PipelineReport};
use blink_prep::{FeatureStats, Label, LabelCounts};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::IoError;
use crate::domain::ExperimentName;

/// Writes pipeline results to JSON files.
///
/// Creates the output directory on construction if it does not exist.
/// Output files are named `{experiment}_{classifier}_evaluate.json` and
/// `{experiment}_{classifier}_predict.json`.
pub struct ResultWriter {
    output_dir: PathBuf,
    experiment: ExperimentName,
}

impl ResultWriter {
    /// Create a new writer targeting the given directory and experiment name.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::OutputDirCreate`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %output_dir.display(), experiment = %experiment))]
    pub fn new(output_dir: &Path, experiment: ExperimentName) -> Result<Self, IoError> {
        fs::create_dir_all(output_dir).map_err(|e| IoError::OutputDirCreate {
            path: output_dir.to_path_buf(),
            source: e,
        })?;
        debug!("output directory ready");
        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            experiment,
        })
    }

    /// Path of the artifact `{experiment}_{classifier}_{kind}.json`.
    #[must_use]
    pub fn artifact_path(&self, classifier: &str, kind: &str) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{classifier}_{kind}.json",
            self.experiment.as_str()
        ))
    }

    /// Write model selection and validation results to
    /// `{experiment}_{classifier}_evaluate.json`.
    ///
    /// # Errors
    ///
    /// | Variant | Condition |
    /// |---|---|
    /// | [`IoError::Serialize`] | hyperparameters fail to serialize |
    /// | [`IoError::WriteFile`] | the file cannot be written |
    #[instrument(skip_all, fields(classifier = %classifier))]
    pub fn write_evaluation<P: Serialize, M>(
        &self,
        classifier: &str,
        report: &PipelineReport<P, M>,
    ) -> Result<PathBuf, IoError> {
        let path = self.artifact_path(classifier, "evaluate");
        let confusion = &report.validation_confusion;

        let artifact = EvaluateArtifact {
            experiment: self.experiment.as_str(),
            classifier,
            n_train: report.n_train,
            n_validation: report.n_validation,
            selected: SelectedEntry {
                index: report.model.best_index,
                params: &report.model.params,
                cv_mean_error: report.model.mean_error,
                cv_fold_errors: &report.model.fold_errors,
            },
            candidates: &report.model.candidates,
            validation: ValidationEntry {
                error_rate: report.validation_error,
                accuracy: confusion.accuracy(),
                confusion_matrix: confusion.as_rows(),
                class_metrics: confusion.class_metrics(),
            },
            scaling: report.scaling.stats(),
            prediction_counts: report.prediction_counts,
        };

        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), "evaluation result written");
        Ok(path)
    }

    /// Write test-set predictions to `{experiment}_{classifier}_predict.json`.
    ///
    /// # Errors
    ///
    /// Returns [`IoError::WriteFile`] if the file cannot be written.
    #[instrument(skip_all, fields(classifier = %classifier, n_records = predictions.len()))]
    pub fn write_predictions(
        &self,
        classifier: &str,
        predictions: &[Label],
    ) -> Result<PathBuf, IoError> {
        let path = self.artifact_path(classifier, "predict");

        let artifact = PredictArtifact {
            experiment: self.experiment.as_str(),
            classifier,
            n_records: predictions.len(),
            counts: LabelCounts::from_labels(predictions),
            predictions,
        };

        self.write_json(&path, &artifact)?;
        info!(path = %path.display(), "predictions written");
        Ok(path)
    }

    fn write_json<T: Serialize>(&self, path: &Path, artifact: &T) -> Result<(), IoError> {
        let json = serde_json::to_string_pretty(artifact).map_err(|e| IoError::Serialize {
            path: path.to_path_buf(),
            source: e,
        })?;
        fs::write(path, &json).map_err(|e| IoError::WriteFile {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

// --- Shadow structs for JSON serialization ---

#[derive(Serialize)]
struct EvaluateArtifact<'a, P> {
    experiment: &'a str,
    classifier: &'a str,
    n_train: usize,
    n_validation: usize,
    selected: SelectedEntry<'a, P>,
    candidates: &'a [CandidateScore<P>],
    validation: ValidationEntry<'a>,
    scaling: &'a [FeatureStats],
    prediction_counts: LabelCounts,
}

#[derive(Serialize)]
struct SelectedEntry<'a, P> {
    index: usize,
    params: &'a P,
    cv_mean_error: f64,
    cv_fold_errors: &'a [f64],
}

#[derive(Serialize)]
struct ValidationEntry<'a> {
    error_rate: f64,
    accuracy: f64,
    confusion_matrix: &'a [[usize; 2]; 2],
    class_metrics: Vec<ClassMetrics>,
}

#[derive(Serialize)]
struct PredictArtifact<'a> {
    experiment: &'a str,
    classifier: &'a str,
    n_records: usize,
    counts: LabelCounts,
    predictions: &'a [Label],
}
