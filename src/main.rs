use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{debug, info};

use blink_classify::{
    Classifier, KernelClassifier, KernelParams, NeighborClassifier, NeighborParams, ParamGrid,
    Pipeline,
};
use blink_io::{DatasetReader, ExperimentName, ResultWriter, TabularData, ensure_same_columns};
use blink_prep::LabelCounts;

#[derive(Parser)]
#[command(name = "blink")]
#[command(about = "Eye-state classification from EEG channels with cross-validated model selection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// RNG seed for the train/validation split and fold assignment
    #[arg(long, default_value_t = 42, global = true)]
    seed: u64,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,

    /// Number of threads for parallel computation (defaults to all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,
}

/// Inputs, outputs, and evaluation protocol shared by every classifier.
#[derive(Args, Debug, Clone)]
struct PipelineArgs {
    /// Labeled CSV: feature columns followed by a 0/1 label column
    #[arg(long)]
    train: PathBuf,

    /// Unlabeled CSV with the same feature columns, in the same order
    #[arg(long)]
    test: PathBuf,

    /// Experiment name for output files (must match [a-zA-Z0-9_-]+)
    #[arg(long)]
    experiment: String,

    /// Output directory for result files
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Number of cross-validation folds (at least 2)
    #[arg(long, default_value_t = 10)]
    folds: usize,

    /// Fraction of labeled records used for training; the rest is validation
    #[arg(long, default_value_t = 0.75)]
    train_fraction: f64,

    /// Required number of feature columns
    #[arg(long, default_value_t = 14)]
    features: usize,
}

/// Kernel machine grid and solver settings.
#[derive(Args, Debug, Clone)]
struct KernelArgs {
    /// Comma-separated cost values
    #[arg(long, value_delimiter = ',', default_values_t = [1.0, 10.0, 100.0])]
    costs: Vec<f64>,

    /// Comma-separated RBF bandwidth values
    #[arg(long, value_delimiter = ',', default_values_t = [0.01, 0.1, 1.0])]
    gammas: Vec<f64>,

    /// Solver stopping tolerance
    #[arg(long, default_value_t = 1e-3)]
    tolerance: f64,

    /// Solver iteration budget per fit
    #[arg(long, default_value_t = 1_000_000)]
    max_iter: usize,
}

/// Neighbor-count grid.
#[derive(Args, Debug, Clone)]
struct NeighborArgs {
    /// Comma-separated neighbor counts
    #[arg(long, value_delimiter = ',', default_values_t = [1, 3, 5, 7, 9, 11])]
    neighbors: Vec<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Tune, validate, and predict with the RBF kernel classifier
    Svm {
        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        kernel: KernelArgs,
    },

    /// Tune, validate, and predict with the k-nearest-neighbor classifier
    Knn {
        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        neighbors: NeighborArgs,
    },

    /// Run both classifiers on the same split and folds
    Compare {
        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        kernel: KernelArgs,

        #[command(flatten)]
        neighbors: NeighborArgs,
    },
}

// --- JSON stdout output structs ---

#[derive(Serialize)]
struct RunOutput<'a, P> {
    experiment: &'a str,
    classifier: &'a str,
    params: &'a P,
    cv_mean_error: f64,
    validation_error: f64,
    n_train: usize,
    n_validation: usize,
    n_test: usize,
    confusion_matrix: [[usize; 2]; 2],
    prediction_counts: LabelCounts,
    artifacts: Vec<PathBuf>,
}

/// Both input files, read and checked against each other.
struct Inputs {
    labeled: TabularData,
    unlabeled: TabularData,
}

fn load_inputs(args: &PipelineArgs) -> Result<Inputs> {
    let labeled = DatasetReader::new(&args.train)
        .with_expected_features(args.features)
        .read_labeled()
        .context("failed to read labeled CSV")?;
    let unlabeled = DatasetReader::new(&args.test)
        .with_expected_features(args.features)
        .read_unlabeled()
        .context("failed to read unlabeled CSV")?;
    ensure_same_columns(&labeled, &unlabeled)
        .context("labeled and unlabeled files disagree on feature columns")?;
    info!(
        n_labeled = labeled.n_records(),
        n_unlabeled = unlabeled.n_records(),
        "datasets loaded"
    );
    Ok(Inputs { labeled, unlabeled })
}

fn run_classifier<C: Classifier>(
    classifier: &C,
    grid: &ParamGrid<C::Params>,
    pipeline: &Pipeline,
    inputs: &Inputs,
    writer: &ResultWriter,
    experiment: &str,
) -> Result<serde_json::Value> {
    let name = classifier.name();
    let report = pipeline
        .run(
            classifier,
            grid,
            inputs.labeled.dataset(),
            inputs.unlabeled.dataset(),
        )
        .with_context(|| format!("{name} pipeline failed"))?;
    debug!(confusion = %report.validation_confusion, "validation confusion matrix");

    let evaluation = writer.write_evaluation(name, &report)?;
    let predictions = writer.write_predictions(name, &report.test_predictions)?;

    let output = RunOutput {
        experiment,
        classifier: name,
        params: &report.model.params,
        cv_mean_error: report.model.mean_error,
        validation_error: report.validation_error,
        n_train: report.n_train,
        n_validation: report.n_validation,
        n_test: report.test_predictions.len(),
        confusion_matrix: *report.validation_confusion.as_rows(),
        prediction_counts: report.prediction_counts,
        artifacts: vec![evaluation, predictions],
    };
    Ok(serde_json::to_value(&output)?)
}

fn kernel_setup(args: &KernelArgs) -> Result<(KernelClassifier, ParamGrid<KernelParams>)> {
    let classifier = KernelClassifier::new()
        .with_tolerance(args.tolerance)
        .with_max_iter(args.max_iter);
    let grid = KernelParams::grid(&args.costs, &args.gammas).context("invalid kernel grid")?;
    Ok((classifier, grid))
}

fn neighbor_setup(args: &NeighborArgs) -> Result<(NeighborClassifier, ParamGrid<NeighborParams>)> {
    let grid = NeighborParams::grid(&args.neighbors).context("invalid neighbor grid")?;
    Ok((NeighborClassifier::new(), grid))
}

fn prepare(args: &PipelineArgs, seed: u64) -> Result<(Pipeline, Inputs, ResultWriter)> {
    let experiment = ExperimentName::new(args.experiment.clone())?;
    let pipeline = Pipeline::new(args.train_fraction, args.folds)
        .context("invalid pipeline configuration")?
        .with_seed(seed);
    let inputs = load_inputs(args)?;
    let writer = ResultWriter::new(&args.output_dir, experiment)?;
    Ok((pipeline, inputs, writer))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => "debug",
        (_, true) => "error",
        _ => "info",
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Configure Rayon thread pool
    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("failed to configure thread pool")?;
        info!(threads, "thread pool configured");
    }

    let output = match cli.command {
        Command::Svm { pipeline, kernel } => {
            let (runner, inputs, writer) = prepare(&pipeline, cli.seed)?;
            let (classifier, grid) = kernel_setup(&kernel)?;
            run_classifier(&classifier, &grid, &runner, &inputs, &writer, &pipeline.experiment)?
        }

        Command::Knn {
            pipeline,
            neighbors,
        } => {
            let (runner, inputs, writer) = prepare(&pipeline, cli.seed)?;
            let (classifier, grid) = neighbor_setup(&neighbors)?;
            run_classifier(&classifier, &grid, &runner, &inputs, &writer, &pipeline.experiment)?
        }

        Command::Compare {
            pipeline,
            kernel,
            neighbors,
        } => {
            let (runner, inputs, writer) = prepare(&pipeline, cli.seed)?;
            let (svm, svm_grid) = kernel_setup(&kernel)?;
            let (knn, knn_grid) = neighbor_setup(&neighbors)?;
            let runs = vec![
                run_classifier(&svm, &svm_grid, &runner, &inputs, &writer, &pipeline.experiment)?,
                run_classifier(&knn, &knn_grid, &runner, &inputs, &writer, &pipeline.experiment)?,
            ];
            serde_json::Value::Array(runs)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
