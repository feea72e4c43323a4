//! File I/O, validation, and serialization for the blink pipeline.

mod domain;
mod error;
mod reader;
mod writer;

pub use domain::{ExperimentName, TabularData};
pub use error::IoError;
pub use reader::{DatasetReader, ensure_same_columns};
pub use writer::ResultWriter;
