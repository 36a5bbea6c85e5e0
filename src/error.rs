// 🚨 Structural errors
// Field-level parse failures never land here: they become `None` in the
// normalized records. These are the failures that abort a run.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{file}: required column '{column}' not found in header")]
    MissingColumn { file: String, column: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}
