use std::{io, path::PathBuf};
use thiserror::Error;

/// A row or pattern problem that invalidates the whole report.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("row {row}: missing required field {field}")]
    MissingField { row: usize, field: &'static str },

    #[error("row {row}: cannot parse LastWriteTime {value:?}")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: Length {value:?} is not a byte count")]
    Size { row: usize, value: String },

    #[error("invalid directory pattern for root {root:?}: {source}")]
    Pattern {
        root: String,
        #[source]
        source: regex::Error,
    },
}

/// Stage failures that end the run, each with its own exit status.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start walker {program}: {source}")]
    Invocation {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to format walker results into tabular format: {0}")]
    Format(#[from] FormatError),

    #[error("failed to write report to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PipelineError {
    pub fn exit_code(&self) -> u8 {
        match self {
            PipelineError::Invocation { .. } => 2,
            PipelineError::Format(_) => 3,
            PipelineError::Write { .. } => 4,
        }
    }
}
