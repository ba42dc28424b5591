//! Error types for pyinfer-core
//!
//! Only failures that stop a module from being analysed at all are errors.
//! Type problems found by the engine are advisory and reported as
//! [`Diagnostic`](crate::dataflow::Diagnostic) values instead.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, InferError>;

#[derive(Debug, Error)]
pub enum InferError {
    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    #[error("module '{0}' not found")]
    ModuleNotFound(String),
}

impl InferError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        InferError::Io {
            path: path.into(),
            source,
        }
    }
}
