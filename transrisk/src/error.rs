//! Error types.

use std::fmt;
use std::path::PathBuf;

use itertools::Itertools;
use serde::Serialize;

use crate::regression::FitError;

/// A named input file that should exist before a stage starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingInput {
    pub name: String,
    pub path: PathBuf,
}

impl fmt::Display for MissingInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.path.display())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum TransRiskError {
    #[error("File {} is required but not found. Make sure it has been generated.", .0)]
    MissingInput(MissingInput),
    #[error("{} required input(s) missing: {}", .0.len(), .0.iter().join(", "))]
    MissingInputs(Vec<MissingInput>),
    #[error("Dataset `{dataset}` is missing required column `{column}`")]
    MissingColumn { dataset: String, column: String },
    #[error("Dataset `{dataset}` is not unique on {keys:?}: {duplicates} duplicated key(s)")]
    DuplicateKey {
        dataset: String,
        keys: Vec<String>,
        duplicates: usize,
    },
    #[error("Missing weight for destination `{destination}` in {context}")]
    MissingWeight {
        context: String,
        destination: String,
    },
    #[error("Data contract violation: {0}")]
    DataContract(String),
    #[error("Cannot fit regression for {context}: {source}")]
    DegenerateFit {
        context: String,
        #[source]
        source: FitError,
    },
    #[error("Standard deviation of {context} is zero or undefined")]
    ZeroStandardDeviation { context: String },
    #[error("External stage `{name}` failed: {diagnostic}")]
    ExternalStage { name: String, diagnostic: String },
    #[error("Unsupported table format for {}", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("serde JSON error: {0}")]
    SerdeJSONError(#[from] serde_json::Error),
    #[error("TOML error: {0}")]
    TomlError(#[from] toml::de::Error),
}

pub type TransRiskResult<T> = Result<T, TransRiskError>;
