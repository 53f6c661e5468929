use transrisk::error::TransRiskError;

#[derive(thiserror::Error, Debug)]
pub enum TransRiskCliError {
    #[error("Anyhow error")]
    Anyhow(#[from] anyhow::Error),
    #[error("transrisk error")]
    TransRiskError(#[from] TransRiskError),
    #[error("std IO error")]
    IOError(#[from] std::io::Error),
    #[error("{0} required input(s) missing")]
    MissingInputs(usize),
}

pub type TransRiskCliResult<T> = Result<T, TransRiskCliError>;
