use log::debug;

use crate::config::Config;
use crate::error::TransRiskResult;
use crate::pipeline::{run_analysis_stage, run_data_stage, RunOptions, StageReport};

// Re-exports
pub use column_names as COL;

// Modules
pub mod column_names;
pub mod compustat;
pub mod config;
pub mod coverage;
pub mod curve;
pub mod decompose;
pub mod error;
pub mod external;
pub mod figures;
pub mod gdp;
pub mod identifiers;
pub mod io;
pub mod merge;
pub mod pipeline;
pub mod regression;
pub mod tables;

/// Type for running the transmission risk pipeline
pub struct TransRisk {
    pub config: Config,
}

impl TransRisk {
    pub fn new(config: Config) -> Self {
        debug!("config: {config:?}");
        Self { config }
    }

    /// Builds the final datasets from the raw inputs.
    pub fn data(&self, options: &RunOptions) -> TransRiskResult<StageReport> {
        run_data_stage(&self.config, options)
    }

    /// Produces figures and tables from the final datasets.
    pub fn analysis(&self, options: &RunOptions) -> TransRiskResult<StageReport> {
        run_analysis_stage(&self.config, options)
    }

    /// Both stages in order. The paper is only compiled after the analysis stage.
    pub fn all(&self, options: &RunOptions) -> TransRiskResult<Vec<StageReport>> {
        let data_options = RunOptions {
            also_compile: false,
            ..*options
        };
        Ok(vec![self.data(&data_options)?, self.analysis(options)?])
    }
}
