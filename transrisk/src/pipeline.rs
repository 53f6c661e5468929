//! The two stages of a run: the data stage builds the final datasets from the raw inputs, the
//! analysis stage turns final datasets into figures and table fragments.
//!
//! Each stage first checks that every input it needs exists, so a run never stops halfway
//! because of a missing file. Merge diagnostics, written files and external stage outcomes
//! are collected in a [`StageReport`] saved to the logs directory.

use std::path::{Path, PathBuf};

use log::{debug, info};
use polars::prelude::DataFrame;
use serde::Serialize;
use strum_macros::{Display, EnumString};

use crate::compustat::{import_companies, import_marketcap, merge_compustat};
use crate::config::{check_inputs, Config};
use crate::coverage::{coverage_data, our_sample};
use crate::curve::{build_crisis_curve, build_split_curve, TransmissionPanel};
use crate::decompose::{
    decompose_financial, decompose_headquarters, financial_frame, headquarters_frame,
    SCORES_CONTRACT,
};
use crate::error::{MissingInput, TransRiskError, TransRiskResult};
use crate::external::{ExternalRunner, ExternalStage, StageOutcome};
use crate::figures::coverage::CoverageFigure;
use crate::figures::crisis::{CrisisFigure, SplitCrisisFigure};
use crate::figures::decomposition::{
    DecompositionFigure, HeadquartersFigure, FINANCIAL_CONTRACT, HEADQUARTERS_CONTRACT,
};
use crate::figures::{render_figure, FigureSpecs, PreparedFigure};
use crate::gdp::import_gdp;
use crate::identifiers::import_country_identifiers;
use crate::io::{read_table, write_table};
use crate::merge::MergeDiagnostics;
use crate::tables::coverage::{
    prepare_table_1, render_table_1, COVERAGE_CONTRACT, GDP_SHARES_CONTRACT, WORLDSCOPE_CONTRACT,
};
use crate::tables::crises::{prepare_table_7, render_table_7, OVERVIEW_CONTRACT};
use crate::tables::ngrams::{file_code, prepare_table_2, render_table_2, NGRAM_CONTRACT};
use crate::tables::transmission::{render_table_6, TransmissionMatrix, TRANSMISSION_CONTRACT};
use crate::tables::write_fragment;

const ISO2_ISO3: &str = "iso2_iso3.parquet";
const ISO2_NAMES: &str = "iso2_names.parquet";
const COMPUSTAT_MERGED: &str = "compustat_merged.parquet";
const OUR_SAMPLE: &str = "our_sample.parquet";

const TABLE_1: &str = "Table1_coverage.tex";
const TABLE_6_SOURCES: &str = "Table6_transmissionrisk_topsources.tex";
const TABLE_6_DESTINATIONS: &str = "Table6_transmissionrisk_topdestinations.tex";
const TABLE_7: &str = "Table7_transmissionrisk_overview.tex";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, EnumString, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Data,
    Analysis,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunOptions {
    /// Remove the outputs of previous runs before starting.
    pub clean_slate: bool,
    /// Compile the paper after the analysis stage.
    pub also_compile: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            clean_slate: true,
            also_compile: false,
        }
    }
}

/// What a stage did.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub merges: Vec<MergeDiagnostics>,
    pub outputs: Vec<PathBuf>,
    pub external: Vec<StageOutcome>,
}

impl StageReport {
    fn new(stage: Stage) -> Self {
        Self {
            stage,
            merges: vec![],
            outputs: vec![],
            external: vec![],
        }
    }

    fn write_table(&mut self, path: &Path, df: &mut DataFrame) -> TransRiskResult<()> {
        write_table(path, df)?;
        info!("Wrote {}", path.display());
        self.outputs.push(path.to_path_buf());
        Ok(())
    }

    fn write_fragment(&mut self, path: &Path, contents: &str) -> TransRiskResult<()> {
        write_fragment(path, contents)?;
        info!("Wrote table {}", path.display());
        self.outputs.push(path.to_path_buf());
        Ok(())
    }

    /// `<logs>/<stage>_report.json`
    pub fn path(&self, logs: &Path) -> PathBuf {
        logs.join(format!("{}_report.json", self.stage))
    }

    fn save(&self, logs: &Path) -> TransRiskResult<()> {
        std::fs::create_dir_all(logs)?;
        let path = self.path(logs);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved stage report to {}", path.display());
        Ok(())
    }
}

/// Empties `dir` when `clean` is set and makes sure it exists. Directories holding the raw
/// inputs are never cleared.
fn reset_dir(config: &Config, dir: &Path, clean: bool) -> TransRiskResult<()> {
    if clean && dir.exists() {
        if config.directories.raw.starts_with(dir) {
            return Err(TransRiskError::InvalidConfig(format!(
                "refusing to clear {}, which contains the raw data directory",
                dir.display()
            )));
        }
        info!("Clearing {}", dir.display());
        std::fs::remove_dir_all(dir)?;
    }
    std::fs::create_dir_all(dir)?;
    Ok(())
}

/// Runs the configured statistical package inside the logs directory, where it leaves its logs.
fn stata(config: &Config) -> ExternalRunner {
    let dirs = &config.directories;
    ExternalRunner::new(
        &config.general.stata_exec,
        &config.general.stata_args,
        &dirs.logs,
    )
    .with_placeholder("root", &config.general.root)
    .with_placeholder("raw", &dirs.raw)
    .with_placeholder("final", &dirs.final_data)
    .with_placeholder("temp", &dirs.temp)
    .with_placeholder("logs", &dirs.logs)
    .with_placeholder("figures", &dirs.figures)
    .with_placeholder("tables", &dirs.tables)
}

/// Imports the raw data and writes the coverage, GDP and decomposed datasets, then runs the
/// external data stages.
pub fn run_data_stage(config: &Config, options: &RunOptions) -> TransRiskResult<StageReport> {
    let dirs = &config.directories;
    for dir in [&dirs.final_data, &dirs.temp, &dirs.logs] {
        reset_dir(config, dir, options.clean_slate)?;
    }
    check_inputs(config.data_inputs())?;
    let mut report = StageReport::new(Stage::Data);
    let raw = &config.raw_data;

    info!("Importing country identifiers");
    let identifiers = import_country_identifiers(&raw.iso3, &raw.names)?;
    report.write_table(&dirs.temp.join(ISO2_ISO3), &mut identifiers.iso2_to_iso3.clone())?;
    report.write_table(&dirs.temp.join(ISO2_NAMES), &mut identifiers.iso2_to_name.clone())?;

    info!("Importing World Bank GDP");
    report.write_table(&config.final_data.gdp, &mut import_gdp(&raw.worldbank)?)?;

    info!("Importing Compustat");
    let compustat = &raw.compustat;
    let marketcap = import_marketcap(&config.compustat_years(), compustat.marketcap_precedence)?;
    let companies = import_companies(
        &compustat.global_companies,
        &compustat.north_america_companies,
        compustat.company_precedence,
    )?;
    let (mut merged, diagnostics) = merge_compustat(&marketcap, &companies)?;
    report.merges.push(diagnostics);
    report.write_table(&dirs.temp.join(COMPUSTAT_MERGED), &mut merged)?;

    info!("Building coverage data");
    let scores = read_table(&raw.scores, &SCORES_CONTRACT)?;
    let mut sample = our_sample(scores.clone())?;
    report.write_table(&dirs.temp.join(OUR_SAMPLE), &mut sample)?;
    let (mut coverage, diagnostics) = coverage_data(&merged, &identifiers, &sample)?;
    report.merges.extend(diagnostics);
    report.write_table(&config.final_data.coverage, &mut coverage)?;

    info!("Decomposing country risk");
    let financial = decompose_financial(&scores, config.analysis.cutoff_year)?;
    report.write_table(
        &config.final_data.decomposed_fin,
        &mut financial_frame(&financial)?,
    )?;
    let headquarters = decompose_headquarters(&scores, &config.analysis.reference_country)?;
    report.write_table(
        &config.final_data.decomposed_hq,
        &mut headquarters_frame(&headquarters)?,
    )?;

    report.external = stata(config).run_all(&config.data_stage.external)?;
    report.save(&dirs.logs)?;
    Ok(report)
}

fn prepare_figures(config: &Config, specs: &FigureSpecs) -> TransRiskResult<Vec<PreparedFigure>> {
    let fin = &config.final_data;
    let mut figures = vec![PreparedFigure::from(CoverageFigure::prepare(read_table(
        &fin.coverage,
        &COVERAGE_CONTRACT,
    )?)?)];

    let decomposed_fin = read_table(&fin.decomposed_fin, &FINANCIAL_CONTRACT)?;
    for spec in &specs.decomposition {
        figures.push(
            DecompositionFigure::prepare(&decomposed_fin, spec, &specs.shaded_spans)?.into(),
        );
    }
    if let Some(spec) = &specs.headquarters {
        let decomposed_hq = read_table(&fin.decomposed_hq, &HEADQUARTERS_CONTRACT)?;
        figures.push(HeadquartersFigure::prepare(&decomposed_hq, spec, &specs.shaded_spans)?.into());
    }

    let panel = TransmissionPanel::read(&fin.transmission_risk_tau)?;
    for spec in &specs.crisis {
        figures.push(CrisisFigure::new(build_crisis_curve(&panel, spec)?).into());
    }
    for spec in &specs.split_crisis {
        figures.push(SplitCrisisFigure::new(build_split_curve(&panel, spec)?).into());
    }
    Ok(figures)
}

fn write_tables(config: &Config, report: &mut StageReport) -> TransRiskResult<()> {
    let fin = &config.final_data;
    let tables = &config.directories.tables;

    let rows = prepare_table_1(
        read_table(&fin.coverage, &COVERAGE_CONTRACT)?,
        read_table(&fin.worldscope, &WORLDSCOPE_CONTRACT)?,
        read_table(&fin.gdp, &GDP_SHARES_CONTRACT)?,
    )?;
    report.write_fragment(&tables.join(TABLE_1), &render_table_1(&rows))?;

    for file in &config.raw_data.tfidf {
        let code = file_code(file)?;
        let panels = prepare_table_2(read_table(file, &NGRAM_CONTRACT)?)?;
        report.write_fragment(
            &tables.join(format!("Table2_top20ngrams_{code}.tex")),
            &render_table_2(&panels),
        )?;
    }

    let matrix = TransmissionMatrix::from_frame(read_table(
        &fin.transmission_risk,
        &TRANSMISSION_CONTRACT,
    )?)?;
    let sources = config
        .analysis
        .table6_destinations
        .iter()
        .map(|destination| matrix.top_sources(destination))
        .collect::<TransRiskResult<Vec<_>>>()?;
    report.write_fragment(&tables.join(TABLE_6_SOURCES), &render_table_6(&sources))?;
    let destinations = config
        .analysis
        .table6_sources
        .iter()
        .map(|origin| matrix.top_destinations(origin))
        .collect::<TransRiskResult<Vec<_>>>()?;
    report.write_fragment(
        &tables.join(TABLE_6_DESTINATIONS),
        &render_table_6(&destinations),
    )?;

    let crises = prepare_table_7(
        read_table(&fin.table7, &OVERVIEW_CONTRACT)?,
        &config.analysis.table7_excluded,
    )?;
    report.write_fragment(&tables.join(TABLE_7), &render_table_7(&crises))?;
    Ok(())
}

/// Runs the external analysis stages, then renders every figure and table. With
/// `also_compile` the paper is compiled last.
pub fn run_analysis_stage(config: &Config, options: &RunOptions) -> TransRiskResult<StageReport> {
    let paper = match (options.also_compile, &config.general.paper) {
        (true, None) => {
            return Err(TransRiskError::InvalidConfig(
                "compiling the paper needs `general.paper`".into(),
            ))
        }
        (true, Some(paper)) => Some(paper),
        (false, _) => None,
    };
    let dirs = &config.directories;
    for dir in [&dirs.figures, &dirs.tables] {
        reset_dir(config, dir, options.clean_slate)?;
    }
    std::fs::create_dir_all(&dirs.logs)?;
    let mut inputs = config.analysis_inputs();
    if let Some(paper) = paper {
        inputs.push(MissingInput {
            name: "paper".into(),
            path: paper.clone(),
        });
    }
    check_inputs(inputs)?;
    let mut report = StageReport::new(Stage::Analysis);

    // Table 7 reads what these stages write
    report.external = stata(config).run_all(&config.analysis_stage.external)?;

    let specs = FigureSpecs::read(&config.analysis.figure_spec)?;
    for figure in prepare_figures(config, &specs)? {
        let output = render_figure(&figure, &dirs.figures, &specs.style)?;
        report.outputs.extend([output.svg, output.data]);
    }
    write_tables(config, &mut report)?;

    if let Some(paper) = paper {
        info!("Compiling {}", paper.display());
        let working_dir = paper.parent().unwrap_or(config.general.root.as_path());
        let latex = ExternalRunner::new(
            &config.general.latex_exec,
            &config.general.latex_args,
            working_dir,
        );
        let stage = ExternalStage {
            name: "paper".into(),
            script: paper.clone(),
            args: vec![],
            optional: false,
        };
        report.external.push(latex.run(&stage)?);
    }
    report.save(&dirs.logs)?;
    Ok(report)
}
