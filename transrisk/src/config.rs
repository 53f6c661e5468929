//! Pipeline configuration, read from TOML.
//!
//! Relative paths are resolved once, by [`Config::resolve`]: directories against
//! `general.root`, raw files against `directories.raw`, final datasets against
//! `directories.final`, and scripts and the figure definitions against the root.

use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::compustat::{Region, YearFiles};
use crate::error::{MissingInput, TransRiskError, TransRiskResult};
use crate::external::ExternalStage;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub general: General,
    pub directories: Directories,
    pub raw_data: RawData,
    pub final_data: FinalData,
    pub analysis: Analysis,
    #[serde(default)]
    pub data_stage: StageSet,
    #[serde(default)]
    pub analysis_stage: StageSet,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct General {
    pub root: PathBuf,
    pub stata_exec: PathBuf,
    #[serde(default = "default_stata_args")]
    pub stata_args: Vec<String>,
    #[serde(default = "default_latex_exec")]
    pub latex_exec: PathBuf,
    #[serde(default = "default_latex_args")]
    pub latex_args: Vec<String>,
    /// Document compiled with `--also-compile`.
    pub paper: Option<PathBuf>,
}

fn default_stata_args() -> Vec<String> {
    ["-q", "-b", "do"].map(String::from).to_vec()
}

fn default_latex_exec() -> PathBuf {
    "pdflatex".into()
}

fn default_latex_args() -> Vec<String> {
    [
        "-synctex=1",
        "-interaction=nonstopmode",
        "-file-line-error",
        "-recorder",
    ]
    .map(String::from)
    .to_vec()
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Directories {
    pub raw: PathBuf,
    #[serde(rename = "final")]
    pub final_data: PathBuf,
    pub temp: PathBuf,
    pub logs: PathBuf,
    pub figures: PathBuf,
    pub tables: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompustatFiles {
    /// File names with a `{year}` placeholder.
    pub global_marketcap: String,
    pub north_america_marketcap: String,
    pub global_companies: PathBuf,
    pub north_america_companies: PathBuf,
    pub first_year: i32,
    pub last_year: i32,
    /// Region whose copy of a firm's market cap is kept.
    #[serde(default)]
    pub marketcap_precedence: Region,
    /// Region whose registry entry is kept for a `gvkey` listed in both files.
    #[serde(default = "default_company_precedence")]
    pub company_precedence: Region,
}

fn default_company_precedence() -> Region {
    Region::Global
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawData {
    pub iso3: PathBuf,
    pub names: PathBuf,
    pub worldbank: PathBuf,
    pub scores: PathBuf,
    pub compustat: CompustatFiles,
    /// TF-IDF n-gram files, one table per file.
    #[serde(default)]
    pub tfidf: Vec<PathBuf>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FinalData {
    pub coverage: PathBuf,
    pub gdp: PathBuf,
    pub decomposed_fin: PathBuf,
    pub decomposed_hq: PathBuf,
    pub transmission_risk: PathBuf,
    pub transmission_risk_tau: PathBuf,
    pub worldscope: PathBuf,
    /// Written by an external analysis stage.
    pub table7: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub cutoff_year: i32,
    pub reference_country: String,
    pub figure_spec: PathBuf,
    pub table6_destinations: Vec<String>,
    pub table6_sources: Vec<String>,
    #[serde(default)]
    pub table7_excluded: Vec<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSet {
    #[serde(default)]
    pub external: Vec<ExternalStage>,
}

fn join(base: &Path, path: &mut PathBuf) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

fn input(name: &str, path: &Path) -> MissingInput {
    MissingInput {
        name: name.to_string(),
        path: path.to_path_buf(),
    }
}

impl Config {
    pub fn from_toml_str(contents: &str) -> TransRiskResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Reads `path` and resolves a relative root against the file's directory.
    pub fn read(path: &Path) -> TransRiskResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => TransRiskError::MissingInput(input("config", path)),
            _ => err.into(),
        })?;
        // External stages run elsewhere, so the root must not stay relative to the current directory
        let base = std::env::current_dir()?.join(path.parent().unwrap_or_else(|| Path::new("")));
        let config = Self::from_toml_str(&contents)?.resolve(&base);
        debug!("config: {config:?}");
        Ok(config)
    }

    /// Turns every relative path into an absolute one. Idempotent.
    pub fn resolve(mut self, base: &Path) -> Self {
        join(base, &mut self.general.root);
        let root = self.general.root.clone();
        if let Some(paper) = self.general.paper.as_mut() {
            join(&root, paper);
        }

        let dirs = &mut self.directories;
        for dir in [
            &mut dirs.raw,
            &mut dirs.final_data,
            &mut dirs.temp,
            &mut dirs.logs,
            &mut dirs.figures,
            &mut dirs.tables,
        ] {
            join(&root, dir);
        }

        let raw_dir = self.directories.raw.clone();
        let raw = &mut self.raw_data;
        for file in [
            &mut raw.iso3,
            &mut raw.names,
            &mut raw.worldbank,
            &mut raw.scores,
            &mut raw.compustat.global_companies,
            &mut raw.compustat.north_america_companies,
        ] {
            join(&raw_dir, file);
        }
        for file in raw.tfidf.iter_mut() {
            join(&raw_dir, file);
        }

        let final_dir = self.directories.final_data.clone();
        let fin = &mut self.final_data;
        for file in [
            &mut fin.coverage,
            &mut fin.gdp,
            &mut fin.decomposed_fin,
            &mut fin.decomposed_hq,
            &mut fin.transmission_risk,
            &mut fin.transmission_risk_tau,
            &mut fin.worldscope,
            &mut fin.table7,
        ] {
            join(&final_dir, file);
        }

        join(&root, &mut self.analysis.figure_spec);
        for stage in self
            .data_stage
            .external
            .iter_mut()
            .chain(self.analysis_stage.external.iter_mut())
        {
            join(&root, &mut stage.script);
        }
        self
    }

    /// The market cap files of every configured year.
    pub fn compustat_years(&self) -> Vec<YearFiles> {
        let compustat = &self.raw_data.compustat;
        let file = |template: &str, year: i32| {
            let name = template.replace("{year}", &year.to_string());
            let mut path = PathBuf::from(name);
            join(&self.directories.raw, &mut path);
            path
        };
        (compustat.first_year..=compustat.last_year)
            .map(|year| YearFiles {
                year,
                global: file(&compustat.global_marketcap, year),
                north_america: file(&compustat.north_america_marketcap, year),
            })
            .collect()
    }

    /// Raw inputs of the data stage.
    pub fn data_inputs(&self) -> Vec<MissingInput> {
        let raw = &self.raw_data;
        let mut inputs = vec![
            input("country identifiers (iso3)", &raw.iso3),
            input("country identifiers (names)", &raw.names),
            input("World Bank GDP", &raw.worldbank),
            input("scores", &raw.scores),
            input("Compustat global companies", &raw.compustat.global_companies),
            input(
                "Compustat North America companies",
                &raw.compustat.north_america_companies,
            ),
        ];
        for files in self.compustat_years() {
            inputs.push(input(
                &format!("Compustat global market cap {}", files.year),
                &files.global,
            ));
            inputs.push(input(
                &format!("Compustat North America market cap {}", files.year),
                &files.north_america,
            ));
        }
        inputs
    }

    /// Final datasets read by the analysis stage before its external stages run.
    pub fn analysis_inputs(&self) -> Vec<MissingInput> {
        let fin = &self.final_data;
        let mut inputs = vec![
            input("coverage", &fin.coverage),
            input("GDP shares", &fin.gdp),
            input("decomposed financial", &fin.decomposed_fin),
            input("decomposed headquarters", &fin.decomposed_hq),
            input("transmission risk", &fin.transmission_risk),
            input("transmission risk (crises)", &fin.transmission_risk_tau),
            input("worldscope segments", &fin.worldscope),
            input("figure definitions", &self.analysis.figure_spec),
        ];
        inputs.extend(self.raw_data.tfidf.iter().map(|file| input("tfidf", file)));
        inputs
    }
}

/// Fails with every input in `inputs` that does not exist.
pub fn check_inputs(inputs: Vec<MissingInput>) -> TransRiskResult<()> {
    let missing: Vec<MissingInput> = inputs
        .into_iter()
        .filter(|input| !input.path.exists())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(TransRiskError::MissingInputs(missing))
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    const CONFIG: &str = r#"
        [general]
        root = "project"
        stata_exec = "stata-mp"

        [directories]
        raw = "raw"
        final = "data/final"
        temp = "data/temp"
        logs = "data/logs"
        figures = "analysis/output/figures"
        tables = "analysis/output/tables"

        [raw_data]
        iso3 = "countryidentifiers/iso3.json"
        names = "countryidentifiers/names.json"
        worldbank = "worldbank/gdp.csv"
        scores = "scores/firm_country_quarter.csv"
        tfidf = ["tfidf/gr_tfidf.csv"]

        [raw_data.compustat]
        global_marketcap = "compustat/global_{year}.csv"
        north_america_marketcap = "compustat/na_{year}.csv"
        global_companies = "compustat/global_companies.csv"
        north_america_companies = "compustat/na_companies.csv"
        first_year = 2018
        last_year = 2019

        [final_data]
        coverage = "coverage.parquet"
        gdp = "worldbank_gdp_2019.csv"
        decomposed_fin = "decomposed_fin.parquet"
        decomposed_hq = "decomposed_hq.parquet"
        transmission_risk = "transmissionrisk.csv"
        transmission_risk_tau = "transmissionrisk_tau.csv"
        worldscope = "worldscope.csv"
        table7 = "table7_data.csv"

        [analysis]
        cutoff_year = 2020
        reference_country = "US"
        figure_spec = "config/figures.toml"
        table6_destinations = ["United States"]
        table6_sources = ["Greece"]
        table7_excluded = ["PL_1"]

        [[analysis_stage.external]]
        name = "table7_prepare"
        script = "analysis/code/stata/table7_prepare.do"
        args = ["{final}/transmissionrisk_tau.csv", "{final}/table7_data.csv"]
    "#;

    #[test]
    fn paths_resolve_against_their_directories() -> anyhow::Result<()> {
        let config = Config::from_toml_str(CONFIG)?.resolve(Path::new("/work"));
        assert_eq!(config.general.root, PathBuf::from("/work/project"));
        assert_eq!(config.general.stata_args, vec!["-q", "-b", "do"]);
        assert_eq!(config.general.latex_exec, PathBuf::from("pdflatex"));
        assert_eq!(
            config.raw_data.iso3,
            PathBuf::from("/work/project/raw/countryidentifiers/iso3.json")
        );
        assert_eq!(
            config.final_data.coverage,
            PathBuf::from("/work/project/data/final/coverage.parquet")
        );
        assert_eq!(
            config.analysis_stage.external[0].script,
            PathBuf::from("/work/project/analysis/code/stata/table7_prepare.do")
        );
        assert!(config.data_stage.external.is_empty());
        assert_eq!(config.raw_data.compustat.marketcap_precedence, Region::NorthAmerica);
        assert_eq!(config.raw_data.compustat.company_precedence, Region::Global);
        // Resolving twice changes nothing
        assert_eq!(config.clone().resolve(Path::new("/elsewhere")), config);
        Ok(())
    }

    #[test]
    fn compustat_years_fill_the_template() -> anyhow::Result<()> {
        let config = Config::from_toml_str(CONFIG)?.resolve(Path::new("/work"));
        let years = config.compustat_years();
        assert_eq!(years.len(), 2);
        assert_eq!(years[1].year, 2019);
        assert_eq!(
            years[1].north_america,
            PathBuf::from("/work/project/raw/compustat/na_2019.csv")
        );
        assert_eq!(config.data_inputs().len(), 6 + 2 * 2);
        Ok(())
    }

    #[test]
    fn missing_key_fails_at_parse_time() {
        let without_scores = CONFIG.replace("scores = \"scores/firm_country_quarter.csv\"", "");
        assert!(matches!(
            Config::from_toml_str(&without_scores),
            Err(TransRiskError::TomlError(_))
        ));
    }

    #[test]
    fn every_missing_input_is_reported() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let config = Config::from_toml_str(CONFIG)?.resolve(dir.path());
        let iso3 = &config.raw_data.iso3;
        std::fs::create_dir_all(iso3.parent().unwrap())?;
        std::fs::write(iso3, "{}")?;
        match check_inputs(config.data_inputs()) {
            Err(TransRiskError::MissingInputs(missing)) => {
                assert_eq!(missing.len(), 9);
                assert!(missing.iter().all(|input| &input.path != iso3));
            }
            other => panic!("expected missing inputs, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn config_file_is_read_relative_to_its_directory() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("transrisk.toml");
        std::fs::write(&path, CONFIG)?;
        let config = Config::read(&path)?;
        assert_eq!(config.general.root, dir.path().join("project"));
        assert!(matches!(
            Config::read(&dir.path().join("absent.toml")),
            Err(TransRiskError::MissingInput(_))
        ));
        Ok(())
    }

    #[test]
    fn shipped_config_parses() -> anyhow::Result<()> {
        let config = Config::from_toml_str(include_str!("../../config/transrisk.toml"))?
            .resolve(Path::new("/work/config"));
        assert_eq!(config.general.root, PathBuf::from("/work/config/.."));
        assert_eq!(config.compustat_years().len(), 19);
        assert_eq!(config.analysis.table6_destinations.len(), 10);
        assert_eq!(config.analysis.table6_sources.len(), 10);
        let optional: Vec<bool> = config
            .analysis_stage
            .external
            .iter()
            .map(|stage| stage.optional)
            .collect();
        assert_eq!(optional, vec![true, true, false]);
        Ok(())
    }
}
