//! Reading and writing of tabular files, plus the column contracts each importer declares.

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

use chrono::NaiveDate;
use log::debug;
use polars::prelude::*;
use strum_macros::{Display, EnumString};

use crate::error::{MissingInput, TransRiskError, TransRiskResult};

/// Days between 0001-01-01 and 1970-01-01, used to convert polars dates to chrono.
const EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString, Display)]
#[strum(ascii_case_insensitive)]
pub enum TableFormat {
    #[strum(serialize = "csv")]
    Csv,
    #[strum(serialize = "parquet", serialize = "pq")]
    Parquet,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> TransRiskResult<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| TableFormat::from_str(ext).ok())
            .ok_or_else(|| TransRiskError::UnsupportedFormat(path.to_path_buf()))
    }
}

/// Logical type of a column in a contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Float,
    Int,
    Date,
}

impl ColumnType {
    fn dtype(self) -> DataType {
        match self {
            ColumnType::Text => DataType::String,
            ColumnType::Float => DataType::Float64,
            ColumnType::Int => DataType::Int32,
            ColumnType::Date => DataType::Date,
        }
    }
}

/// The columns (and their types) a component requires from a dataset.
#[derive(Clone, Copy, Debug)]
pub struct ColumnContract {
    pub dataset: &'static str,
    pub columns: &'static [(&'static str, ColumnType)],
}

impl ColumnContract {
    /// Checks that every column is present and casts it to its declared type. Columns outside
    /// the contract are kept untouched.
    pub fn conform(&self, mut df: DataFrame) -> TransRiskResult<DataFrame> {
        require_columns(&df, self.dataset, self.columns.iter().map(|(name, _)| *name))?;
        for (name, column_type) in self.columns {
            let series = df.column(name)?;
            let target = column_type.dtype();
            if series.dtype() == &target {
                continue;
            }
            let converted = match (column_type, series.dtype()) {
                (ColumnType::Date, DataType::String) => series
                    .str()?
                    .as_date(Some("%Y-%m-%d"), false)?
                    .into_series(),
                (ColumnType::Date, DataType::Datetime(_, _)) => series.cast(&DataType::Date)?,
                _ => series.cast(&target)?,
            };
            df.with_column(converted)?;
        }
        Ok(df)
    }
}

/// Returns a `MissingColumn` error for the first required column not found in `df`.
pub fn require_columns<'a, I>(df: &DataFrame, dataset: &str, columns: I) -> TransRiskResult<()>
where
    I: IntoIterator<Item = &'a str>,
{
    let present = df.get_column_names();
    for column in columns {
        if !present.contains(&column) {
            return Err(TransRiskError::MissingColumn {
                dataset: dataset.to_string(),
                column: column.to_string(),
            });
        }
    }
    Ok(())
}

pub fn require_file(name: &str, path: &Path) -> TransRiskResult<()> {
    if path.exists() {
        Ok(())
    } else {
        Err(TransRiskError::MissingInput(MissingInput {
            name: name.to_string(),
            path: path.to_path_buf(),
        }))
    }
}

/// Reads a CSV or Parquet file (chosen by extension) and conforms it to `contract`.
///
/// CSV files are read untyped so that codes such as `gvkey` or `sic` keep their leading zeros;
/// the contract then casts the columns it names. Values that fail to cast (e.g. `..` in World
/// Bank downloads) become missing.
pub fn read_table(path: &Path, contract: &ColumnContract) -> TransRiskResult<DataFrame> {
    require_file(contract.dataset, path)?;
    let df = match TableFormat::from_path(path)? {
        TableFormat::Csv => LazyCsvReader::new(path)
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .finish()?
            .collect()?,
        TableFormat::Parquet => {
            LazyFrame::scan_parquet(path, ScanArgsParquet::default())?.collect()?
        }
    };
    debug!(
        "Read `{}` from {} with shape: {:?}",
        contract.dataset,
        path.display(),
        df.shape()
    );
    contract.conform(df)
}

/// Writes `df` to `path`, choosing the format from the extension.
pub fn write_table(path: &Path, df: &mut DataFrame) -> TransRiskResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    match TableFormat::from_path(path)? {
        TableFormat::Csv => CsvWriter::new(file).include_header(true).finish(df)?,
        TableFormat::Parquet => {
            ParquetWriter::new(file)
                .with_compression(ParquetCompression::Zstd(None))
                .finish(df)?;
        }
    }
    debug!("Wrote {} with shape: {:?}", path.display(), df.shape());
    Ok(())
}

/// Reads a JSON object mapping string keys to string values.
pub fn read_json_mapping(name: &str, path: &Path) -> TransRiskResult<BTreeMap<String, String>> {
    require_file(name, path)?;
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn str_values(df: &DataFrame, name: &str) -> TransRiskResult<Vec<Option<String>>> {
    let series = df.column(name)?.cast(&DataType::String)?;
    Ok(series
        .str()?
        .into_iter()
        .map(|value| value.map(str::to_string))
        .collect())
}

pub fn f64_values(df: &DataFrame, name: &str) -> TransRiskResult<Vec<Option<f64>>> {
    let series = df.column(name)?.cast(&DataType::Float64)?;
    Ok(series
        .f64()?
        .into_iter()
        .map(|value| value.filter(|v| !v.is_nan()))
        .collect())
}

pub fn i32_values(df: &DataFrame, name: &str) -> TransRiskResult<Vec<Option<i32>>> {
    let series = df.column(name)?.cast(&DataType::Int32)?;
    Ok(series.i32()?.into_iter().collect())
}

pub fn date_values(df: &DataFrame, name: &str) -> TransRiskResult<Vec<Option<NaiveDate>>> {
    let series = df.column(name)?.cast(&DataType::Int32)?;
    Ok(series
        .i32()?
        .into_iter()
        .map(|days| days.and_then(date_from_epoch_days))
        .collect())
}

pub fn date_from_epoch_days(days: i32) -> Option<NaiveDate> {
    NaiveDate::from_num_days_from_ce_opt(days + EPOCH_DAYS_FROM_CE)
}

pub fn epoch_days(date: NaiveDate) -> i32 {
    chrono::Datelike::num_days_from_ce(&date) - EPOCH_DAYS_FROM_CE
}

/// Builds a polars `Date` series from chrono dates.
pub fn date_series(name: &str, dates: &[NaiveDate]) -> TransRiskResult<Series> {
    let days: Vec<i32> = dates.iter().copied().map(epoch_days).collect();
    Ok(Series::new(name, days).cast(&DataType::Date)?)
}
