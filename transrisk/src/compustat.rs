//! Compustat market capitalisation and company registry import.
//!
//! Security-level December observations are collapsed to one row per firm and year. The global
//! and North America files overlap, so a [`Region`] precedence decides which copy of a firm is
//! kept. Market cap prefers North America; the company registry keeps the global entry.

use std::path::PathBuf;

use log::{debug, info};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::error::TransRiskResult;
use crate::io::{read_table, ColumnContract, ColumnType};
use crate::merge::{ensure_unique, merge, How, MergeDiagnostics, MergeSpec, Validate};
use crate::COL;

/// Issue identifiers with a numeric part at or above this value are ADRs.
const ADR_IID_THRESHOLD: u32 = 90;
const ETF_SIC_CODES: [&str; 2] = ["6722", "6726"];
const ETF_NAICS_CODES: [&str; 2] = ["525910", "525990"];
const DECEMBER: i32 = 12;

const MARKETCAP_CONTRACT: ColumnContract = ColumnContract {
    dataset: "compustat security daily",
    columns: &[
        (COL::GVKEY, ColumnType::Text),
        (COL::IID, ColumnType::Text),
        (COL::DATADATE, ColumnType::Date),
        (COL::PRCCD, ColumnType::Float),
        (COL::EXCHANGE_RATE_TO_USD, ColumnType::Float),
        (COL::CSHOC, ColumnType::Float),
        (COL::MARKETCAP, ColumnType::Float),
    ],
};

const COMPANY_CONTRACT: ColumnContract = ColumnContract {
    dataset: "compustat company",
    columns: &[
        (COL::GVKEY, ColumnType::Text),
        (COL::CONM, ColumnType::Text),
        (COL::SIC, ColumnType::Text),
        (COL::NAICS, ColumnType::Text),
        (COL::LOC, ColumnType::Text),
    ],
};

#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Region {
    Global,
    #[default]
    NorthAmerica,
}

/// The market cap files for one year.
#[derive(Clone, Debug)]
pub struct YearFiles {
    pub year: i32,
    pub global: PathBuf,
    pub north_america: PathBuf,
}

/// First run of digits in an issue id, e.g. `91` in `91C`.
fn iid_number(iid: &str) -> Option<u32> {
    let digits: String = iid
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

/// `true` for issues that are not ADRs. Issue ids without digits are kept.
pub fn non_adr_mask(iids: &StringChunked) -> BooleanChunked {
    iids.into_iter()
        .map(|iid| {
            Some(
                iid.and_then(iid_number)
                    .map_or(true, |number| number < ADR_IID_THRESHOLD),
            )
        })
        .collect()
}

/// Collapses security-level observations to one row per firm: December observations only, ADRs
/// excluded, issues aggregated per date, and the last December date kept.
pub fn firm_marketcap(issues: DataFrame) -> TransRiskResult<DataFrame> {
    let december = issues
        .lazy()
        .filter(col(COL::DATADATE).dt().month().eq(lit(DECEMBER)))
        .collect()?;
    let mask = non_adr_mask(december.column(COL::IID)?.str()?);
    let december = december.filter(&mask)?;
    debug!("December non-ADR issues: {}", december.height());

    let firms = december
        .lazy()
        .sort_by_exprs(
            [col(COL::GVKEY), col(COL::IID), col(COL::DATADATE)],
            SortMultipleOptions::default(),
        )
        .group_by([col(COL::GVKEY), col(COL::DATADATE)])
        .agg([
            col(COL::MARKETCAP).sum().alias(COL::MARKETCAP_SUM),
            col(COL::MARKETCAP).median().alias(COL::MARKETCAP_MEDIAN),
            col(COL::PRCCD).drop_nulls().first(),
            col(COL::EXCHANGE_RATE_TO_USD).drop_nulls().first(),
            col(COL::CSHOC).drop_nulls().first(),
            col(COL::MARKETCAP)
                .drop_nulls()
                .first()
                .alias(COL::MARKETCAP_FIRST),
        ])
        .sort_by_exprs(
            [col(COL::GVKEY), col(COL::DATADATE)],
            SortMultipleOptions::default(),
        )
        .group_by([col(COL::GVKEY)])
        .agg([
            col(COL::DATADATE).last(),
            col(COL::MARKETCAP_SUM).last(),
            col(COL::MARKETCAP_MEDIAN).drop_nulls().last(),
            col(COL::PRCCD).drop_nulls().last(),
            col(COL::EXCHANGE_RATE_TO_USD).drop_nulls().last(),
            col(COL::CSHOC).drop_nulls().last(),
            col(COL::MARKETCAP_FIRST).drop_nulls().last(),
        ])
        .sort_by_exprs([col(COL::GVKEY)], SortMultipleOptions::default())
        .collect()?;
    Ok(firms)
}

fn ordered(global: LazyFrame, north_america: LazyFrame, precedence: Region) -> [LazyFrame; 2] {
    match precedence {
        Region::NorthAmerica => [north_america, global],
        Region::Global => [global, north_america],
    }
}

/// Combines both regions for one year. Firms of the preferred region replace the other
/// region's rows; only rows dated within `year` are kept.
pub fn combine_regions(
    global: DataFrame,
    north_america: DataFrame,
    year: i32,
    precedence: Region,
) -> TransRiskResult<DataFrame> {
    let [preferred, other] = ordered(global.lazy(), north_america.lazy(), precedence);
    let preferred = preferred.collect()?;
    let preferred_keys = preferred.column(COL::GVKEY)?.clone();
    let other_only = other.filter(
        col(COL::GVKEY)
            .is_in(lit(preferred_keys))
            .fill_null(lit(false))
            .not(),
    );
    let combined = concat([preferred.lazy(), other_only], UnionArgs::default())?
        .with_column(lit(year).alias(COL::YEAR))
        .filter(col(COL::DATADATE).dt().year().eq(lit(year)))
        .collect()?;
    Ok(combined)
}

/// Builds the firm-year market cap panel over all `years`.
pub fn import_marketcap(years: &[YearFiles], precedence: Region) -> TransRiskResult<DataFrame> {
    let mut frames = Vec::with_capacity(years.len());
    for files in years {
        let global = firm_marketcap(read_table(&files.global, &MARKETCAP_CONTRACT)?)?;
        let north_america = firm_marketcap(read_table(&files.north_america, &MARKETCAP_CONTRACT)?)?;
        let combined = combine_regions(global, north_america, files.year, precedence)?;
        info!("Market cap {}: {} firms", files.year, combined.height());
        frames.push(combined.lazy());
    }
    let marketcap = concat(frames, UnionArgs::default())?
        .unique_stable(None, UniqueKeepStrategy::First)
        .collect()?;
    info!("Market cap panel with shape: {:?}", marketcap.shape());
    Ok(marketcap)
}

/// Company registry deduplicated by `gvkey`, preferring the `precedence` region.
pub fn import_companies(
    global: &std::path::Path,
    north_america: &std::path::Path,
    precedence: Region,
) -> TransRiskResult<DataFrame> {
    let columns = COMPANY_CONTRACT
        .columns
        .iter()
        .map(|(name, _)| col(name))
        .collect::<Vec<_>>();
    let global = read_table(global, &COMPANY_CONTRACT)?
        .lazy()
        .select(columns.clone());
    let north_america = read_table(north_america, &COMPANY_CONTRACT)?
        .lazy()
        .select(columns);
    let companies = concat(ordered(global, north_america, precedence), UnionArgs::default())?
        .unique_stable(Some(vec![COL::GVKEY.to_string()]), UniqueKeepStrategy::First)
        .collect()?;
    ensure_unique(&companies, COMPANY_CONTRACT.dataset, &[COL::GVKEY])?;
    info!("Company registry with {} firms", companies.height());
    Ok(companies)
}

/// Attaches names and industry codes to the market cap panel and drops ETFs.
pub fn merge_compustat(
    marketcap: &DataFrame,
    companies: &DataFrame,
) -> TransRiskResult<(DataFrame, MergeDiagnostics)> {
    let (merged, diagnostics) = merge(
        marketcap,
        companies,
        &MergeSpec {
            name: "compustat names",
            left_name: "market cap",
            right_name: COMPANY_CONTRACT.dataset,
            left_on: &[COL::GVKEY],
            right_on: &[COL::GVKEY],
            how: How::Left,
            validate: Validate::ManyToOne,
            indicator: Some(COL::MERGE_NAMES),
        },
    )?;
    let before = merged.height();
    let etf_sic = Series::new("etf_sic", ETF_SIC_CODES);
    let etf_naics = Series::new("etf_naics", ETF_NAICS_CODES);
    let merged = merged
        .lazy()
        .filter(
            col(COL::SIC)
                .is_in(lit(etf_sic))
                .fill_null(lit(false))
                .not()
                .or(col(COL::NAICS)
                    .is_in(lit(etf_naics))
                    .fill_null(lit(false))
                    .not()),
        )
        .collect()?;
    info!("Dropped {} ETF firm-years", before - merged.height());
    Ok((merged, diagnostics))
}
