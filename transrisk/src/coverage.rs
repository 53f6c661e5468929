//! Firm-year coverage: which Compustat firms appear in the earnings-call sample, and where.

use log::info;
use polars::prelude::*;

use crate::error::TransRiskResult;
use crate::identifiers::CountryIdentifiers;
use crate::io::{ColumnContract, ColumnType};
use crate::merge::{merge, How, MergeDiagnostics, MergeSpec, Validate};
use crate::COL;

pub const SAMPLE_CONTRACT: ColumnContract = ColumnContract {
    dataset: "scores",
    columns: &[
        (COL::GVKEY, ColumnType::Text),
        (COL::COUNTRY_NAME, ColumnType::Text),
        (COL::LOC_ISO2, ColumnType::Text),
        (COL::LOC_CNAME, ColumnType::Text),
        (COL::DATE_Q, ColumnType::Date),
    ],
};

/// Firm-year view of the scores panel with the last known headquarters location. `our_countries`
/// flags locations that are also analysis countries of the panel.
pub fn our_sample(scores: DataFrame) -> TransRiskResult<DataFrame> {
    let scores = SAMPLE_CONTRACT.conform(scores)?;
    let countries = scores
        .column(COL::COUNTRY_NAME)?
        .drop_nulls()
        .unique_stable()?;
    let sample = scores
        .lazy()
        // `country_name` is not part of the firm-year record and may be missing
        .select([
            col(COL::GVKEY),
            col(COL::LOC_ISO2),
            col(COL::LOC_CNAME),
            col(COL::DATE_Q),
        ])
        .with_column(col(COL::DATE_Q).dt().year().alias(COL::YEAR))
        .drop_nulls(None)
        .sort_by_exprs(
            [col(COL::GVKEY), col(COL::DATE_Q)],
            SortMultipleOptions::default(),
        )
        .group_by([col(COL::GVKEY), col(COL::YEAR)])
        .agg([col(COL::LOC_ISO2).last(), col(COL::LOC_CNAME).last()])
        .with_column(
            col(COL::LOC_CNAME)
                .is_in(lit(countries))
                .fill_null(lit(false))
                .alias(COL::OUR_COUNTRIES),
        )
        .sort_by_exprs(
            [col(COL::GVKEY), col(COL::YEAR)],
            SortMultipleOptions::default(),
        )
        .collect()?;
    info!("Our sample with shape: {:?}", sample.shape());
    Ok(sample)
}

/// Joins the Compustat panel with country names and the earnings-call sample.
pub fn coverage_data(
    compustat: &DataFrame,
    identifiers: &CountryIdentifiers,
    sample: &DataFrame,
) -> TransRiskResult<(DataFrame, Vec<MergeDiagnostics>)> {
    let mut diagnostics = Vec::with_capacity(3);

    let (names, merged) = merge(
        &identifiers.iso2_to_name,
        &identifiers.iso2_to_iso3,
        &MergeSpec {
            name: "iso2 names",
            left_name: "iso2 to name",
            right_name: "iso2 to iso3",
            left_on: &[COL::ISO2],
            right_on: &[COL::ISO2],
            how: How::Inner,
            validate: Validate::OneToOne,
            indicator: None,
        },
    )?;
    diagnostics.push(merged);

    let (mut named, merged) = merge(
        compustat,
        &names,
        &MergeSpec {
            name: "compustat countries",
            left_name: "compustat",
            right_name: "iso2 names",
            left_on: &[COL::LOC],
            right_on: &[COL::ISO3],
            how: How::Inner,
            validate: Validate::ManyToOne,
            indicator: Some(COL::MERGE_ISO2_TO_NAMES),
        },
    )?;
    diagnostics.push(merged);
    named.rename(COL::COUNTRY_NAME, COL::COUNTRY_COMPUSTAT)?;

    let (mut coverage, merged) = merge(
        sample,
        &named,
        &MergeSpec {
            name: "coverage",
            left_name: "our sample",
            right_name: "compustat",
            left_on: &[COL::GVKEY, COL::YEAR],
            right_on: &[COL::GVKEY, COL::YEAR],
            how: How::Full,
            validate: Validate::OneToOne,
            indicator: Some(COL::MERGE_COMPUSTAT),
        },
    )?;
    diagnostics.push(merged);
    coverage.rename(COL::LOC_CNAME, COL::COUNTRY_EARNINGSCALLS)?;
    coverage.rename(COL::LOC_ISO2, COL::COUNTRYISO2_EARNINGSCALLS)?;

    let sample_countries = sample
        .clone()
        .lazy()
        .filter(col(COL::OUR_COUNTRIES))
        .select([col(COL::LOC_CNAME).unique_stable()])
        .collect()?
        .column(COL::LOC_CNAME)?
        .clone();
    let coverage = coverage
        .lazy()
        .with_columns([
            col(COL::COUNTRY_EARNINGSCALLS)
                .fill_null(col(COL::COUNTRY_COMPUSTAT))
                .alias(COL::COUNTRY_COMBINED),
            col(COL::COUNTRY_EARNINGSCALLS)
                .is_in(lit(sample_countries))
                .fill_null(lit(false))
                .alias(COL::OUR_COUNTRIES),
        ])
        .sort_by_exprs(
            [col(COL::GVKEY), col(COL::YEAR)],
            SortMultipleOptions::default(),
        )
        .collect()?;
    info!("Coverage data with shape: {:?}", coverage.shape());
    Ok((coverage, diagnostics))
}
