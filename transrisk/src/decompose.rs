//! Decomposition of the firm-country-quarter risk panel into country-quarter series by firm
//! sub-group.
//!
//! Two splits are supported:
//! - [`FirmGroup`]: financial firms (SIC codes starting with `6`) against all other firms. Each
//!   group's mean is weighted by the group's share of the observations, so the components add up
//!   to the country-quarter mean.
//! - [`HqGroup`]: firms headquartered in the analysis country against firms located abroad, for
//!   a single reference country.
//!
//! All series are expressed in units of a standard deviation of the country-quarter mean risk.

use chrono::{Datelike, NaiveDate};
use itertools::izip;
use log::{debug, info};
use polars::prelude::*;
use serde::Serialize;
use statrs::statistics::Statistics;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};

use crate::error::{TransRiskError, TransRiskResult};
use crate::io::{date_series, date_values, f64_values, str_values, ColumnContract, ColumnType};
use crate::COL;

/// Only periods before this year enter the normalising standard deviation.
pub const CUTOFF_YEAR: i32 = 2020;
pub const FINANCIAL_SIC_PREFIX: &str = "6";

pub const SCORES_CONTRACT: ColumnContract = ColumnContract {
    dataset: "scores",
    columns: &[
        (COL::GVKEY, ColumnType::Text),
        (COL::COUNTRY_ISO2, ColumnType::Text),
        (COL::SIC, ColumnType::Text),
        (COL::DATE_Q, ColumnType::Date),
        (COL::RISK, ColumnType::Float),
        (COL::LOC_ISO2, ColumnType::Text),
    ],
};

// Intermediate aggregate columns
const IN_GROUP: &str = "__in_group";
const TOTAL_OBS: &str = "__total_obs";
const TOTAL_MEAN: &str = "__total_mean";
const IN_OBS: &str = "__in_obs";
const IN_MEAN: &str = "__in_mean";
const OUT_OBS: &str = "__out_obs";
const OUT_MEAN: &str = "__out_mean";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize)]
pub enum FirmGroup {
    Financial,
    NonFinancial,
}

impl FirmGroup {
    pub fn of_sic(sic: Option<&str>) -> Self {
        match sic {
            Some(code) if code.starts_with(FINANCIAL_SIC_PREFIX) => FirmGroup::Financial,
            _ => FirmGroup::NonFinancial,
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            FirmGroup::Financial => COL::RISK_FIN,
            FirmGroup::NonFinancial => COL::RISK_NFIN,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Display, EnumIter, Serialize)]
pub enum HqGroup {
    Domestic,
    Foreign,
}

impl HqGroup {
    pub fn column(self) -> &'static str {
        match self {
            HqGroup::Domestic => COL::RISK_HQ,
            HqGroup::Foreign => COL::RISK_NHQ,
        }
    }
}

/// A (country, quarter) cell of the panel.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct CountryPeriod {
    pub country: String,
    pub period: NaiveDate,
}

/// Contribution of one sub-group to a country-quarter aggregate.
#[derive(Clone, Debug, PartialEq)]
pub struct GroupComponent<G> {
    pub group: G,
    pub observations: usize,
    /// Share of the cell's observations belonging to the group.
    pub share: f64,
    /// `share * mean(risk | group)`, missing when the group has no observations.
    pub weighted_mean: Option<f64>,
}

impl<G> GroupComponent<G> {
    fn new(group: G, observations: usize, total: usize, mean: Option<f64>) -> Self {
        let share = if total == 0 {
            0.0
        } else {
            observations as f64 / total as f64
        };
        let weighted_mean = if observations == 0 {
            None
        } else {
            mean.map(|mean| share * mean)
        };
        Self {
            group,
            observations,
            share,
            weighted_mean,
        }
    }

    fn scaled(self, sd: f64) -> Self {
        Self {
            weighted_mean: self.weighted_mean.map(|v| v / sd),
            ..self
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FinancialDecomposition {
    pub key: CountryPeriod,
    pub components: [GroupComponent<FirmGroup>; 2],
    /// Sum of the components present in the cell.
    pub risk: Option<f64>,
}

impl FinancialDecomposition {
    pub fn component(&self, group: FirmGroup) -> &GroupComponent<FirmGroup> {
        match group {
            FirmGroup::Financial => &self.components[0],
            FirmGroup::NonFinancial => &self.components[1],
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct HeadquartersDecomposition {
    pub key: CountryPeriod,
    pub domestic: Option<f64>,
    pub foreign: Option<f64>,
    pub risk: Option<f64>,
}

impl HeadquartersDecomposition {
    pub fn group(&self, group: HqGroup) -> Option<f64> {
        match group {
            HqGroup::Domestic => self.domestic,
            HqGroup::Foreign => self.foreign,
        }
    }
}

/// Observation counts and means of a cell, overall and split by a boolean flag.
#[derive(Clone, Debug)]
struct CellStats {
    key: CountryPeriod,
    total: usize,
    mean: Option<f64>,
    in_group: (usize, Option<f64>),
    out_group: (usize, Option<f64>),
}

fn count(value: Option<f64>) -> usize {
    value.map_or(0, |v| v as usize)
}

fn cell_stats(scores: &DataFrame, in_group: Expr) -> TransRiskResult<Vec<CellStats>> {
    let risk_in = || col(COL::RISK).filter(col(IN_GROUP));
    let risk_out = || col(COL::RISK).filter(col(IN_GROUP).not());
    let cells = scores
        .clone()
        .lazy()
        .filter(
            col(COL::COUNTRY_ISO2)
                .is_not_null()
                .and(col(COL::DATE_Q).is_not_null()),
        )
        .with_column(in_group.fill_null(lit(false)).alias(IN_GROUP))
        .group_by([col(COL::COUNTRY_ISO2), col(COL::DATE_Q)])
        .agg([
            col(COL::RISK).count().alias(TOTAL_OBS),
            col(COL::RISK).mean().alias(TOTAL_MEAN),
            risk_in().count().alias(IN_OBS),
            risk_in().mean().alias(IN_MEAN),
            risk_out().count().alias(OUT_OBS),
            risk_out().mean().alias(OUT_MEAN),
        ])
        .sort_by_exprs(
            [col(COL::COUNTRY_ISO2), col(COL::DATE_Q)],
            SortMultipleOptions::default(),
        )
        .collect()?;
    debug!("Country-quarter cells: {}", cells.height());

    let mut stats = Vec::with_capacity(cells.height());
    for (country, period, total, mean, in_obs, in_mean, out_obs, out_mean) in izip!(
        str_values(&cells, COL::COUNTRY_ISO2)?,
        date_values(&cells, COL::DATE_Q)?,
        f64_values(&cells, TOTAL_OBS)?,
        f64_values(&cells, TOTAL_MEAN)?,
        f64_values(&cells, IN_OBS)?,
        f64_values(&cells, IN_MEAN)?,
        f64_values(&cells, OUT_OBS)?,
        f64_values(&cells, OUT_MEAN)?,
    ) {
        let (Some(country), Some(period)) = (country, period) else {
            continue;
        };
        stats.push(CellStats {
            key: CountryPeriod { country, period },
            total: count(total),
            mean,
            in_group: (count(in_obs), in_mean),
            out_group: (count(out_obs), out_mean),
        });
    }
    Ok(stats)
}

/// Sample standard deviation, rejecting undefined or zero values.
fn nonzero_sd(values: &[f64], context: &str) -> TransRiskResult<f64> {
    let sd = values.std_dev();
    if sd.is_finite() && sd > 0.0 {
        Ok(sd)
    } else {
        Err(TransRiskError::ZeroStandardDeviation {
            context: context.to_string(),
        })
    }
}

/// Standard deviation of the country-quarter mean risk over quarters before `cutoff_year`.
fn reference_sd(cells: &[CellStats], cutoff_year: i32) -> TransRiskResult<f64> {
    let means: Vec<f64> = cells
        .iter()
        .filter(|cell| cell.key.period.year() < cutoff_year)
        .filter_map(|cell| cell.mean)
        .collect();
    nonzero_sd(&means, &format!("country-quarter risk before {cutoff_year}"))
}

/// Financial / non-financial decomposition of every country-quarter cell.
pub fn decompose_financial(
    scores: &DataFrame,
    cutoff_year: i32,
) -> TransRiskResult<Vec<FinancialDecomposition>> {
    let scores = SCORES_CONTRACT.conform(scores.clone())?;
    let is_financial = col(COL::SIC).str().starts_with(lit(FINANCIAL_SIC_PREFIX));
    let cells = cell_stats(&scores, is_financial)?;
    let sd = reference_sd(&cells, cutoff_year)?;
    info!("Normalising financial decomposition by sd = {sd:.4}");

    Ok(cells
        .into_iter()
        .map(|cell| {
            let components = [
                GroupComponent::new(
                    FirmGroup::Financial,
                    cell.in_group.0,
                    cell.total,
                    cell.in_group.1,
                ),
                GroupComponent::new(
                    FirmGroup::NonFinancial,
                    cell.out_group.0,
                    cell.total,
                    cell.out_group.1,
                ),
            ];
            let risk = components
                .iter()
                .filter_map(|component| component.weighted_mean)
                .fold(None, |sum, value| Some(sum.unwrap_or(0.0) + value));
            FinancialDecomposition {
                key: cell.key,
                components: components.map(|component| component.scaled(sd)),
                risk: risk.map(|risk| risk / sd),
            }
        })
        .collect())
}

/// Domestic / foreign headquarters decomposition of `reference_country`. The foreign series is
/// shifted to the domestic series' mean before normalising.
pub fn decompose_headquarters(
    scores: &DataFrame,
    reference_country: &str,
) -> TransRiskResult<Vec<HeadquartersDecomposition>> {
    let scores = SCORES_CONTRACT.conform(scores.clone())?;
    let scores = scores
        .lazy()
        .filter(col(COL::COUNTRY_ISO2).eq(lit(reference_country)))
        .collect()?;
    let is_domestic = col(COL::COUNTRY_ISO2).eq(col(COL::LOC_ISO2));
    let cells = cell_stats(&scores, is_domestic)?;

    let domestic: Vec<f64> = cells.iter().filter_map(|cell| cell.in_group.1).collect();
    let foreign: Vec<f64> = cells.iter().filter_map(|cell| cell.out_group.1).collect();
    let shift = if domestic.is_empty() || foreign.is_empty() {
        0.0
    } else {
        domestic.as_slice().mean() - foreign.as_slice().mean()
    };
    let risk: Vec<f64> = cells.iter().filter_map(|cell| cell.mean).collect();
    let sd = nonzero_sd(&risk, &format!("{reference_country} country-quarter risk"))?;
    info!("Headquarters decomposition for {reference_country}: shift = {shift:.4}, sd = {sd:.4}");

    Ok(cells
        .into_iter()
        .map(|cell| HeadquartersDecomposition {
            key: cell.key,
            domestic: cell.in_group.1.map(|v| v / sd),
            foreign: cell.out_group.1.map(|v| (v + shift) / sd),
            risk: cell.mean.map(|v| v / sd),
        })
        .collect())
}

fn key_columns(keys: Vec<&CountryPeriod>) -> TransRiskResult<Vec<Series>> {
    let countries: Vec<&str> = keys.iter().map(|key| key.country.as_str()).collect();
    let periods: Vec<NaiveDate> = keys.iter().map(|key| key.period).collect();
    Ok(vec![
        Series::new(COL::COUNTRY_ISO2, countries),
        date_series(COL::DATE_Q, &periods)?,
    ])
}

/// `country_iso2, dateQ, risk_fin, risk_nfin, risk`
pub fn financial_frame(rows: &[FinancialDecomposition]) -> TransRiskResult<DataFrame> {
    let mut columns = key_columns(rows.iter().map(|row| &row.key).collect())?;
    for group in FirmGroup::iter() {
        let values: Vec<Option<f64>> = rows
            .iter()
            .map(|row| row.component(group).weighted_mean)
            .collect();
        columns.push(Series::new(group.column(), values));
    }
    let risk: Vec<Option<f64>> = rows.iter().map(|row| row.risk).collect();
    columns.push(Series::new(COL::RISK, risk));
    Ok(DataFrame::new(columns)?)
}

/// `country_iso2, dateQ, risk_hq, risk_nhq, risk`
pub fn headquarters_frame(rows: &[HeadquartersDecomposition]) -> TransRiskResult<DataFrame> {
    let mut columns = key_columns(rows.iter().map(|row| &row.key).collect())?;
    for group in HqGroup::iter() {
        let values: Vec<Option<f64>> = rows.iter().map(|row| row.group(group)).collect();
        columns.push(Series::new(group.column(), values));
    }
    let risk: Vec<Option<f64>> = rows.iter().map(|row| row.risk).collect();
    columns.push(Series::new(COL::RISK, risk));
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    struct Firm<'a> {
        gvkey: &'a str,
        country: &'a str,
        loc: &'a str,
        sic: Option<&'a str>,
        date: &'a str,
        risk: Option<f64>,
    }

    fn panel(firms: &[Firm]) -> DataFrame {
        let dates: Vec<NaiveDate> = firms
            .iter()
            .map(|f| NaiveDate::parse_from_str(f.date, "%Y-%m-%d").unwrap())
            .collect();
        DataFrame::new(vec![
            Series::new(COL::GVKEY, firms.iter().map(|f| f.gvkey).collect::<Vec<_>>()),
            Series::new(COL::COUNTRY_ISO2, firms.iter().map(|f| f.country).collect::<Vec<_>>()),
            Series::new(COL::SIC, firms.iter().map(|f| f.sic).collect::<Vec<_>>()),
            date_series(COL::DATE_Q, &dates).unwrap(),
            Series::new(COL::RISK, firms.iter().map(|f| f.risk).collect::<Vec<_>>()),
            Series::new(COL::LOC_ISO2, firms.iter().map(|f| f.loc).collect::<Vec<_>>()),
        ])
        .unwrap()
    }

    fn firm<'a>(gvkey: &'a str, country: &'a str, sic: &'a str, date: &'a str, risk: f64) -> Firm<'a> {
        Firm {
            gvkey,
            country,
            loc: country,
            sic: Some(sic),
            date,
            risk: Some(risk),
        }
    }

    /// Three financial firms and one non-financial firm in a quarter, plus a second country so
    /// the normalising standard deviation is defined.
    fn mixed_panel() -> DataFrame {
        panel(&[
            firm("1", "DE", "6020", "2019-01-01", 1.0),
            firm("2", "DE", "6211", "2019-01-01", 2.0),
            firm("3", "DE", "6311", "2019-01-01", 3.0),
            firm("4", "DE", "2834", "2019-01-01", 6.0),
            firm("5", "FR", "6020", "2019-01-01", 1.0),
            firm("6", "FR", "2834", "2019-01-01", 3.0),
        ])
    }

    #[test]
    fn weighted_components_add_up_to_cell_mean() -> anyhow::Result<()> {
        let rows = decompose_financial(&mixed_panel(), CUTOFF_YEAR)?;
        let de = &rows[0];
        assert_eq!(de.key.country, "DE");
        // Cell means are 3.0 (DE) and 2.0 (FR)
        let sd = [3.0, 2.0].std_dev();
        let fin = de.component(FirmGroup::Financial);
        let nfin = de.component(FirmGroup::NonFinancial);
        assert_eq!(fin.observations, 3);
        assert_relative_eq!(fin.share, 0.75);
        assert_relative_eq!(nfin.share, 0.25);
        assert_relative_eq!(fin.weighted_mean.unwrap(), 0.75 * 2.0 / sd);
        assert_relative_eq!(nfin.weighted_mean.unwrap(), 0.25 * 6.0 / sd);
        assert_relative_eq!(de.risk.unwrap(), 3.0 / sd);
        Ok(())
    }

    #[test]
    fn normalised_series_has_unit_sd_before_cutoff() -> anyhow::Result<()> {
        let mut firms = Vec::new();
        let dates = ["2017-01-01", "2018-04-01", "2019-07-01", "2020-01-01"];
        let values = [
            [1.0, 4.0, 2.5],
            [7.0, 2.0, 0.5],
            [3.0, 3.0, 9.0],
            [40.0, 1.0, 1.0],
        ];
        for (date, risks) in dates.iter().zip(values) {
            for (i, risk) in risks.into_iter().enumerate() {
                let sic = if i == 0 { "6020" } else { "3711" };
                firms.push(firm("1", "US", sic, date, risk));
                firms.push(firm("2", "JP", "6020", date, risk * 2.0 + i as f64));
            }
        }
        let rows = decompose_financial(&panel(&firms), CUTOFF_YEAR)?;
        let before_cutoff: Vec<f64> = rows
            .iter()
            .filter(|row| row.key.period.year() < CUTOFF_YEAR)
            .filter_map(|row| row.risk)
            .collect();
        assert_eq!(before_cutoff.len(), 6);
        assert_relative_eq!(before_cutoff.std_dev(), 1.0, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn empty_group_has_zero_weight() -> anyhow::Result<()> {
        let df = panel(&[
            firm("1", "DE", "2834", "2019-01-01", 2.0),
            firm("2", "DE", "3711", "2019-01-01", 4.0),
            firm("3", "FR", "6020", "2019-01-01", 1.0),
        ]);
        let rows = decompose_financial(&df, CUTOFF_YEAR)?;
        let sd = [3.0, 1.0].std_dev();
        let de = &rows[0];
        let fin = de.component(FirmGroup::Financial);
        assert_eq!(fin.observations, 0);
        assert_eq!(fin.share, 0.0);
        assert_eq!(fin.weighted_mean, None);
        assert_relative_eq!(de.risk.unwrap(), 3.0 / sd);
        // France only has financial firms
        let fr = &rows[1];
        assert_eq!(fr.component(FirmGroup::NonFinancial).weighted_mean, None);
        assert_relative_eq!(fr.risk.unwrap(), 1.0 / sd);
        Ok(())
    }

    #[test]
    fn missing_sic_counts_as_non_financial() {
        assert_eq!(FirmGroup::of_sic(None), FirmGroup::NonFinancial);
        assert_eq!(FirmGroup::of_sic(Some("6798")), FirmGroup::Financial);
        assert_eq!(FirmGroup::of_sic(Some("0100")), FirmGroup::NonFinancial);
    }

    #[test]
    fn constant_panel_is_rejected() {
        let df = panel(&[
            firm("1", "DE", "6020", "2019-01-01", 2.0),
            firm("2", "FR", "6020", "2019-01-01", 2.0),
        ]);
        let err = decompose_financial(&df, CUTOFF_YEAR).unwrap_err();
        assert!(matches!(err, TransRiskError::ZeroStandardDeviation { .. }));
    }

    #[test]
    fn missing_column_is_reported() {
        let df = mixed_panel().drop(COL::SIC).unwrap();
        let err = decompose_financial(&df, CUTOFF_YEAR).unwrap_err();
        assert!(matches!(err, TransRiskError::MissingColumn { ref column, .. } if column == "sic"));
    }

    #[test]
    fn headquarters_split_is_shifted_and_scaled() -> anyhow::Result<()> {
        fn abroad<'a>(gvkey: &'a str, date: &'a str, risk: f64) -> Firm<'a> {
            Firm {
                gvkey,
                country: "US",
                loc: "GB",
                sic: None,
                date,
                risk: Some(risk),
            }
        }
        let df = panel(&[
            firm("1", "US", "2834", "2008-01-01", 2.0),
            firm("2", "US", "2834", "2008-01-01", 4.0),
            abroad("3", "2008-01-01", 1.0),
            firm("1", "US", "2834", "2008-04-01", 5.0),
            abroad("3", "2008-04-01", 3.0),
            abroad("4", "2008-04-01", 5.0),
            firm("5", "DE", "2834", "2008-04-01", 100.0),
        ]);
        let rows = decompose_headquarters(&df, "US")?;
        assert_eq!(rows.len(), 2);
        let sd = 2.0_f64.sqrt();
        assert_relative_eq!(rows[0].domestic.unwrap(), 3.0 / sd);
        assert_relative_eq!(rows[0].foreign.unwrap(), 2.5 / sd);
        assert_relative_eq!(rows[0].risk.unwrap(), 7.0 / 3.0 / sd);
        assert_relative_eq!(rows[1].foreign.unwrap(), 5.5 / sd);

        let frame = headquarters_frame(&rows)?;
        assert_eq!(
            frame.get_column_names(),
            vec!["country_iso2", "dateQ", "risk_hq", "risk_nhq", "risk"]
        );
        Ok(())
    }
}
