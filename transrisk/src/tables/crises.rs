//! Table 7: overview of all estimated crises.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use itertools::izip;
use polars::prelude::*;

use crate::error::{TransRiskError, TransRiskResult};
use crate::io::{f64_values, str_values, ColumnContract, ColumnType};
use crate::tables::stars;
use crate::COL;

pub const OVERVIEW_CONTRACT: ColumnContract = ColumnContract {
    dataset: "crisis overview",
    columns: &[
        (COL::CRISIS_ABBREV, ColumnType::Text),
        (COL::COUNTRY_NAME, ColumnType::Text),
        (COL::LABEL, ColumnType::Text),
        (COL::ALPHA, ColumnType::Float),
        (COL::ALPHA_FIN_P, ColumnType::Float),
        (COL::YPRED_XMED_ALL, ColumnType::Float),
        (COL::RATIO, ColumnType::Float),
        (COL::BETA_ALL, ColumnType::Float),
        (COL::PVAL_ALL, ColumnType::Float),
        (COL::R2, ColumnType::Float),
    ],
};

#[derive(Clone, Debug, PartialEq)]
pub struct CrisisRow {
    pub country_iso2: String,
    pub crisis_nr: String,
    pub country_name: String,
    pub label: String,
    pub ypred_xmed_all: Option<f64>,
    pub beta_all: Option<f64>,
    pub pval_all: Option<f64>,
    pub r2: Option<f64>,
    pub ratio: Option<f64>,
    pub alpha_fin_p: Option<f64>,
}

impl CrisisRow {
    pub fn abbrev(&self) -> String {
        format!("{}_{}", self.country_iso2, self.crisis_nr)
    }
}

fn split_abbrev(abbrev: &str) -> TransRiskResult<(String, String)> {
    abbrev
        .split_once('_')
        .map(|(country, nr)| (country.to_string(), nr.to_string()))
        .ok_or_else(|| {
            TransRiskError::DataContract(format!("crisis abbreviation `{abbrev}` is not `CC_N`"))
        })
}

/// Labelled, estimated crises minus `excluded` (abbreviations such as `PL_1`), sorted by the
/// predicted risk for the median destination.
pub fn prepare_table_7(df: DataFrame, excluded: &[String]) -> TransRiskResult<Vec<CrisisRow>> {
    let df = OVERVIEW_CONTRACT.conform(df)?;
    let mut rows = Vec::with_capacity(df.height());
    let mut crises_per_country: BTreeMap<String, usize> = BTreeMap::new();
    for (abbrev, name, label, alpha, alpha_fin_p, ypred, ratio, beta, pval, r2) in izip!(
        str_values(&df, COL::CRISIS_ABBREV)?,
        str_values(&df, COL::COUNTRY_NAME)?,
        str_values(&df, COL::LABEL)?,
        f64_values(&df, COL::ALPHA)?,
        f64_values(&df, COL::ALPHA_FIN_P)?,
        f64_values(&df, COL::YPRED_XMED_ALL)?,
        f64_values(&df, COL::RATIO)?,
        f64_values(&df, COL::BETA_ALL)?,
        f64_values(&df, COL::PVAL_ALL)?,
        f64_values(&df, COL::R2)?,
    ) {
        let abbrev = abbrev.ok_or_else(|| {
            TransRiskError::DataContract("crisis overview has a missing abbreviation".into())
        })?;
        let (country_iso2, crisis_nr) = split_abbrev(&abbrev)?;
        *crises_per_country.entry(country_iso2.clone()).or_default() += 1;
        let label = label.unwrap_or_default();
        if label.is_empty() || alpha.is_none() || excluded.contains(&abbrev) {
            continue;
        }
        rows.push(CrisisRow {
            country_iso2,
            crisis_nr,
            country_name: name.unwrap_or_default(),
            label,
            ypred_xmed_all: ypred,
            beta_all: beta,
            pval_all: pval,
            r2,
            ratio,
            alpha_fin_p,
        });
    }
    rows.sort_by(|a, b| {
        crises_per_country[&b.country_iso2]
            .cmp(&crises_per_country[&a.country_iso2])
            .then_with(|| a.country_iso2.cmp(&b.country_iso2))
            .then_with(|| a.crisis_nr.cmp(&b.crisis_nr))
    });
    rows.sort_by(|a, b| {
        b.ypred_xmed_all
            .partial_cmp(&a.ypred_xmed_all)
            .unwrap_or(Ordering::Equal)
    });
    Ok(rows)
}

fn two_decimals(value: Option<f64>) -> String {
    value.map_or_else(String::new, |v| format!("{v:.2}"))
}

pub fn render_table_7(rows: &[CrisisRow]) -> String {
    let mut out = String::new();
    for (nr, row) in rows.iter().enumerate() {
        let terminator = if nr + 1 == rows.len() {
            "\\\\\n"
        } else {
            "\\\\\\addlinespace\n"
        };
        out.push_str(&format!(
            "\\textbf{{{}}}: {} & ${}$ & ${}^{{{}}} $ & {} & ${}$$^{{{}}}${}",
            row.country_name,
            row.label.replace("trade dispute", "trade war"),
            two_decimals(row.ypred_xmed_all),
            two_decimals(row.beta_all),
            stars(row.pval_all),
            row.r2.map_or_else(String::new, |r2| format!("{r2:.3}")),
            two_decimals(row.ratio),
            stars(row.alpha_fin_p),
            terminator,
        ));
    }
    out
}
