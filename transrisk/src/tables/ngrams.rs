//! Table 2: the top country-name n-grams of one TF-IDF file.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;

use polars::prelude::*;
use regex::Regex;

use crate::error::{TransRiskError, TransRiskResult};
use crate::io::{f64_values, i32_values, str_values, ColumnContract, ColumnType};
use crate::tables::thousands;
use crate::COL;

/// Value of `modified` for the n-gram whose score was capped to the maximum.
pub const IMPOSED_MAXIMUM: &str = "imposed maximum";
pub const PANEL_ROWS: usize = 10;

pub const NGRAM_CONTRACT: ColumnContract = ColumnContract {
    dataset: "tfidf ngrams",
    columns: &[
        (COL::NGRAM, ColumnType::Text),
        (COL::TFIDF, ColumnType::Float),
        (COL::COUNT, ColumnType::Int),
        (COL::MODIFIED, ColumnType::Text),
        (COL::FROM_GEONAMES, ColumnType::Int),
    ],
};

#[derive(Clone, Debug, PartialEq)]
pub struct NgramRow {
    pub ngram: String,
    pub tfidf: Option<f64>,
    pub count: Option<i32>,
    pub modified: Option<String>,
    pub from_geonames: Option<i32>,
}

/// The two panels written side by side.
#[derive(Clone, Debug, PartialEq)]
pub struct NgramPanels {
    pub left: Vec<NgramRow>,
    pub right: Vec<NgramRow>,
}

/// Two-letter country code in the name of a TF-IDF file, e.g. `gr` for `gr_tfidf.csv`.
pub fn file_code(path: &Path) -> TransRiskResult<String> {
    let re = Regex::new(r"(?:^|[/\\])([a-z][a-z])_").map_err(anyhow::Error::from)?;
    let path_str = path.to_string_lossy();
    re.captures(&path_str)
        .and_then(|captures| captures.get(1))
        .map(|code| code.as_str().to_string())
        .ok_or_else(|| {
            TransRiskError::DataContract(format!(
                "no two-letter country code in {}",
                path.display()
            ))
        })
}

fn rows(df: DataFrame) -> TransRiskResult<Vec<NgramRow>> {
    let df = NGRAM_CONTRACT.conform(df)?;
    let ngrams = str_values(&df, COL::NGRAM)?;
    let tfidf = f64_values(&df, COL::TFIDF)?;
    let count = i32_values(&df, COL::COUNT)?;
    let modified = str_values(&df, COL::MODIFIED)?;
    let from_geonames = i32_values(&df, COL::FROM_GEONAMES)?;
    Ok(itertools::izip!(ngrams, tfidf, count, modified, from_geonames)
        .filter_map(|(ngram, tfidf, count, modified, from_geonames)| {
            Some(NgramRow {
                ngram: ngram?,
                tfidf,
                count,
                modified,
                from_geonames,
            })
        })
        .collect())
}

fn is_imposed(row: &NgramRow) -> bool {
    row.modified.as_deref() == Some(IMPOSED_MAXIMUM)
}

/// Descending with missing values first.
fn descending<T: PartialOrd>(a: &Option<T>, b: &Option<T>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => b.partial_cmp(a).unwrap_or(Ordering::Equal),
    }
}

/// Keeps geonames n-grams and n-grams whose first two words are not country names, then
/// ranks them by rounded TF-IDF. When the cap was imposed on the second-ranked n-gram, the
/// top two are merged into one row carrying the count of the uncapped maximum.
pub fn prepare_table_2(df: DataFrame) -> TransRiskResult<NgramPanels> {
    let all = rows(df)?;
    let maximum_count = all
        .iter()
        .filter(|row| !is_imposed(row))
        .filter(|row| row.tfidf.is_some())
        .max_by(|a, b| a.tfidf.partial_cmp(&b.tfidf).unwrap_or(Ordering::Equal))
        .and_then(|row| row.count);
    let country_names: HashSet<&str> = all
        .iter()
        .filter(|row| row.from_geonames == Some(1))
        .map(|row| row.ngram.as_str())
        .collect();

    let mut kept: Vec<NgramRow> = all
        .iter()
        .filter(|row| {
            let contains_name = row
                .ngram
                .split(' ')
                .take(2)
                .any(|word| country_names.contains(word));
            row.from_geonames == Some(1) || (row.from_geonames == Some(0) && !contains_name)
        })
        .cloned()
        .map(|row| NgramRow {
            tfidf: row.tfidf.map(|t| (t * 1000.0).round() / 1000.0),
            ..row
        })
        .collect();
    kept.sort_by(|a, b| {
        descending(&a.tfidf, &b.tfidf)
            .then_with(|| descending(&a.modified, &b.modified))
            .then_with(|| a.ngram.cmp(&b.ngram))
    });

    if kept.get(1).is_some_and(is_imposed) {
        let addendum = kept.remove(0);
        let first = &mut kept[0];
        first.ngram = format!("{}/{}", first.ngram, addendum.ngram);
        first.count = maximum_count;
    }
    if kept.len() < 2 * PANEL_ROWS {
        return Err(TransRiskError::DataContract(format!(
            "expected at least {} n-grams for table 2, found {}",
            2 * PANEL_ROWS,
            kept.len()
        )));
    }
    let right = kept[PANEL_ROWS..2 * PANEL_ROWS].to_vec();
    kept.truncate(PANEL_ROWS);
    Ok(NgramPanels { left: kept, right })
}

fn cells(row: &NgramRow) -> String {
    let tfidf = row.tfidf.map_or_else(String::new, |t| thousands(t, 2));
    let count = row.count.map_or_else(String::new, |c| thousands(f64::from(c), 0));
    format!("{}&{}&{}", row.ngram, tfidf, count)
}

pub fn render_table_2(panels: &NgramPanels) -> String {
    panels
        .left
        .iter()
        .zip(&panels.right)
        .map(|(left, right)| format!("{}&{}\\\\\n", cells(left), cells(right)))
        .collect()
}
