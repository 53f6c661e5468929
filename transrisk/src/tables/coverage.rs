//! Table 1: sample coverage per analysis country.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use polars::prelude::*;

use crate::error::TransRiskResult;
use crate::io::{f64_values, str_values, ColumnContract, ColumnType};
use crate::merge::{merge, How, MergeSide, MergeSpec, Validate};
use crate::tables::{count_or_zero, thousands};
use crate::COL;

pub const COVERAGE_YEAR: i32 = 2019;
/// Saudi Aramco, listed in 2019 and large enough to distort the Saudi market cap share.
pub const ARAMCO_GVKEY: &str = "334426";
/// Reported in the table although it has no earnings-call firms.
pub const EXTRA_COUNTRY: &str = "Iran";

pub const COVERAGE_CONTRACT: ColumnContract = ColumnContract {
    dataset: "coverage",
    columns: &[
        (COL::GVKEY, ColumnType::Text),
        (COL::YEAR, ColumnType::Int),
        (COL::COUNTRY_EARNINGSCALLS, ColumnType::Text),
        (COL::COUNTRY_COMBINED, ColumnType::Text),
        (COL::MERGE_COMPUSTAT, ColumnType::Text),
        (COL::MARKETCAP_FIRST, ColumnType::Float),
    ],
};

pub const WORLDSCOPE_CONTRACT: ColumnContract = ColumnContract {
    dataset: "worldscope segments",
    columns: &[
        (COL::GVKEY, ColumnType::Text),
        (COL::YEAR, ColumnType::Int),
        (COL::COUNTRY_NAME, ColumnType::Text),
        (COL::SALE_SEG_DUMMY, ColumnType::Int),
    ],
};

pub const GDP_SHARES_CONTRACT: ColumnContract = ColumnContract {
    dataset: "gdp shares",
    columns: &[
        (COL::COUNTRY_NAME, ColumnType::Text),
        (COL::SHARE, ColumnType::Float),
    ],
};

#[derive(Clone, Debug, PartialEq)]
pub struct CoverageRow {
    pub country: String,
    pub nr_of_firms: Option<f64>,
    pub seg: Option<f64>,
    pub share_gdp: Option<f64>,
    pub in_tr: Option<f64>,
    pub pct_mc_and_tr: Option<f64>,
}

/// Share of market capitalization covered by earnings-call firms, grouped by `by` plus
/// `country_combined`. Rows without a combined country are ignored.
pub fn market_cap_distribution(coverage: LazyFrame, by: &[&str]) -> LazyFrame {
    let mut keys: Vec<Expr> = by.iter().map(|key| col(key)).collect();
    keys.push(col(COL::COUNTRY_COMBINED));
    coverage
        .filter(col(COL::COUNTRY_COMBINED).is_not_null())
        .with_columns([
            col(COL::COUNTRY_EARNINGSCALLS)
                .is_not_null()
                .cast(DataType::Float64)
                .alias(COL::IN_TR),
            col(COL::MARKETCAP_FIRST)
                .is_not_null()
                .cast(DataType::Float64)
                .alias(COL::WITH_MC),
            col(COL::MARKETCAP_FIRST).cast(DataType::Float64),
        ])
        .with_column((col(COL::IN_TR) * col(COL::MARKETCAP_FIRST)).alias(COL::IN_TR_AND_MC))
        .group_by(keys)
        .agg([
            col(COL::IN_TR).sum(),
            col(COL::IN_TR).count().cast(DataType::Float64).alias(COL::ALL_FIRMS),
            col(COL::WITH_MC).sum(),
            col(COL::MARKETCAP_FIRST).sum().alias(COL::TOT_MC),
            col(COL::IN_TR_AND_MC).sum(),
        ])
        .with_columns([
            (lit(100.0) * col(COL::IN_TR) / col(COL::ALL_FIRMS)).alias(COL::PCT_TR),
            (lit(100.0) * col(COL::WITH_MC) / col(COL::ALL_FIRMS)).alias(COL::PCT_MC),
            (lit(100.0) * col(COL::IN_TR_AND_MC) / col(COL::TOT_MC)).alias(COL::PCT_MC_AND_TR),
        ])
}

fn matched_firms(coverage: &DataFrame) -> LazyFrame {
    coverage
        .clone()
        .lazy()
        .filter(col(COL::MERGE_COMPUSTAT).neq(lit(MergeSide::RightOnly.as_ref())))
}

/// Distinct firms per `group`, as a float-valued map.
fn distinct_firms(df: LazyFrame, group: &str) -> TransRiskResult<BTreeMap<String, f64>> {
    let counts = df
        .filter(col(group).is_not_null())
        .group_by([col(group)])
        .agg([col(COL::GVKEY).n_unique().cast(DataType::Float64).alias(COL::COUNT)])
        .collect()?;
    keyed(&counts, group, COL::COUNT)
}

fn keyed(df: &DataFrame, key: &str, value: &str) -> TransRiskResult<BTreeMap<String, f64>> {
    Ok(str_values(df, key)?
        .into_iter()
        .zip(f64_values(df, value)?)
        .filter_map(|(key, value)| Some((key?, value?)))
        .collect())
}

/// Firms with at least one sales-segment link in a year they are also in the sample.
fn segment_links(coverage: &DataFrame, worldscope: DataFrame) -> TransRiskResult<BTreeMap<String, f64>> {
    let segments = WORLDSCOPE_CONTRACT
        .conform(worldscope)?
        .lazy()
        .filter(col(COL::SALE_SEG_DUMMY).eq(lit(1)))
        .collect()?;
    let firm_years = matched_firms(coverage)
        .select([col(COL::GVKEY), col(COL::YEAR).cast(DataType::Int32)])
        .collect()?;
    let (linked, _) = merge(
        &segments,
        &firm_years,
        &MergeSpec {
            name: "worldscope links",
            left_name: "worldscope segments",
            right_name: "coverage",
            left_on: &[COL::GVKEY, COL::YEAR],
            right_on: &[COL::GVKEY, COL::YEAR],
            how: How::Inner,
            validate: Validate::ManyToOne,
            indicator: None,
        },
    )?;
    distinct_firms(linked.lazy(), COL::COUNTRY_NAME)
}

/// Builds one row per analysis country plus Iran, sorted by name.
pub fn prepare_table_1(
    coverage: DataFrame,
    worldscope: DataFrame,
    gdp_shares: DataFrame,
) -> TransRiskResult<Vec<CoverageRow>> {
    let coverage = COVERAGE_CONTRACT.conform(coverage)?;
    let gdp_shares = GDP_SHARES_CONTRACT.conform(gdp_shares)?;

    let mut countries: BTreeSet<String> = str_values(
        &coverage
            .clone()
            .lazy()
            .filter(col(COL::OUR_COUNTRIES))
            .select([col(COL::COUNTRY_EARNINGSCALLS)])
            .collect()?,
        COL::COUNTRY_EARNINGSCALLS,
    )?
    .into_iter()
    .flatten()
    .collect();
    countries.insert(EXTRA_COUNTRY.to_string());

    let distribution = market_cap_distribution(
        coverage
            .clone()
            .lazy()
            .filter(col(COL::YEAR).eq(lit(COVERAGE_YEAR)))
            .filter(col(COL::GVKEY).neq(lit(ARAMCO_GVKEY))),
        &[],
    )
    .collect()?;
    debug!("Market cap distribution with shape: {:?}", distribution.shape());
    let in_tr = keyed(&distribution, COL::COUNTRY_COMBINED, COL::IN_TR)?;
    let pct = keyed(&distribution, COL::COUNTRY_COMBINED, COL::PCT_MC_AND_TR)?;
    let nr_of_firms = distinct_firms(matched_firms(&coverage), COL::COUNTRY_EARNINGSCALLS)?;
    let seg = segment_links(&coverage, worldscope)?;
    let shares = keyed(&gdp_shares, COL::COUNTRY_NAME, COL::SHARE)?;

    Ok(countries
        .into_iter()
        .map(|country| CoverageRow {
            nr_of_firms: nr_of_firms.get(&country).copied(),
            seg: seg.get(&country).copied(),
            share_gdp: shares.get(&country).copied(),
            in_tr: in_tr.get(&country).copied(),
            pct_mc_and_tr: pct.get(&country).copied(),
            country,
        })
        .collect())
}

fn percent_or_na(value: Option<f64>, decimals: usize) -> String {
    match value {
        Some(v) if v.is_finite() && v != 0.0 => format!("{:8.*}\\%", decimals, v),
        _ => "n/a".to_string(),
    }
}

pub fn render_table_1(rows: &[CoverageRow]) -> String {
    let mut out = String::new();
    out.push_str(
        "& \\# of firms & \\# of sales link & \\% of world GDP & \\# of firms & \\% of 2019 market\\\\\n",
    );
    out.push_str("& (all years) & (any year) & (2019) & (2019) & capitalization \\\\\\midrule\n");
    for (i, row) in rows.iter().enumerate() {
        out.push_str(&format!(
            "{}&{}&{} & {}&{}&{} \\\\",
            row.country,
            count_or_zero(row.nr_of_firms),
            count_or_zero(row.seg),
            percent_or_na(row.share_gdp.map(|share| share * 100.0), 2),
            count_or_zero(row.in_tr),
            percent_or_na(row.pct_mc_and_tr, 1),
        ));
        out.push_str(if i + 1 == rows.len() { "\\midrule\n" } else { "\n" });
    }

    let sum = |value: fn(&CoverageRow) -> Option<f64>| rows.iter().filter_map(value).sum::<f64>();
    let percentages: Vec<f64> = rows.iter().filter_map(|row| row.pct_mc_and_tr).collect();
    let mean_pct = if percentages.is_empty() {
        "n/a".to_string()
    } else {
        format!("{:8.1}\\%", percentages.iter().sum::<f64>() / percentages.len() as f64)
    };
    out.push_str(&format!(
        "\\textbf{{Total}} & {} & {} & {:8.1}\\% & {} & {} (mean)\\\\\n",
        thousands(sum(|row| row.nr_of_firms), 0),
        thousands(sum(|row| row.seg), 0),
        sum(|row| row.share_gdp) * 100.0,
        thousands(sum(|row| row.in_tr), 0),
        mean_pct,
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coverage() -> DataFrame {
        df!(
            COL::GVKEY => &["001", "002", "001", "003", "334426"],
            COL::YEAR => &[2019, 2019, 2018, 2019, 2019],
            COL::COUNTRY_EARNINGSCALLS => &[Some("Germany"), None, Some("Germany"), Some("France"), None],
            COL::COUNTRY_COMBINED => &["Germany", "Germany", "Germany", "France", "Saudi Arabia"],
            COL::OUR_COUNTRIES => &[true, false, true, true, false],
            COL::MERGE_COMPUSTAT => &["both", "right_only", "both", "left_only", "right_only"],
            COL::MARKETCAP_FIRST => &[Some(30.0), Some(70.0), Some(20.0), None, Some(1000.0)]
        )
        .unwrap()
    }

    fn worldscope() -> DataFrame {
        df!(
            COL::GVKEY => &["001", "001", "003", "002"],
            COL::YEAR => &[2018, 2019, 2010, 2019],
            COL::COUNTRY_NAME => &["Germany", "Germany", "France", "Germany"],
            COL::SALE_SEG_DUMMY => &[1, 1, 1, 1]
        )
        .unwrap()
    }

    fn gdp() -> DataFrame {
        df!(
            COL::COUNTRY_NAME => &["Germany", "France"],
            COL::SHARE => &[0.05, 0.0]
        )
        .unwrap()
    }

    #[test]
    fn rows_cover_sample_countries_and_iran() -> anyhow::Result<()> {
        let rows = prepare_table_1(coverage(), worldscope(), gdp())?;
        let countries: Vec<&str> = rows.iter().map(|row| row.country.as_str()).collect();
        assert_eq!(countries, vec!["France", "Germany", "Iran"]);

        let germany = &rows[1];
        assert_eq!(germany.nr_of_firms, Some(1.0));
        assert_eq!(germany.seg, Some(1.0));
        assert_eq!(germany.in_tr, Some(1.0));
        assert_eq!(germany.pct_mc_and_tr, Some(30.0));
        // France has no market cap in 2019
        assert_eq!(rows[0].pct_mc_and_tr, None);
        assert_eq!(rows[0].seg, None);
        Ok(())
    }

    #[test]
    fn zero_gdp_share_renders_not_available() -> anyhow::Result<()> {
        let rows = prepare_table_1(coverage(), worldscope(), gdp())?;
        let rendered = render_table_1(&rows);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 6);
        assert_eq!(lines[2], "France&1&0 & n/a&1&n/a \\\\");
        assert_eq!(lines[3], "Germany&1&1 &     5.00\\%&1&    30.0\\% \\\\");
        assert_eq!(lines[4], "Iran&0&0 & n/a&0&n/a \\\\\\midrule");
        assert_eq!(
            lines[5],
            "\\textbf{Total} & 2 & 1 &      5.0\\% & 2 &     30.0\\% (mean)\\\\"
        );
        Ok(())
    }
}
