//! Figure 1: how much of the listed market capitalization the earnings-call sample covers.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::bail;
use itertools::izip;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use polars::prelude::*;

use crate::error::TransRiskResult;
use crate::figures::{parse_color, Figure, FigureStyle};
use crate::io::{f64_values, i32_values, str_values};
use crate::tables::coverage::{market_cap_distribution, COVERAGE_CONTRACT};
use crate::COL;

pub const NAME: &str = "Figure1_coverage";
const US: &str = "United States";
/// Left out of the non-US average.
const NON_US_EXCLUDED: [&str; 3] = [US, "Brazil", "Venezuela"];
/// Countries above this percentage count as covered.
const COVERED_PCT: f64 = 50.0;
const MAX_COUNTRIES: f64 = 40.0;
const MAX_SHARE: f64 = 1.01;

const US_SHARE: &str = "us_share";
const NON_US_SHARE: &str = "non_us_share";
const COUNTRIES_COVERED: &str = "countries_covered";

#[derive(Clone, Debug, PartialEq)]
pub struct CoverageYear {
    pub year: i32,
    pub us_share: Option<f64>,
    pub non_us_share: Option<f64>,
    pub countries_covered: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CoverageFigure {
    pub years: Vec<CoverageYear>,
}

impl CoverageFigure {
    /// Yearly coverage of the analysis countries.
    pub fn prepare(coverage: DataFrame) -> TransRiskResult<Self> {
        let coverage = COVERAGE_CONTRACT.conform(coverage)?;
        let countries: BTreeSet<String> = str_values(
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
        let distribution = market_cap_distribution(coverage.lazy(), &[COL::YEAR]).collect()?;

        let mut per_year: BTreeMap<i32, Vec<(String, Option<f64>)>> = BTreeMap::new();
        for (year, country, pct) in izip!(
            i32_values(&distribution, COL::YEAR)?,
            str_values(&distribution, COL::COUNTRY_COMBINED)?,
            f64_values(&distribution, COL::PCT_MC_AND_TR)?,
        ) {
            let (Some(year), Some(country)) = (year, country) else {
                continue;
            };
            if countries.contains(&country) {
                per_year.entry(year).or_default().push((country, pct));
            }
        }

        let years = per_year
            .into_iter()
            .map(|(year, rows)| {
                let us_share = rows
                    .iter()
                    .find(|(country, _)| country == US)
                    .and_then(|(_, pct)| *pct)
                    .map(|pct| pct / 100.0);
                let others: Vec<f64> = rows
                    .iter()
                    .filter(|(country, _)| !NON_US_EXCLUDED.contains(&country.as_str()))
                    .filter_map(|(_, pct)| *pct)
                    .collect();
                let non_us_share = (!others.is_empty())
                    .then(|| others.iter().sum::<f64>() / others.len() as f64 / 100.0);
                let countries_covered = rows
                    .iter()
                    .filter(|(_, pct)| pct.is_some_and(|pct| pct > COVERED_PCT))
                    .count();
                CoverageYear {
                    year,
                    us_share,
                    non_us_share,
                    countries_covered,
                }
            })
            .collect();
        Ok(Self { years })
    }

    /// The first year is only partially covered by earnings calls and is not drawn.
    fn plotted(&self) -> &[CoverageYear] {
        self.years.get(1..).unwrap_or_default()
    }
}

impl Figure for CoverageFigure {
    fn name(&self) -> &str {
        NAME
    }

    fn data(&self) -> TransRiskResult<DataFrame> {
        Ok(df!(
            COL::YEAR => self.years.iter().map(|y| y.year).collect::<Vec<_>>(),
            US_SHARE => self.years.iter().map(|y| y.us_share).collect::<Vec<_>>(),
            NON_US_SHARE => self.years.iter().map(|y| y.non_us_share).collect::<Vec<_>>(),
            COUNTRIES_COVERED => self.years.iter().map(|y| y.countries_covered as u32).collect::<Vec<_>>()
        )?)
    }

    fn draw(&self, path: &Path, style: &FigureStyle) -> anyhow::Result<()> {
        let years = self.plotted();
        let (Some(first), Some(last)) = (years.first(), years.last()) else {
            bail!("coverage figure needs at least two years");
        };
        let x_range = f64::from(first.year)..f64::from(last.year);

        let root = SVGBackend::new(path, style.wide_size).into_drawing_area();
        root.fill(&WHITE)?;
        let label_font = (style.font.as_str(), style.label_font_size);
        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .x_label_area_size(50)
            .y_label_area_size(70)
            .right_y_label_area_size(70)
            .build_cartesian_2d(x_range.clone(), 0.0..MAX_SHARE)?
            .set_secondary_coord(x_range, 0.0..MAX_COUNTRIES);
        chart
            .configure_mesh()
            .disable_mesh()
            .label_style(label_font)
            .x_label_formatter(&|year| format!("{year:.0}"))
            .y_label_formatter(&|share| format!("{:.0}%", share * 100.0))
            .draw()?;
        chart
            .configure_secondary_axes()
            .label_style(label_font)
            .y_desc("Number of countries")
            .draw()?;

        let width = style.line_width;
        let us = parse_color("#23001E")?;
        let countries = parse_color("#1CCAD8")?;
        let non_us = parse_color("#696773")?;
        let points = |value: fn(&CoverageYear) -> Option<f64>| -> Vec<(f64, f64)> {
            years
                .iter()
                .filter_map(|y| value(y).map(|v| (f64::from(y.year), v)))
                .collect()
        };

        chart
            .draw_series(DashedLineSeries::new(
                points(|y| y.us_share),
                12,
                6,
                us.stroke_width(width),
            ))?
            .label("% of US market capitalization covered")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], us));
        // Drawn on the share scale so that one legend lists all series
        chart
            .draw_series(DashedLineSeries::new(
                points(|y| Some(y.countries_covered as f64 * MAX_SHARE / MAX_COUNTRIES)),
                3,
                4,
                countries.stroke_width(width),
            ))?
            .label("Number of countries with at least 50% market capitalization (right y-axis)")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], countries));
        chart
            .draw_series(LineSeries::new(
                points(|y| y.non_us_share),
                non_us.stroke_width(width),
            ))?
            .label("% of non-US market capitalization covered (average)")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], non_us));

        chart
            .configure_series_labels()
            .position(SeriesLabelPosition::LowerRight)
            .label_font((style.font.as_str(), style.legend_font_size))
            .background_style(WHITE)
            .border_style(WHITE)
            .draw()?;
        root.present()?;
        Ok(())
    }
}
