//! SVG figures. Every figure is prepared from the final datasets into an immutable value that
//! can both draw itself and export the plotted data as a table.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail};
use chrono::{Datelike, NaiveDate};
use enum_dispatch::enum_dispatch;
use log::info;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::curve::{ArrowStyle, BoxStyle, CrisisSpec, SplitCrisisSpec};
use crate::error::TransRiskResult;
use crate::io::{require_file, write_table};

pub mod coverage;
pub mod crisis;
pub mod decomposition;

pub use coverage::CoverageFigure;
pub use crisis::{CrisisFigure, SplitCrisisFigure};
pub use decomposition::{DecompositionFigure, HeadquartersFigure};

/// Sizes, fonts and line widths shared by all figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureStyle {
    pub font: String,
    pub label_font_size: u32,
    pub annotation_font_size: u32,
    pub legend_font_size: u32,
    pub line_width: u32,
    pub marker_size: u32,
    pub wide_size: (u32, u32),
    pub time_series_size: (u32, u32),
    pub square_size: (u32, u32),
    pub span_color: String,
}

impl Default for FigureStyle {
    fn default() -> Self {
        Self {
            font: "sans-serif".into(),
            label_font_size: 18,
            annotation_font_size: 12,
            legend_font_size: 14,
            line_width: 3,
            marker_size: 8,
            wide_size: (1400, 800),
            time_series_size: (800, 400),
            square_size: (800, 800),
            span_color: "whitesmoke".into(),
        }
    }
}

/// A shaded period on time-series figures.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShadedSpan {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Label attached to the value of a time series at `date`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventAnnotation {
    pub date: NaiveDate,
    pub text: String,
    pub offset: (i32, i32),
    #[serde(default)]
    pub arrow: ArrowStyle,
    #[serde(default)]
    pub bbox: BoxStyle,
}

/// Financial decomposition of one country over time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DecompositionSpec {
    pub name: String,
    pub country: String,
    pub y_label: String,
    #[serde(default)]
    pub events: Vec<EventAnnotation>,
}

/// Headquarters decomposition of the reference country. The domestic and foreign series share
/// one vertical range and the combined series uses another.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeadquartersSpec {
    pub name: String,
    pub y_label: String,
    #[serde(default = "default_foreign_offset")]
    pub foreign_offset: f64,
    #[serde(default = "default_group_range")]
    pub group_range: (f64, f64),
    #[serde(default = "default_all_range")]
    pub all_range: (f64, f64),
    #[serde(default)]
    pub events: Vec<EventAnnotation>,
}

fn default_foreign_offset() -> f64 {
    0.7
}

fn default_group_range() -> (f64, f64) {
    (9.0, 21.0)
}

fn default_all_range() -> (f64, f64) {
    (0.0, 16.0)
}

/// Contents of the figure definitions file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FigureSpecs {
    pub style: FigureStyle,
    pub shaded_spans: Vec<ShadedSpan>,
    pub decomposition: Vec<DecompositionSpec>,
    pub headquarters: Option<HeadquartersSpec>,
    pub crisis: Vec<CrisisSpec>,
    pub split_crisis: Vec<SplitCrisisSpec>,
}

impl FigureSpecs {
    pub fn read(path: &Path) -> TransRiskResult<Self> {
        require_file("figure definitions", path)?;
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

#[enum_dispatch]
pub trait Figure {
    /// File stem shared by the SVG and the data export.
    fn name(&self) -> &str;
    /// The plotted data in long format.
    fn data(&self) -> TransRiskResult<DataFrame>;
    fn draw(&self, path: &Path, style: &FigureStyle) -> anyhow::Result<()>;
}

#[enum_dispatch(Figure)]
#[derive(Clone, Debug)]
pub enum PreparedFigure {
    CoverageFigure,
    DecompositionFigure,
    HeadquartersFigure,
    CrisisFigure,
    SplitCrisisFigure,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FigureOutput {
    pub svg: PathBuf,
    pub data: PathBuf,
}

/// Writes `<dir>/<name>.svg` and `<dir>/<name>.csv`.
pub fn render_figure(
    figure: &PreparedFigure,
    dir: &Path,
    style: &FigureStyle,
) -> TransRiskResult<FigureOutput> {
    std::fs::create_dir_all(dir)?;
    let output = FigureOutput {
        svg: dir.join(format!("{}.svg", figure.name())),
        data: dir.join(format!("{}.csv", figure.name())),
    };
    write_table(&output.data, &mut figure.data()?)?;
    figure.draw(&output.svg, style)?;
    info!("Wrote figure {}", output.svg.display());
    Ok(output)
}

/// Parses `#rrggbb` or one of the few named colors used in the figure specs.
pub fn parse_color(color: &str) -> anyhow::Result<RGBColor> {
    match color.to_ascii_lowercase().as_str() {
        "black" => Ok(RGBColor(0, 0, 0)),
        "white" => Ok(RGBColor(255, 255, 255)),
        "grey" | "gray" => Ok(RGBColor(128, 128, 128)),
        "whitesmoke" => Ok(RGBColor(245, 245, 245)),
        hex => {
            let digits = hex
                .strip_prefix('#')
                .filter(|digits| digits.len() == 6 && digits.is_ascii())
                .ok_or_else(|| anyhow!("unsupported color `{color}`"))?;
            let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
            Ok(RGBColor(channel(0)?, channel(2)?, channel(4)?))
        }
    }
}

fn is_none(color: &str) -> bool {
    color.eq_ignore_ascii_case("none")
}

/// Fractional year, used as the horizontal coordinate of time series.
pub fn decimal_year(date: NaiveDate) -> f64 {
    f64::from(date.year()) + f64::from(date.month0()) / 12.0 + f64::from(date.day0()) / 365.0
}

pub(crate) type Plane<'a, 'b> =
    ChartContext<'a, SVGBackend<'b>, Cartesian2d<RangedCoordf64, RangedCoordf64>>;

/// Draws `text` at a pixel `offset` (y pointing up) from the data point `at`, with an optional
/// connector and background box.
pub(crate) fn annotate<'a, 'b>(
    chart: &mut Plane<'a, 'b>,
    at: (f64, f64),
    text: &str,
    offset: (i32, i32),
    arrow: &ArrowStyle,
    bbox: &BoxStyle,
    style: &FigureStyle,
) -> anyhow::Result<()> {
    let (dx, dy) = (offset.0, -offset.1);
    let lines: Vec<&str> = text.lines().collect();
    let n = lines.len() as i32;
    let line_height = (f64::from(style.annotation_font_size) * 1.2).round() as i32;

    if !arrow.style.is_empty() && !is_none(&arrow.style) {
        let color = parse_color(&arrow.color)?;
        let (fx, fy) = (f64::from(dx), f64::from(dy));
        let length = fx.hypot(fy);
        if length > arrow.shrink_a + arrow.shrink_b {
            let (ux, uy) = (fx / length, fy / length);
            let along = |d: f64| ((ux * d).round() as i32, (uy * d).round() as i32);
            let path = vec![along(arrow.shrink_b), along(length - arrow.shrink_a)];
            chart.draw_series(std::iter::once(
                EmptyElement::at(at) + PathElement::new(path, color.stroke_width(1)),
            ))?;
        }
    }

    if !is_none(&bbox.facecolor) {
        let fill = parse_color(&bbox.facecolor)?;
        let pad = bbox.pad.round() as i32;
        let widest = lines.iter().map(|line| line.chars().count()).max().unwrap_or(0) as i32;
        let width = widest * (style.annotation_font_size as i32) * 3 / 5;
        let corners = [(dx - pad, dy - n * line_height - pad), (dx + width + pad, dy + pad)];
        chart.draw_series(std::iter::once(
            EmptyElement::at(at) + Rectangle::new(corners, fill.filled()),
        ))?;
    }

    let font = (style.font.as_str(), style.annotation_font_size)
        .into_font()
        .color(&BLACK);
    chart.draw_series(lines.iter().enumerate().map(|(i, line)| {
        EmptyElement::at(at)
            + Text::new(
                line.to_string(),
                (dx, dy - (n - i as i32) * line_height),
                font.clone(),
            )
    }))?;
    Ok(())
}

/// Vertical bands over the full height of a time-series plane.
pub(crate) fn shade_spans<'a, 'b>(
    chart: &mut Plane<'a, 'b>,
    spans: &[ShadedSpan],
    y_range: (f64, f64),
    style: &FigureStyle,
) -> anyhow::Result<()> {
    let color = parse_color(&style.span_color)?;
    chart.draw_series(spans.iter().map(|span| {
        Rectangle::new(
            [
                (decimal_year(span.start), y_range.0),
                (decimal_year(span.end), y_range.1),
            ],
            color.filled(),
        )
    }))?;
    Ok(())
}

/// Bounds of a series, padded so that lines do not touch the frame.
pub(crate) fn padded_range(values: impl Iterator<Item = f64>) -> anyhow::Result<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        bail!("no finite values to plot");
    }
    let pad = ((hi - lo) * 0.05).max(0.1);
    Ok((lo - pad, hi + pad))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colors_parse_from_hex_and_names() -> anyhow::Result<()> {
        assert_eq!(parse_color("#23001E")?, RGBColor(0x23, 0x00, 0x1e));
        assert_eq!(parse_color("grey")?, RGBColor(128, 128, 128));
        assert!(parse_color("#12345").is_err());
        assert!(parse_color("chartreuse").is_err());
        Ok(())
    }

    #[test]
    fn decimal_years_follow_quarters() {
        let date = |m| NaiveDate::from_ymd_opt(2010, m, 1).unwrap();
        assert_eq!(decimal_year(date(1)), 2010.0);
        assert_eq!(decimal_year(date(7)), 2010.5);
    }

    #[test]
    fn figure_specs_parse_with_defaults() -> anyhow::Result<()> {
        let specs: FigureSpecs = toml::from_str(
            r#"
            [[shaded_spans]]
            start = "2008-10-01"
            end = "2009-04-01"

            [[decomposition]]
            name = "Figure2_greece"
            country = "GR"
            y_label = "Greek CountryRisk (std.)"

            [[decomposition.events]]
            date = "2015-07-01"
            text = "Grexit"
            offset = [20, -60]

            [headquarters]
            name = "Figure4_unitedstates"
            y_label = "US CountryRisk (std.)"
            "#,
        )?;
        assert_eq!(specs.style, FigureStyle::default());
        assert_eq!(specs.decomposition[0].events[0].offset, (20, -60));
        assert_eq!(specs.decomposition[0].events[0].arrow, ArrowStyle::default());
        let hq = specs.headquarters.unwrap();
        assert_eq!(hq.group_range, (9.0, 21.0));
        assert_eq!(hq.foreign_offset, 0.7);
        assert!(specs.crisis.is_empty());
        Ok(())
    }

    #[test]
    fn padded_range_rejects_empty_series() {
        assert!(padded_range([f64::NAN].into_iter()).is_err());
        let (lo, hi) = padded_range([1.0, 3.0].into_iter()).unwrap();
        assert!(lo < 1.0 && hi > 3.0);
    }

    #[test]
    fn shipped_figure_specs_parse() -> anyhow::Result<()> {
        let specs: FigureSpecs = toml::from_str(include_str!("../../../config/figures.toml"))?;
        assert_eq!(specs.shaded_spans.len(), 2);
        assert_eq!(specs.decomposition.len(), 2);
        assert_eq!(specs.crisis.len(), 6);
        assert_eq!(specs.split_crisis[0].id(), "IT_NFCvsFIN_crisis1");
        let first = &specs.decomposition[0].events[1];
        assert_eq!(first.arrow.shrink_b, 6.0);
        assert_eq!(first.bbox.pad, -3.0);
        assert_eq!(first.bbox.facecolor, "none");
        Ok(())
    }
}
