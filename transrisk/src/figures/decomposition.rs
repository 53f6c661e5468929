//! Figures 2 to 4: decomposed country risk over time with dated events.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::bail;
use chrono::NaiveDate;
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use polars::prelude::*;

use crate::error::{TransRiskError, TransRiskResult};
use crate::figures::{
    annotate, decimal_year, padded_range, parse_color, shade_spans, DecompositionSpec,
    EventAnnotation, Figure, FigureStyle, HeadquartersSpec, Plane, ShadedSpan,
};
use crate::io::{date_series, date_values, f64_values, str_values, ColumnContract, ColumnType};
use crate::COL;

const NON_FINANCIAL: RGBColor = RGBColor(73, 72, 80);
const FINANCIAL: RGBColor = RGBColor(230, 175, 46);

/// One quarter of a plotted series; `values` follow the figure's column order.
#[derive(Clone, Debug, PartialEq)]
pub struct QuarterValues {
    pub period: NaiveDate,
    pub values: Vec<Option<f64>>,
}

/// Reads `columns` of `country` (or of every row when `None`), ordered by quarter.
fn quarters(
    df: &DataFrame,
    country: Option<&str>,
    columns: &[&str],
) -> TransRiskResult<Vec<QuarterValues>> {
    let periods = date_values(df, COL::DATE_Q)?;
    let countries = str_values(df, COL::COUNTRY_ISO2)?;
    let series: Vec<Vec<Option<f64>>> = columns
        .iter()
        .map(|column| f64_values(df, column))
        .collect::<TransRiskResult<_>>()?;
    let mut rows = BTreeMap::new();
    for (i, (period, row_country)) in periods.into_iter().zip(countries).enumerate() {
        let Some(period) = period else { continue };
        if country.is_some_and(|country| row_country.as_deref() != Some(country)) {
            continue;
        }
        rows.insert(
            period,
            series.iter().map(|values| values[i]).collect::<Vec<_>>(),
        );
    }
    if rows.is_empty() {
        return Err(TransRiskError::DataContract(format!(
            "no decomposed quarters for {}",
            country.unwrap_or("any country")
        )));
    }
    Ok(rows
        .into_iter()
        .map(|(period, values)| QuarterValues { period, values })
        .collect())
}

/// `dateQ, <columns>..., annotation`, with events outside the sample appended as empty quarters.
fn frame(
    quarters: &[QuarterValues],
    columns: &[&str],
    events: &[EventAnnotation],
) -> TransRiskResult<DataFrame> {
    let mut rows: BTreeMap<NaiveDate, (Vec<Option<f64>>, Option<&str>)> = quarters
        .iter()
        .map(|q| (q.period, (q.values.clone(), None)))
        .collect();
    for event in events {
        rows.entry(event.date)
            .or_insert_with(|| (vec![None; columns.len()], None))
            .1 = Some(event.text.as_str());
    }
    let periods: Vec<NaiveDate> = rows.keys().copied().collect();
    let mut series = vec![date_series(COL::DATE_Q, &periods)?];
    for (i, column) in columns.iter().enumerate() {
        let values: Vec<Option<f64>> = rows.values().map(|(values, _)| values[i]).collect();
        series.push(Series::new(column, values));
    }
    let annotations: Vec<Option<&str>> = rows.values().map(|(_, text)| *text).collect();
    series.push(Series::new(COL::ANNOTATION, annotations));
    Ok(DataFrame::new(series)?)
}

/// Value of series `index` at the quarter of `event`, if observed.
fn value_at(quarters: &[QuarterValues], event: &EventAnnotation, index: usize) -> Option<f64> {
    quarters
        .iter()
        .find(|q| q.period == event.date)
        .and_then(|q| q.values[index])
}

fn line(quarters: &[QuarterValues], index: usize, transform: impl Fn(f64) -> f64) -> Vec<(f64, f64)> {
    quarters
        .iter()
        .filter_map(|q| q.values[index].map(|v| (decimal_year(q.period), transform(v))))
        .collect()
}

fn time_axes<'a, 'b>(chart: &mut Plane<'a, 'b>, y_label: &str, style: &FigureStyle, show_y: bool) -> anyhow::Result<()> {
    let font = (style.font.as_str(), style.label_font_size);
    let year_label = |year: &f64| format!("{year:.0}");
    let mut mesh = chart.configure_mesh();
    mesh.disable_mesh()
        .label_style(font)
        .x_label_formatter(&year_label)
        .y_desc(y_label);
    if !show_y {
        mesh.disable_y_axis();
    }
    mesh.draw()?;
    Ok(())
}

fn legend<'a, 'b: 'a>(chart: &mut Plane<'a, 'b>, style: &FigureStyle) -> anyhow::Result<()> {
    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::LowerMiddle)
        .label_font((style.font.as_str(), style.legend_font_size))
        .background_style(WHITE)
        .border_style(WHITE)
        .draw()?;
    Ok(())
}

fn x_range(quarters: &[QuarterValues]) -> anyhow::Result<std::ops::Range<f64>> {
    match (quarters.first(), quarters.last()) {
        (Some(first), Some(last)) if first.period < last.period => {
            Ok(decimal_year(first.period)..decimal_year(last.period))
        }
        _ => bail!("a time series figure needs at least two quarters"),
    }
}

/// Financial and non-financial contributions to one country's risk (figures 2 and 3).
#[derive(Clone, Debug, PartialEq)]
pub struct DecompositionFigure {
    pub spec: DecompositionSpec,
    pub spans: Vec<ShadedSpan>,
    /// `risk`, `risk_fin` per quarter.
    pub quarters: Vec<QuarterValues>,
}

const FINANCIAL_COLUMNS: [&str; 2] = [COL::RISK, COL::RISK_FIN];

pub const FINANCIAL_CONTRACT: ColumnContract = ColumnContract {
    dataset: "decomposed financial",
    columns: &[
        (COL::COUNTRY_ISO2, ColumnType::Text),
        (COL::DATE_Q, ColumnType::Date),
        (COL::RISK_FIN, ColumnType::Float),
        (COL::RISK_NFIN, ColumnType::Float),
        (COL::RISK, ColumnType::Float),
    ],
};

impl DecompositionFigure {
    pub fn prepare(
        decomposed_fin: &DataFrame,
        spec: &DecompositionSpec,
        spans: &[ShadedSpan],
    ) -> TransRiskResult<Self> {
        let decomposed_fin = FINANCIAL_CONTRACT.conform(decomposed_fin.clone())?;
        Ok(Self {
            quarters: quarters(&decomposed_fin, Some(&spec.country), &FINANCIAL_COLUMNS)?,
            spec: spec.clone(),
            spans: spans.to_vec(),
        })
    }
}

impl Figure for DecompositionFigure {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn data(&self) -> TransRiskResult<DataFrame> {
        frame(&self.quarters, &FINANCIAL_COLUMNS, &self.spec.events)
    }

    fn draw(&self, path: &Path, style: &FigureStyle) -> anyhow::Result<()> {
        let risk = line(&self.quarters, 0, |v| v);
        let financial = line(&self.quarters, 1, |v| v);
        let (_, top) = padded_range(risk.iter().chain(&financial).map(|p| p.1))?;
        let y_range = (0.0, top);

        let root = SVGBackend::new(path, style.time_series_size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range(&self.quarters)?, y_range.0..y_range.1)?;
        time_axes(&mut chart, &self.spec.y_label, style, true)?;
        shade_spans(&mut chart, &self.spans, y_range, style)?;

        // Area between the combined series and the financial contribution, then below the latter
        let both: Vec<(f64, f64, f64)> = self
            .quarters
            .iter()
            .filter_map(|q| match (q.values[0], q.values[1]) {
                (Some(all), Some(fin)) => Some((decimal_year(q.period), all, fin)),
                _ => None,
            })
            .collect();
        let upper: Vec<(f64, f64)> = both
            .iter()
            .map(|p| (p.0, p.1))
            .chain(both.iter().rev().map(|p| (p.0, p.2)))
            .collect();
        let lower: Vec<(f64, f64)> = both
            .iter()
            .map(|p| (p.0, p.2))
            .chain(both.iter().rev().map(|p| (p.0, 0.0)))
            .collect();
        chart.draw_series(std::iter::once(Polygon::new(upper, NON_FINANCIAL.mix(0.35).filled())))?;
        chart.draw_series(std::iter::once(Polygon::new(lower, FINANCIAL.mix(0.35).filled())))?;

        let width = style.line_width;
        chart
            .draw_series(LineSeries::new(risk, NON_FINANCIAL.stroke_width(width)))?
            .label("Non-financial firms")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], NON_FINANCIAL.filled()));
        chart
            .draw_series(LineSeries::new(financial, FINANCIAL.stroke_width(width)))?
            .label("Financial firms")
            .legend(|(x, y)| Rectangle::new([(x, y - 5), (x + 20, y + 5)], FINANCIAL.filled()));

        for event in &self.spec.events {
            if let Some(value) = value_at(&self.quarters, event, 0) {
                annotate(
                    &mut chart,
                    (decimal_year(event.date), value),
                    &event.text,
                    event.offset,
                    &event.arrow,
                    &event.bbox,
                    style,
                )?;
            }
        }
        legend(&mut chart, style)?;
        root.present()?;
        Ok(())
    }
}

/// Domestic, foreign and combined risk of the reference country (figure 4).
#[derive(Clone, Debug, PartialEq)]
pub struct HeadquartersFigure {
    pub spec: HeadquartersSpec,
    pub spans: Vec<ShadedSpan>,
    /// `risk_hq`, `risk_nhq`, `risk` per quarter.
    pub quarters: Vec<QuarterValues>,
}

const HEADQUARTERS_COLUMNS: [&str; 3] = [COL::RISK_HQ, COL::RISK_NHQ, COL::RISK];

pub const HEADQUARTERS_CONTRACT: ColumnContract = ColumnContract {
    dataset: "decomposed headquarters",
    columns: &[
        (COL::COUNTRY_ISO2, ColumnType::Text),
        (COL::DATE_Q, ColumnType::Date),
        (COL::RISK_HQ, ColumnType::Float),
        (COL::RISK_NHQ, ColumnType::Float),
        (COL::RISK, ColumnType::Float),
    ],
};

impl HeadquartersFigure {
    pub fn prepare(
        decomposed_hq: &DataFrame,
        spec: &HeadquartersSpec,
        spans: &[ShadedSpan],
    ) -> TransRiskResult<Self> {
        let decomposed_hq = HEADQUARTERS_CONTRACT.conform(decomposed_hq.clone())?;
        Ok(Self {
            quarters: quarters(&decomposed_hq, None, &HEADQUARTERS_COLUMNS)?,
            spec: spec.clone(),
            spans: spans.to_vec(),
        })
    }

    /// Maps the combined series onto the vertical range of the group series.
    fn rescale_all(&self, value: f64) -> f64 {
        let (lo, hi) = self.spec.group_range;
        let (all_lo, all_hi) = self.spec.all_range;
        lo + (value - all_lo) * (hi - lo) / (all_hi - all_lo)
    }
}

impl Figure for HeadquartersFigure {
    fn name(&self) -> &str {
        &self.spec.name
    }

    fn data(&self) -> TransRiskResult<DataFrame> {
        frame(&self.quarters, &HEADQUARTERS_COLUMNS, &self.spec.events)
    }

    fn draw(&self, path: &Path, style: &FigureStyle) -> anyhow::Result<()> {
        let (lo, hi) = self.spec.group_range;
        let root = SVGBackend::new(path, style.time_series_size).into_drawing_area();
        root.fill(&WHITE)?;
        let mut chart = ChartBuilder::on(&root)
            .margin(15)
            .x_label_area_size(40)
            .y_label_area_size(30)
            .build_cartesian_2d(x_range(&self.quarters)?, lo..hi)?;
        time_axes(&mut chart, &self.spec.y_label, style, false)?;
        shade_spans(&mut chart, &self.spans, (lo, hi), style)?;

        let width = style.line_width;
        let all = parse_color("#2C6E49")?;
        let domestic = parse_color("#2660a4")?;
        let foreign = parse_color("#eb6534")?;
        let offset = self.spec.foreign_offset;
        chart
            .draw_series(LineSeries::new(
                line(&self.quarters, 2, |v| self.rescale_all(v)),
                all.stroke_width(width),
            ))?
            .label("All firms")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], all));
        chart
            .draw_series(DashedLineSeries::new(
                line(&self.quarters, 0, |v| v),
                10,
                5,
                domestic.stroke_width(width),
            ))?
            .label("Domestic firms")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], domestic));
        chart
            .draw_series(DashedLineSeries::new(
                line(&self.quarters, 1, |v| v + offset),
                10,
                3,
                foreign.stroke_width(width),
            ))?
            .label("Foreign firms")
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], foreign));

        for event in &self.spec.events {
            if let Some(value) = value_at(&self.quarters, event, 2) {
                annotate(
                    &mut chart,
                    (decimal_year(event.date), self.rescale_all(value)),
                    &event.text,
                    event.offset,
                    &event.arrow,
                    &event.bbox,
                    style,
                )?;
            }
        }
        legend(&mut chart, style)?;
        root.present()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::curve::{ArrowStyle, BoxStyle};
    use crate::decompose::{decompose_financial, financial_frame};
    use crate::figures::{render_figure, PreparedFigure};

    fn date(y: i32, m: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, 1).unwrap()
    }

    fn event(date: NaiveDate, text: &str) -> EventAnnotation {
        EventAnnotation {
            date,
            text: text.to_string(),
            offset: (20, -60),
            arrow: ArrowStyle::default(),
            bbox: BoxStyle::default(),
        }
    }

    fn decomposed() -> DataFrame {
        let dates = [date(2010, 1), date(2010, 4), date(2010, 1), date(2010, 4)];
        DataFrame::new(vec![
            Series::new(COL::COUNTRY_ISO2, &["GR", "GR", "TH", "TH"]),
            date_series(COL::DATE_Q, &dates).unwrap(),
            Series::new(COL::RISK_FIN, &[0.5, 1.0, 0.2, 0.3]),
            Series::new(COL::RISK_NFIN, &[1.5, 1.0, 0.8, 0.7]),
            Series::new(COL::RISK, &[2.0, 2.0, 1.0, 1.0]),
        ])
        .unwrap()
    }

    fn spec() -> DecompositionSpec {
        DecompositionSpec {
            name: "Figure2_greece".into(),
            country: "GR".into(),
            y_label: "Greek CountryRisk (std.)".into(),
            events: vec![event(date(2010, 4), "Bailout"), event(date(2015, 7), "Referendum")],
        }
    }

    #[test]
    fn events_join_the_country_quarters() -> anyhow::Result<()> {
        let figure = DecompositionFigure::prepare(&decomposed(), &spec(), &[])?;
        assert_eq!(figure.quarters.len(), 2);
        assert_eq!(figure.quarters[1].values, vec![Some(2.0), Some(1.0)]);
        let data = figure.data()?;
        assert_eq!(data.height(), 3);
        assert_eq!(
            str_values(&data, COL::ANNOTATION)?,
            vec![None, Some("Bailout".to_string()), Some("Referendum".to_string())]
        );
        assert_eq!(f64_values(&data, COL::RISK)?[2], None);
        Ok(())
    }

    #[test]
    fn unknown_country_is_rejected() {
        let spec = DecompositionSpec {
            country: "PT".into(),
            ..spec()
        };
        assert!(DecompositionFigure::prepare(&decomposed(), &spec, &[]).is_err());
    }

    #[test]
    fn renders_decomposition_from_the_decomposer() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let dates = [date(2010, 1), date(2010, 1), date(2010, 4), date(2010, 4)];
        let scores = DataFrame::new(vec![
            Series::new(COL::GVKEY, &["1", "2", "1", "2"]),
            Series::new(COL::COUNTRY_ISO2, &["GR"; 4]),
            Series::new(COL::SIC, &["6021", "2834", "6021", "2834"]),
            date_series(COL::DATE_Q, &dates)?,
            Series::new(COL::RISK, &[1.0, 3.0, 2.0, 5.0]),
            Series::new(COL::LOC_ISO2, &["GR"; 4]),
        ])?;
        let frame = financial_frame(&decompose_financial(&scores, 2020)?)?;
        let spans = [ShadedSpan {
            start: date(2010, 1),
            end: date(2010, 2),
        }];
        let figure = DecompositionFigure::prepare(&frame, &spec(), &spans)?;
        let output = render_figure(
            &PreparedFigure::from(figure),
            dir.path(),
            &FigureStyle::default(),
        )?;
        let svg = std::fs::read_to_string(&output.svg)?;
        assert!(svg.contains("Bailout"));
        Ok(())
    }

    #[test]
    fn headquarters_rescales_the_combined_series() -> anyhow::Result<()> {
        let dates = [date(2010, 1), date(2010, 4)];
        let df = DataFrame::new(vec![
            Series::new(COL::COUNTRY_ISO2, &["US", "US"]),
            date_series(COL::DATE_Q, &dates)?,
            Series::new(COL::RISK_HQ, &[10.0, 12.0]),
            Series::new(COL::RISK_NHQ, &[11.0, 13.0]),
            Series::new(COL::RISK, &[8.0, 16.0]),
        ])?;
        let spec = HeadquartersSpec {
            name: "Figure4_unitedstates".into(),
            y_label: "US CountryRisk (std.)".into(),
            foreign_offset: 0.7,
            group_range: (9.0, 21.0),
            all_range: (0.0, 16.0),
            events: vec![event(date(2010, 4), "Fiscal cliff")],
        };
        let figure = HeadquartersFigure::prepare(&df, &spec, &[])?;
        assert_eq!(figure.rescale_all(8.0), 15.0);
        assert_eq!(figure.rescale_all(16.0), 21.0);

        let dir = TempDir::new()?;
        let output = render_figure(
            &PreparedFigure::from(figure),
            dir.path(),
            &FigureStyle::default(),
        )?;
        assert!(std::fs::read_to_string(&output.svg)?.contains("Fiscal cliff"));
        Ok(())
    }
}
